use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Write-only brightness control
///
/// A missing device is a valid state: every operation becomes a no-op. Write
/// failures are logged and swallowed so a flaky sysfs node can never take a
/// display cycle down with it.
#[derive(Debug, Clone)]
pub struct Backlight {
    path: Option<PathBuf>,
    max: u32,
}

impl Backlight {
    pub fn new(path: Option<PathBuf>, max: u32) -> Self {
        Self { path, max }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn set_brightness(&self, value: u32) {
        let Some(path) = &self.path else {
            return;
        };

        match std::fs::write(path, value.to_string()) {
            Ok(()) => debug!(value, path = %path.display(), "Backlight set"),
            Err(e) => warn!(value, path = %path.display(), error = %e, "Failed to set backlight"),
        }
    }

    pub fn on(&self) {
        self.set_brightness(self.max);
    }

    pub fn off(&self) {
        self.set_brightness(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_brightness_writes_decimal_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brightness");
        let backlight = Backlight::new(Some(path.clone()), 200);

        backlight.set_brightness(42);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "42");

        backlight.on();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "200");

        backlight.off();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0");
    }

    #[test]
    fn test_absent_device_is_noop() {
        let backlight = Backlight::new(None, 255);
        backlight.set_brightness(100);
        backlight.on();
        backlight.off();
        assert!(backlight.path().is_none());
    }

    #[test]
    fn test_unwritable_device_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        // Parent directory does not exist, so every write fails
        let path = dir.path().join("missing/brightness");
        let backlight = Backlight::new(Some(path.clone()), 255);

        backlight.set_brightness(10);
        backlight.on();
        assert!(!path.exists());
    }
}
