use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::constants::{defaults, env, paths};
use crate::night::NightWindow;

/// Rotation applied to the rendered page, in degrees counter-clockwise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

fn serialize_rotation<S>(value: &Rotation, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u16(value.degrees())
}

/// Immutable settings resolved once at startup
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub url: String,
    pub refresh_interval_secs: u64,

    pub night_mode_enabled: bool,
    /// Raw `HH:MM` bounds; parsed per cycle so a bad value degrades to "day"
    pub night_start: String,
    pub night_end: String,

    pub window_width: u32,
    pub window_height: u32,
    #[serde(serialize_with = "serialize_rotation")]
    pub rotation: Rotation,
    pub fullscreen: bool,
    /// Preferred output backend tried before the built-in fallback order
    pub preferred_backend: Option<String>,

    pub chromium_path: PathBuf,
    pub chromium_timeout_secs: u64,
    pub screenshot_path: PathBuf,

    pub backlight_path: Option<PathBuf>,
    pub backlight_max: u32,

    pub check_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: defaults::URL.to_string(),
            refresh_interval_secs: defaults::REFRESH_INTERVAL_SECS,
            night_mode_enabled: defaults::NIGHT_MODE_ENABLED,
            night_start: defaults::NIGHT_START.to_string(),
            night_end: defaults::NIGHT_END.to_string(),
            window_width: defaults::WINDOW_WIDTH,
            window_height: defaults::WINDOW_HEIGHT,
            rotation: Rotation::Deg0,
            fullscreen: defaults::FULLSCREEN,
            preferred_backend: None,
            chromium_path: PathBuf::from(defaults::CHROMIUM_PATH),
            chromium_timeout_secs: defaults::CHROMIUM_TIMEOUT_SECS,
            screenshot_path: PathBuf::from(defaults::SCREENSHOT_PATH),
            backlight_path: None,
            backlight_max: defaults::BACKLIGHT_MAX,
            check_interval_secs: defaults::CHECK_INTERVAL_SECS,
        }
    }
}

impl Config {
    /// Load from the process environment, auto-detecting the backlight device
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok(), Path::new(paths::BACKLIGHT_CLASS))
    }

    /// Load from an arbitrary variable lookup
    ///
    /// `backlight_class` is scanned for a brightness attribute when
    /// `BACKLIGHT_PATH` is unset or empty.
    pub fn from_lookup<F>(lookup: F, backlight_class: &Path) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let rotation = match get(env::ROTATION) {
            None => Rotation::Deg0,
            Some(raw) => match raw.trim().parse::<i64>().ok().and_then(Rotation::from_degrees) {
                Some(rotation) => rotation,
                None => {
                    warn!(value = %raw, "Invalid rotation, defaulting to 0");
                    Rotation::Deg0
                }
            },
        };

        let backlight_path = match get(env::BACKLIGHT_PATH) {
            Some(path) => Some(PathBuf::from(path)),
            None => {
                let detected = detect_backlight(backlight_class);
                if let Some(path) = &detected {
                    info!(path = %path.display(), "Auto-detected backlight device");
                }
                detected
            }
        };

        let config = Self {
            url: get(env::DISPLAY_URL).unwrap_or_else(|| defaults::URL.to_string()),
            refresh_interval_secs: parse_or(
                env::REFRESH_INTERVAL,
                get(env::REFRESH_INTERVAL),
                defaults::REFRESH_INTERVAL_SECS,
            ),
            night_mode_enabled: get(env::NIGHT_MODE_ENABLED)
                .map(|v| parse_bool(&v))
                .unwrap_or(defaults::NIGHT_MODE_ENABLED),
            night_start: get(env::NIGHT_START).unwrap_or_else(|| defaults::NIGHT_START.to_string()),
            night_end: get(env::NIGHT_END).unwrap_or_else(|| defaults::NIGHT_END.to_string()),
            window_width: parse_or(env::WINDOW_WIDTH, get(env::WINDOW_WIDTH), defaults::WINDOW_WIDTH),
            window_height: parse_or(
                env::WINDOW_HEIGHT,
                get(env::WINDOW_HEIGHT),
                defaults::WINDOW_HEIGHT,
            ),
            rotation,
            fullscreen: get(env::FULLSCREEN)
                .map(|v| parse_bool(&v))
                .unwrap_or(defaults::FULLSCREEN),
            preferred_backend: get(env::VIDEO_DRIVER).map(|v| v.trim().to_string()),
            chromium_path: PathBuf::from(
                get(env::CHROMIUM_PATH).unwrap_or_else(|| defaults::CHROMIUM_PATH.to_string()),
            ),
            chromium_timeout_secs: parse_or(
                env::CHROMIUM_TIMEOUT,
                get(env::CHROMIUM_TIMEOUT),
                defaults::CHROMIUM_TIMEOUT_SECS,
            ),
            screenshot_path: PathBuf::from(
                get(env::SCREENSHOT_PATH).unwrap_or_else(|| defaults::SCREENSHOT_PATH.to_string()),
            ),
            backlight_path,
            backlight_max: parse_or(env::BACKLIGHT_MAX, get(env::BACKLIGHT_MAX), defaults::BACKLIGHT_MAX),
            check_interval_secs: parse_or(
                env::CHECK_INTERVAL,
                get(env::CHECK_INTERVAL),
                defaults::CHECK_INTERVAL_SECS,
            ),
        };

        // Parsed again every cycle; warn early so a typo shows up in the startup log
        if config.night_mode_enabled {
            if let Err(e) = NightWindow::parse(&config.night_start, &config.night_end) {
                warn!(error = %format!("{e:#}"), "Night window is malformed, night mode will never trigger");
            }
        }

        config
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn chromium_timeout(&self) -> Duration {
        Duration::from_secs(self.chromium_timeout_secs)
    }
}

/// Parse a numeric option, keeping the default (with a warning) on garbage
fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr + fmt::Display + Copy,
{
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, default = %default, "Invalid number, using default");
            default
        }),
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

/// First `<class>/<device>/brightness` in device-name order
pub fn detect_backlight(class_dir: &Path) -> Option<PathBuf> {
    let mut devices: Vec<PathBuf> = std::fs::read_dir(class_dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path().join(paths::BRIGHTNESS_FILE))
        .filter(|path| path.exists())
        .collect();
    devices.sort();
    devices.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)], backlight_class: &Path) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned(), backlight_class)
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&[], dir.path());

        assert_eq!(config.url, "https://google.com");
        assert_eq!(config.refresh_interval_secs, 300);
        assert!(config.night_mode_enabled);
        assert_eq!(config.night_start, "22:00");
        assert_eq!(config.night_end, "07:00");
        assert_eq!((config.window_width, config.window_height), (800, 600));
        assert_eq!(config.rotation, Rotation::Deg0);
        assert!(config.fullscreen);
        assert_eq!(config.preferred_backend, None);
        assert_eq!(config.chromium_path, PathBuf::from("chromium-browser"));
        assert_eq!(config.chromium_timeout(), Duration::from_secs(30));
        assert_eq!(config.screenshot_path, PathBuf::from("/tmp/screenshot.png"));
        assert_eq!(config.backlight_path, None);
        assert_eq!(config.backlight_max, 255);
        assert_eq!(config.check_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_overrides_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(
            &[
                ("DISPLAY_URL", "http://dashboard.local/"),
                ("REFRESH_INTERVAL", "120"),
                ("NIGHT_MODE_ENABLED", "False"),
                ("WINDOW_WIDTH", "1024"),
                ("WINDOW_HEIGHT", "768"),
                ("ROTATION", "270"),
                ("FULLSCREEN", "no"),
                ("SDL_VIDEODRIVER", " fbcon "),
                ("BACKLIGHT_PATH", "/tmp/bl"),
                ("BACKLIGHT_MAX", "100"),
                ("CHECK_INTERVAL", "5"),
            ],
            dir.path(),
        );

        assert_eq!(config.url, "http://dashboard.local/");
        assert_eq!(config.refresh_interval(), Duration::from_secs(120));
        assert!(!config.night_mode_enabled);
        assert_eq!((config.window_width, config.window_height), (1024, 768));
        assert_eq!(config.rotation, Rotation::Deg270);
        assert!(!config.fullscreen);
        assert_eq!(config.preferred_backend.as_deref(), Some("fbcon"));
        assert_eq!(config.backlight_path, Some(PathBuf::from("/tmp/bl")));
        assert_eq!(config.backlight_max, 100);
        assert_eq!(config.check_interval_secs, 5);
    }

    #[test]
    fn test_invalid_rotation_coerced_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load(&[("ROTATION", "45")], dir.path()).rotation, Rotation::Deg0);
        assert_eq!(load(&[("ROTATION", "sideways")], dir.path()).rotation, Rotation::Deg0);
        assert_eq!(load(&[("ROTATION", "-90")], dir.path()).rotation, Rotation::Deg0);
    }

    #[test]
    fn test_invalid_number_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&[("REFRESH_INTERVAL", "five"), ("WINDOW_WIDTH", "-1")], dir.path());
        assert_eq!(config.refresh_interval_secs, 300);
        assert_eq!(config.window_width, 800);
    }

    #[test]
    fn test_empty_values_treated_as_unset() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&[("DISPLAY_URL", ""), ("SDL_VIDEODRIVER", "  ")], dir.path());
        assert_eq!(config.url, "https://google.com");
        assert_eq!(config.preferred_backend, None);
    }

    #[test]
    fn test_malformed_night_window_is_kept_raw() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(&[("NIGHT_START", "late")], dir.path());
        assert_eq!(config.night_start, "late");
    }

    #[test]
    fn test_parse_bool_variants() {
        for raw in ["true", "TRUE", "1", "yes", " on "] {
            assert!(parse_bool(raw), "{raw} should be true");
        }
        for raw in ["false", "0", "off", "maybe"] {
            assert!(!parse_bool(raw), "{raw} should be false");
        }
    }

    #[test]
    fn test_detect_backlight_picks_first_device_with_brightness() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a_no_attr")).unwrap();
        for device in ["rpi_backlight", "intel_backlight"] {
            let device_dir = dir.path().join(device);
            std::fs::create_dir_all(&device_dir).unwrap();
            std::fs::write(device_dir.join("brightness"), "10").unwrap();
        }

        assert_eq!(
            detect_backlight(dir.path()),
            Some(dir.path().join("intel_backlight/brightness"))
        );
    }

    #[test]
    fn test_detect_backlight_missing_class_dir() {
        assert_eq!(detect_backlight(Path::new("/nonexistent/backlight/class")), None);
    }

    #[test]
    fn test_auto_detected_backlight_used_when_unset() {
        let dir = tempfile::tempdir().unwrap();
        let device_dir = dir.path().join("panel");
        std::fs::create_dir_all(&device_dir).unwrap();
        std::fs::write(device_dir.join("brightness"), "0").unwrap();

        let config = load(&[], dir.path());
        assert_eq!(config.backlight_path, Some(device_dir.join("brightness")));
    }

    #[test]
    fn test_serializes_rotation_as_degrees() {
        let config = Config {
            rotation: Rotation::Deg180,
            ..Config::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["rotation"], 180);
        assert_eq!(json["backlight_path"], serde_json::Value::Null);
    }
}
