//! Page snapshots via a headless browser process

use std::fmt;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::chromium;

/// Why a snapshot could not be produced
#[derive(Debug)]
pub enum SnapshotError {
    /// The producer executable could not be started
    Spawn { program: PathBuf, source: io::Error },
    /// The producer ran past its deadline and was killed
    Timeout { after: Duration },
    /// The producer exited unsuccessfully; `code` is `None` when killed by a signal
    Failed { code: Option<i32> },
    /// The producer exited cleanly but left no image behind
    MissingOutput { path: PathBuf },
    /// Waiting on the producer failed
    Wait(io::Error),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn { program, source } => {
                write!(f, "failed to start {}: {}", program.display(), source)
            }
            Self::Timeout { after } => write!(f, "screenshot timed out after {}s", after.as_secs()),
            Self::Failed { code: Some(code) } => write!(f, "browser failed with exit code {}", code),
            Self::Failed { code: None } => write!(f, "browser was terminated by a signal"),
            Self::MissingOutput { path } => {
                write!(f, "browser exited cleanly but {} was not written", path.display())
            }
            Self::Wait(e) => write!(f, "failed to wait for browser: {}", e),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            Self::Wait(e) => Some(e),
            _ => None,
        }
    }
}

/// Something that turns the configured page into an image file
pub trait SnapshotProducer {
    fn capture(&mut self) -> Result<PathBuf, SnapshotError>;
}

/// Headless Chromium `--screenshot` runner
#[derive(Debug, Clone)]
pub struct ChromiumSnapshot {
    pub program: PathBuf,
    pub url: String,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub timeout: Duration,
}

impl ChromiumSnapshot {
    pub fn from_config(config: &Config) -> Self {
        Self {
            program: config.chromium_path.clone(),
            url: config.url.clone(),
            output: config.screenshot_path.clone(),
            width: config.window_width,
            height: config.window_height,
            timeout: config.chromium_timeout(),
        }
    }

    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = chromium::BASE_FLAGS.iter().map(|s| s.to_string()).collect();
        args.push(format!("--screenshot={}", self.output.display()));
        args.push(format!("--window-size={},{}", self.width, self.height));
        args.push(self.url.clone());
        args
    }

    fn spawn(&self) -> Result<Child, SnapshotError> {
        Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // Own process group so a timeout can take down the renderer children too
            .process_group(0)
            .spawn()
            .map_err(|source| SnapshotError::Spawn {
                program: self.program.clone(),
                source,
            })
    }
}

impl SnapshotProducer for ChromiumSnapshot {
    fn capture(&mut self) -> Result<PathBuf, SnapshotError> {
        // A leftover file from a previous run must not count as success
        remove_stale(&self.output);

        debug!(program = %self.program.display(), args = ?self.args(), "Starting browser");
        let mut child = self.spawn()?;

        let status = wait_with_timeout(&mut child, self.timeout)?;
        let Some(status) = status else {
            kill_group(&mut child);
            return Err(SnapshotError::Timeout { after: self.timeout });
        };

        if !status.success() {
            return Err(SnapshotError::Failed { code: status.code() });
        }
        if !self.output.exists() {
            return Err(SnapshotError::MissingOutput {
                path: self.output.clone(),
            });
        }

        info!(path = %self.output.display(), "Screenshot captured");
        Ok(self.output.clone())
    }
}

fn remove_stale(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed previous screenshot"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove previous screenshot"),
    }
}

/// Poll until the child exits or `timeout` elapses; `None` means timed out
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>, SnapshotError> {
    let deadline = Instant::now() + timeout;
    let poll = Duration::from_millis(chromium::POLL_INTERVAL_MS);

    loop {
        if let Some(status) = child.try_wait().map_err(SnapshotError::Wait)? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        std::thread::sleep(poll.min(deadline - now));
    }
}

fn kill_group(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        warn!(pid = child.id(), error = %e, "Failed to kill browser process group");
        let _ = child.kill();
    }
    if let Err(e) = child.wait() {
        warn!(pid = child.id(), error = %e, "Failed to reap browser process");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable shell script standing in for the browser
    fn fake_browser(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-chromium");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn snapshot(program: PathBuf, output: PathBuf, timeout: Duration) -> ChromiumSnapshot {
        ChromiumSnapshot {
            program,
            url: "http://example.invalid/".to_string(),
            output,
            width: 640,
            height: 480,
            timeout,
        }
    }

    const WRITE_SCREENSHOT: &str = r#"for arg in "$@"; do
  case "$arg" in
    --screenshot=*) out="${arg#--screenshot=}" ;;
  esac
done
printf 'image' > "$out""#;

    #[test]
    fn test_args_match_browser_contract() {
        let shot = snapshot(
            PathBuf::from("chromium"),
            PathBuf::from("/tmp/out.png"),
            Duration::from_secs(30),
        );
        assert_eq!(
            shot.args(),
            vec![
                "--headless",
                "--disable-gpu",
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--disable-software-rasterizer",
                "--screenshot=/tmp/out.png",
                "--window-size=640,480",
                "http://example.invalid/",
            ]
        );
    }

    #[test]
    fn test_capture_success_returns_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("shot.png");
        let mut shot = snapshot(fake_browser(dir.path(), WRITE_SCREENSHOT), output.clone(), Duration::from_secs(10));

        assert_eq!(shot.capture().unwrap(), output);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "image");
    }

    #[test]
    fn test_capture_nonzero_exit_carries_code() {
        let dir = tempfile::tempdir().unwrap();
        let mut shot = snapshot(
            fake_browser(dir.path(), "exit 3"),
            dir.path().join("shot.png"),
            Duration::from_secs(10),
        );

        match shot.capture() {
            Err(SnapshotError::Failed { code }) => assert_eq!(code, Some(3)),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_capture_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let mut shot = snapshot(
            fake_browser(dir.path(), "sleep 30"),
            dir.path().join("shot.png"),
            Duration::from_millis(300),
        );

        let started = Instant::now();
        match shot.capture() {
            Err(SnapshotError::Timeout { after }) => assert_eq!(after, Duration::from_millis(300)),
            other => panic!("expected Timeout, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_capture_stale_output_is_not_success() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("shot.png");
        std::fs::write(&output, "old").unwrap();
        let mut shot = snapshot(fake_browser(dir.path(), "exit 0"), output.clone(), Duration::from_secs(10));

        match shot.capture() {
            Err(SnapshotError::MissingOutput { path }) => assert_eq!(path, output),
            other => panic!("expected MissingOutput, got {other:?}"),
        }
    }

    #[test]
    fn test_capture_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let mut shot = snapshot(
            dir.path().join("no-such-browser"),
            dir.path().join("shot.png"),
            Duration::from_secs(1),
        );

        assert!(matches!(shot.capture(), Err(SnapshotError::Spawn { .. })));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            SnapshotError::Timeout { after: Duration::from_secs(30) }.to_string(),
            "screenshot timed out after 30s"
        );
        assert_eq!(
            SnapshotError::Failed { code: Some(21) }.to_string(),
            "browser failed with exit code 21"
        );
    }
}
