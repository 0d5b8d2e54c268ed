//! Render-or-blank cycle
//!
//! Each cycle is memoryless: the night/day decision is recomputed from the
//! wall clock, and any failure ends the cycle with the screen left as it was.

use chrono::{Local, NaiveTime};
use std::fmt;
use tracing::{debug, error, info};

use crate::backlight::Backlight;
use crate::compositor;
use crate::config::Config;
use crate::display::DisplayHandle;
use crate::night::{NightWindow, ScreenState};
use crate::snapshot::{SnapshotError, SnapshotProducer};

/// What a single cycle ended up doing
#[derive(Debug)]
pub enum CycleOutcome {
    /// Night: screen filled black and backlight switched off
    Blanked,
    /// Day: fresh snapshot shown and backlight switched on
    Rendered,
    /// Day: no snapshot; display untouched
    SnapshotFailed(SnapshotError),
    /// Day: snapshot could not be shown; display untouched
    RenderFailed(anyhow::Error),
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blanked => f.write_str("blanked"),
            Self::Rendered => f.write_str("rendered"),
            Self::SnapshotFailed(e) => write!(f, "snapshot failed: {}", e),
            Self::RenderFailed(e) => write!(f, "render failed: {:#}", e),
        }
    }
}

/// Owns the display and backlight for the life of the process
pub struct LifecycleController<'a, P> {
    config: &'a Config,
    display: DisplayHandle,
    backlight: Backlight,
    producer: P,
}

impl<'a, P: SnapshotProducer> LifecycleController<'a, P> {
    pub fn new(config: &'a Config, display: DisplayHandle, backlight: Backlight, producer: P) -> Self {
        Self {
            config,
            display,
            backlight,
            producer,
        }
    }

    pub fn display(&self) -> &DisplayHandle {
        &self.display
    }

    /// Night or day at `now`; a malformed window fails open to day
    pub fn screen_state(&self, now: NaiveTime) -> ScreenState {
        if !self.config.night_mode_enabled {
            return ScreenState::Day;
        }

        match NightWindow::parse(&self.config.night_start, &self.config.night_end) {
            Ok(window) if window.contains(now) => ScreenState::Night,
            Ok(_) => ScreenState::Day,
            Err(e) => {
                error!(error = %format!("{e:#}"), "Invalid time format, treating as day");
                ScreenState::Day
            }
        }
    }

    pub fn run_cycle(&mut self) -> CycleOutcome {
        self.run_cycle_at(Local::now().time())
    }

    pub fn run_cycle_at(&mut self, now: NaiveTime) -> CycleOutcome {
        match self.screen_state(now) {
            ScreenState::Night => {
                info!("Night time - turning off screen");
                self.turn_off();
                CycleOutcome::Blanked
            }
            ScreenState::Day => {
                info!(url = %self.config.url, "Updating display");
                self.refresh()
            }
        }
    }

    fn refresh(&mut self) -> CycleOutcome {
        let path = match self.producer.capture() {
            Ok(path) => path,
            Err(e) => {
                match &e {
                    SnapshotError::Timeout { after } => {
                        error!(timeout_secs = after.as_secs(), "Screenshot timed out, keeping current screen")
                    }
                    SnapshotError::Failed { code } => {
                        error!(exit_code = ?code, "Browser failed, keeping current screen")
                    }
                    other => error!(error = %other, "Screenshot failed, keeping current screen"),
                }
                return CycleOutcome::SnapshotFailed(e);
            }
        };

        if let Err(e) = compositor::render(self.display.surface_mut(), &path, self.config.rotation) {
            error!(error = %format!("{e:#}"), "Error displaying image, keeping current screen");
            return CycleOutcome::RenderFailed(e);
        }

        self.turn_on();
        CycleOutcome::Rendered
    }

    /// Blank to black, then cut the backlight
    pub fn turn_off(&mut self) {
        // Still cut the backlight even if the surface write failed
        if let Err(e) = self.display.surface_mut().blank() {
            error!(error = %format!("{e:#}"), "Failed to blank display");
        }
        self.backlight.off();
        info!("Screen turned off");
    }

    /// Restore full brightness; surface content is left as is
    pub fn turn_on(&mut self) {
        self.backlight.on();
        debug!("Screen turned on");
    }
}
