//! Night window evaluation
//!
//! Decides whether "now" falls inside the configured blanking window. Both
//! boundaries are inclusive, and a window whose start is later than its end
//! wraps around midnight.

use anyhow::{Context, Result};
use chrono::NaiveTime;

/// Whether the screen should be blanked or rendered this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenState {
    Night,
    Day,
}

/// Parsed night window bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl NightWindow {
    /// Parse raw `HH:MM` (or `HH:MM:SS`) bounds
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(Self {
            start: parse_time_of_day(start)
                .context(format!("Invalid night start time '{}'", start))?,
            end: parse_time_of_day(end).context(format!("Invalid night end time '{}'", end))?,
        })
    }

    pub fn contains(&self, now: NaiveTime) -> bool {
        is_night(now, self.start, self.end, true)
    }
}

/// Parse a time of day in `HH:MM` or `HH:MM:SS` form
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .context("expected HH:MM or HH:MM:SS")
}

pub fn is_night(now: NaiveTime, start: NaiveTime, end: NaiveTime, enabled: bool) -> bool {
    if !enabled {
        return false;
    }

    if start > end {
        // Overnight window, e.g. 22:00 -> 07:00
        now >= start || now <= end
    } else {
        start <= now && now <= end
    }
}
