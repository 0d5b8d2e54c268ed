//! Poll-based periodic trigger and the idle-wait main loop

use anyhow::{bail, Result};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Floor for the idle wait so a zero `CHECK_INTERVAL` cannot spin the CPU
const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// A single periodic job, fired when polled at or after its due time
#[derive(Debug, Clone)]
pub struct Scheduler {
    interval: Duration,
    next_due: Instant,
}

impl Scheduler {
    /// First run is due one `interval` after `now`
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next_due: now + interval,
        }
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    /// Run `job` if due; the next run is scheduled one interval after `now`
    pub fn run_pending<F: FnMut()>(&mut self, now: Instant, mut job: F) -> bool {
        if !self.is_due(now) {
            return false;
        }
        job();
        self.next_due = now + self.interval;
        true
    }
}

/// Poll `scheduler`, then idle for `check_interval` until a signal arrives
///
/// Returns the signal number that ended the loop.
pub fn run_loop<F: FnMut()>(
    scheduler: &mut Scheduler,
    check_interval: Duration,
    shutdown: &Receiver<i32>,
    mut job: F,
) -> Result<i32> {
    let wait = check_interval.max(MIN_CHECK_INTERVAL);

    loop {
        if scheduler.run_pending(Instant::now(), &mut job) {
            debug!(next_due_in = ?scheduler.next_due().saturating_duration_since(Instant::now()), "Cycle finished");
        }

        match shutdown.recv_timeout(wait) {
            Ok(signal) => return Ok(signal),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => bail!("Signal listener stopped unexpectedly"),
        }
    }
}
