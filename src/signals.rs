use anyhow::{Context, Result};
use nix::sys::signal::Signal;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use tracing::debug;

/// Forward SIGINT/SIGTERM to the main loop over a channel
pub fn spawn_listener() -> Result<Receiver<i32>> {
    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                debug!(signal = name(signal), "Signal received");
                if tx.send(signal).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn signal listener thread")?;

    Ok(rx)
}

pub fn name(signal: i32) -> &'static str {
    Signal::try_from(signal).map(Signal::as_str).unwrap_or("unknown")
}
