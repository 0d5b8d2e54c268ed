#![forbid(unsafe_code)]

mod backlight;
mod compositor;
mod config;
mod constants;
mod display;
mod lifecycle;
mod night;
mod scheduler;
mod signals;
mod snapshot;

use anyhow::Result;
use clap::Parser;
use std::time::Instant;
use tracing::{debug, error, info, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use backlight::Backlight;
use config::Config;
use display::DisplayHandle;
use lifecycle::LifecycleController;
use scheduler::Scheduler;
use snapshot::ChromiumSnapshot;

/// screen-dashboard: show a periodically refreshed web page on an attached screen
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Run a single render-or-blank cycle and exit
    #[arg(long)]
    once: bool,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    print_config: bool,

    /// Log level (trace, debug, info, warn, error); overrides LOG_LEVEL
    #[arg(long)]
    log_level: Option<String>,
}

fn parse_log_level(raw: &str) -> TraceLevel {
    match raw.trim().to_lowercase().as_str() {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = parse_log_level(
        &cli.log_level
            .clone()
            .or_else(|| std::env::var(constants::env::LOG_LEVEL).ok())
            .unwrap_or_else(|| "info".to_string()),
    );
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let result = run(&cli);
    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "Fatal error");
    }
    result
}

fn run(cli: &Cli) -> Result<()> {
    let config = Config::from_env();

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    info!("Starting Screen Dashboard");
    let shutdown = signals::spawn_listener()?;

    // Fatal if nothing at all can be opened; there is no retry within a run
    let display = DisplayHandle::initialize(&config)?;
    let backlight = Backlight::new(config.backlight_path.clone(), config.backlight_max);
    match backlight.path() {
        Some(path) => info!(path = %path.display(), max = backlight.max(), "Backlight control enabled"),
        None => info!("No backlight device, brightness control disabled"),
    }
    let producer = ChromiumSnapshot::from_config(&config);
    let mut controller = LifecycleController::new(&config, display, backlight, producer);
    info!(
        url = %config.url,
        refresh_secs = config.refresh_interval_secs,
        backend = %controller.display().backend(),
        "Dashboard initialized"
    );

    // Never leave the screen uninitialized until the first tick
    let outcome = controller.run_cycle();
    debug!(outcome = %outcome, "Cycle finished");
    if cli.once {
        return Ok(());
    }

    let mut scheduler = Scheduler::new(config.refresh_interval(), Instant::now());
    info!(check_interval_secs = config.check_interval_secs, "Entering main loop");

    let signal = scheduler::run_loop(&mut scheduler, config.check_interval(), &shutdown, || {
        let outcome = controller.run_cycle();
        debug!(outcome = %outcome, "Cycle finished");
    })?;

    info!(signal = signals::name(signal), "Shutting down gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("DEBUG"), TraceLevel::DEBUG);
        assert_eq!(parse_log_level(" warn "), TraceLevel::WARN);
        assert_eq!(parse_log_level("verbose"), TraceLevel::INFO);
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from(["screen-dashboard", "--once", "--log-level", "trace"]);
        assert!(cli.once);
        assert!(!cli.print_config);
        assert_eq!(cli.log_level.as_deref(), Some("trace"));
    }
}
