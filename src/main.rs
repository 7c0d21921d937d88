//! `lowerdeck` - builds the overlay bundle and drives playback.
//!
//! `lowerdeck build` writes the bundle once. `lowerdeck run` (the default)
//! keeps ticking the scheduler, answers bridge requests read as JSON lines on
//! stdin and prints responses and notifications as JSON lines on stdout.

use std::time::Instant;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;

use lowerdeck::app::App;
use lowerdeck::bridge;
use lowerdeck::config::Config;

/// Initialize logging to stderr, keeping stdout for the bridge.
fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lowerdeck=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_line(value: &impl serde::Serialize) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::error!("Failed to encode output line: {e}"),
    }
}

async fn run(mut app: App) -> Result<()> {
    let _relay = bridge::relay(app.bus(), |notification| print_line(&notification));

    let mut ticker = tokio::time::interval(app.config.tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    tracing::info!(tick = ?app.config.tick, "Running; send JSON requests on stdin, Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = ticker.tick() => app.tick(Instant::now()),
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => print_line(&bridge::handle_json(&mut app, &line, Instant::now())),
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!("Stopped reading requests: {e}");
                    stdin_open = false;
                }
            },
            result = signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Received Ctrl-C, shutting down");
                break;
            }
        }
    }

    app.scheduler.stop_all(&mut app.store);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let command = std::env::args().nth(1).unwrap_or_else(|| "run".to_string());
    let config = Config::load().context("Failed to load configuration")?;
    tracing::info!(version = config.app_version(), output_dir = ?config.output_dir, "Starting {}", config.app_name());

    let mut app = App::new(config);
    let report = app.open().context("Failed to open output directory")?;
    tracing::info!(page = %report.html_path.display(), version = %report.version, "Bundle ready");

    match command.as_str() {
        "build" => Ok(()),
        "run" => run(app).await,
        other => bail!("Unknown command '{other}' (expected 'run' or 'build')"),
    }
}
