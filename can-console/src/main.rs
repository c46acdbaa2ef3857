//! canscope: headless CAN traffic console
//!
//! Connects the frame pipeline to the simulated bus, restores saved filters,
//! comments and periodic jobs, prints admitted traffic and finishes with a
//! per-identifier summary.

mod runner;
mod settings;
mod traffic_log;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use runner::RunOptions;
use settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "canscope", version, about = "Headless CAN traffic console")]
struct Args {
    /// Channel to open (1-4), overrides the saved setting
    #[arg(long, env = "CANSCOPE_CHANNEL")]
    channel: Option<u8>,

    /// Capture time in seconds
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,

    /// Write the traffic log to this file when done
    #[arg(long)]
    export: Option<PathBuf>,

    /// Settings file (defaults to the XDG config location)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Write the effective settings back before capturing
    #[arg(long)]
    save_settings: bool,

    /// Do not print frames as they arrive
    #[arg(long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Include all our crates in the default filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "canscope=info,can_frame=info,can_pipeline=info,can_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    tracing::info!("Starting canscope");

    let mut settings = match &args.settings {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    if let Some(channel) = args.channel {
        settings.channel = channel;
    }

    if args.save_settings {
        let path = match &args.settings {
            Some(path) => settings.save_to(path).map(|_| path.clone()),
            None => settings.save(),
        }
        .context("could not save settings")?;
        tracing::info!("Settings written to {}", path.display());
    }

    let options = RunOptions {
        channel: settings.channel,
        duration: Duration::from_secs(args.duration_secs),
        echo: !args.quiet,
    };
    let report = runner::run(&settings, &options).await?;

    let counters = report.status.counters;
    println!();
    println!(
        "TX {}  RX {}  ERR {}  send failures {}  logged {}  dropped {}",
        counters.tx,
        counters.rx,
        counters.err,
        counters.send_failures,
        report.log.len(),
        report.dropped + report.log.evicted()
    );
    print!("{}", runner::format_stats(&report.stats));

    if let Some(path) = &args.export {
        report
            .log
            .save(path)
            .with_context(|| format!("could not write {}", path.display()))?;
        tracing::info!("Traffic log written to {}", path.display());
    }

    Ok(())
}
