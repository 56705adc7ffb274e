//! Echotest - acoustic echo-cancellation test
//!
//! Plays a reference signal at each configured output volume, records the
//! loopback, and reports echo metrics locally and to a webhook.

use anyhow::{Context, Result};
use clap::Parser;
use echotest::audio::engine::{CpalDeviceInfo, CpalPlaybackRecorder};
use echotest::audio::signal::{HttpWavSource, SignalSource};
use echotest::config::AppConfig;
use echotest::platform::{HostSystemInfo, SystemVolume};
use echotest::report::store::ResultStore;
use echotest::report::webhook::WebhookClient;
use echotest::report::ReportPipeline;
use echotest::sweep::{Sweep, SweepReport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Acoustic echo-cancellation test across output volume levels
#[derive(Debug, Parser)]
#[command(name = "echotest", version, about)]
struct Cli {
    /// Reference WAV URL
    #[arg(long)]
    url: Option<String>,

    /// Webhook receiving each trial result
    #[arg(long)]
    webhook: Option<String>,

    /// Trial duration in seconds
    #[arg(long)]
    duration: Option<u32>,

    /// Sample rate in Hz the reference must have
    #[arg(long)]
    rate: Option<u32>,

    /// Bearer token for the webhook
    #[arg(long, env = "ECHOTEST_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Comma-separated output volume levels, e.g. 75,88,100
    #[arg(long, value_delimiter = ',', value_parser = clap::value_parser!(u8).range(0..=100))]
    levels: Vec<u8>,

    /// Directory for per-level result files
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// JSON config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// List audio devices and exit
    #[arg(long, short = 'l')]
    list_devices: bool,
}

impl Cli {
    /// Command line values override the config file
    fn apply(self, mut config: AppConfig) -> (AppConfig, Option<String>) {
        if let Some(url) = self.url {
            config.reference_url = url;
        }
        if let Some(webhook) = self.webhook {
            config.webhook_url = Some(webhook);
        }
        if let Some(duration) = self.duration {
            config.duration_secs = duration;
        }
        if let Some(rate) = self.rate {
            config.sample_rate = rate;
        }
        if !self.levels.is_empty() {
            config.levels = self.levels;
        }
        if let Some(dir) = self.results_dir {
            config.results_dir = dir;
        }
        let token = self.token.filter(|t| !t.is_empty());
        (config, token)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("echotest=info".parse()?)
                .add_directive("echotest_core=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        return list_devices();
    }

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let (config, token) = cli.apply(AppConfig::load(&config_path));

    info!("Echotest v{}", echotest::VERSION);
    info!(
        url = %config.reference_url,
        webhook = config.webhook_url.as_deref().unwrap_or("<none>"),
        duration_secs = config.duration_secs,
        sample_rate = config.sample_rate,
        levels = ?config.levels,
        "Configuration"
    );

    let source = HttpWavSource::new().context("Failed to create HTTP client")?;
    let reference = source
        .fetch(&config.reference_url)
        .await
        .with_context(|| format!("Failed to load reference signal from {}", config.reference_url))?;

    let webhook = config
        .webhook_config(token)
        .map(WebhookClient::new)
        .transpose()
        .context("Failed to create webhook client")?;
    let has_webhook = webhook.is_some();
    let sink = ReportPipeline::new(
        ResultStore::new(&config.results_dir),
        webhook,
        Arc::new(HostSystemInfo),
    );

    let mut sweep = Sweep::new(
        config.sweep_config(),
        Arc::new(SystemVolume::new()),
        Arc::new(CpalDeviceInfo),
        Arc::new(CpalPlaybackRecorder::new()),
        Arc::new(sink),
    );

    // Dropping the sweep future on Ctrl+C restores the original volume
    let report = tokio::select! {
        result = sweep.run(&reference) => result.context("Echo test failed")?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, restoring original volume");
            anyhow::bail!("Interrupted");
        }
    };

    print_summary(&report, has_webhook);
    Ok(())
}

fn list_devices() -> Result<()> {
    let devices = match CpalPlaybackRecorder::list_devices() {
        Ok(devices) => devices,
        Err(e) => {
            error!("Failed to list devices: {}", e);
            return Err(e.into());
        }
    };

    if devices.is_empty() {
        println!("No audio devices found.");
        return Ok(());
    }

    println!("Found {} device(s):", devices.len());
    println!();
    for (i, device) in devices.iter().enumerate() {
        let mut markers = Vec::new();
        if device.is_default_output {
            markers.push("DEFAULT OUT");
        }
        if device.is_default_input {
            markers.push("DEFAULT IN");
        }
        let marker = if markers.is_empty() {
            String::new()
        } else {
            format!(" [{}]", markers.join(", "))
        };
        println!("  {}. {}{}", i + 1, device.name, marker);
        println!(
            "     Channels: {} in, {} out",
            device.input_channels, device.output_channels
        );
    }

    Ok(())
}

fn print_summary(report: &SweepReport, has_webhook: bool) {
    println!();
    println!("Volume | ERL dB | ERLE dB | TCLw dB | Tail s | Latency s | Webhook");
    println!("───────┼────────┼─────────┼─────────┼────────┼───────────┼────────");
    for trial in &report.trials {
        let m = &trial.metrics;
        let webhook = match (has_webhook, trial.delivered) {
            (false, _) => "skipped",
            (true, true) => "sent",
            (true, false) => "failed",
        };
        println!(
            "{:>5}% | {:>6.2} | {:>7.2} | {:>7.2} | {:>6.3} | {:>9.3} | {}",
            m.volume_percent,
            m.erl_db,
            m.erle_db,
            m.tclw_db,
            m.echo_tail_length_s,
            m.latency_s,
            webhook
        );
    }
    println!();
    println!("Output volume restored to {}%", report.original_volume);
}
