mod capture;
mod cli;
mod engine;
mod visualizer;

use anyhow::Context;
use clap::Parser;
use pulse_core::bands::{Band, BinRange};
use pulse_core::config::Config;
use pulse_core::light::LightSession;
use pulse_core::platform;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long the processing thread gets to notice cancellation.
const PROCESSING_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    if args.list_devices {
        return capture::print_input_devices();
    }

    init_logging(args.log_stderr)?;
    info!("wizpulse starting…");

    // ── Load config ──────────────────────────────────────────────────────────
    let config = args.load_config()?;
    log_banner(&config);
    println!(
        "Start: Attack={}, Release={}",
        config.envelope.attack, config.envelope.release
    );

    // ── Bulbs ────────────────────────────────────────────────────────────────
    let (controller, session) = if config.light.enabled {
        match LightSession::start(&config.light).await {
            Ok(Some((controller, session))) => (Some(controller), Some(session)),
            Ok(None) => (None, None),
            Err(e) => {
                warn!("Light control unavailable: {}", e);
                (None, None)
            }
        }
    } else {
        info!("Light control disabled");
        (None, None)
    };

    // ── Processing thread ────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let engine = engine::Engine::new(config, controller, !args.no_viz);
    let mut processing = tokio::task::spawn_blocking({
        let cancel = cancel.clone();
        move || engine.run(cancel)
    });

    let outcome = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Interrupt received, shutting down");
            cancel.cancel();
            match tokio::time::timeout(PROCESSING_JOIN_TIMEOUT, &mut processing).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Processing thread did not stop in time");
                    Ok(Ok(()))
                }
            }
        }
        joined = &mut processing => joined,
    };
    cancel.cancel();

    // ── Restore bulbs on every exit path ─────────────────────────────────────
    if let Some(session) = session {
        let restored = session.shutdown().await;
        info!("Restored {} bulb(s)", restored);
    }

    let result = outcome
        .context("processing thread panicked")
        .and_then(|r| r);
    match &result {
        Ok(()) => println!("Stopped."),
        Err(e) => error!("wizpulse stopped with error: {:#}", e),
    }
    result
}

fn init_logging(to_stderr: bool) -> anyhow::Result<()> {
    // Allow RUST_LOG override; default to debug for our own crates.
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,pulse_core=debug,wizpulse=debug".to_string());

    if to_stderr {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(log_filter.as_str())
            .init();
        return Ok(());
    }

    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let log_path = platform::log_path();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    // Print log path to stderr so it can be tailed right away.
    eprintln!("wizpulse log: {}", log_path.display());
    Ok(())
}

fn log_banner(config: &Config) {
    let audio = &config.audio;
    let env = &config.envelope;
    info!(
        "Audio: {} Hz, frame {}, device {}",
        audio.sample_rate,
        audio.frame_size,
        audio.device.as_deref().unwrap_or("<default>")
    );
    info!(
        "Envelope: attack={} release={} contrast={} gate={}",
        env.attack, env.release, env.contrast, env.noise_gate
    );
    for band in Band::ALL {
        let (lo, hi) = band.hz_range(&config.bands);
        let bins = BinRange::from_hz(audio.sample_rate, audio.frame_size, lo, hi);
        info!("{:<3} {:>5}-{:<5} Hz -> bins {:?}", band.name(), lo, hi, bins.as_range());
    }
}
