//! Input device selection and the cpal capture stream.
//!
//! The cpal callback never blocks: each buffer is copied into a bounded
//! channel and dropped when the processing thread falls behind.

use anyhow::{anyhow, bail, Context};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
    SupportedStreamConfigRange,
};
use pulse_core::config::AudioConfig;
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use tracing::{debug, info, warn};

/// Buffers queued between the audio callback and the processing loop.
const CHUNK_QUEUE: usize = 64;

/// A running input stream. Dropping it stops capture.
pub struct AudioCapture {
    _stream: Stream,
    pub device_name: String,
    pub channels: usize,
    pub chunks: Receiver<Vec<f32>>,
}

impl AudioCapture {
    pub fn open(config: &AudioConfig) -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = select_device(&host, config.device.as_deref())?;
        let device_name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());

        let ranges: Vec<SupportedStreamConfigRange> = device
            .supported_input_configs()
            .with_context(|| format!("no input configs for '{}'", device_name))?
            .collect();
        let preferred_channels = device.default_input_config().ok().map(|c| c.channels());
        let rate = SampleRate(config.sample_rate);
        let Some(range) = pick_config(&ranges, rate, preferred_channels) else {
            bail!(
                "'{}' cannot capture at {} Hz (supported: {})",
                device_name,
                config.sample_rate,
                describe_rates(&ranges)
            );
        };
        let supported = range.with_sample_rate(rate);
        let sample_format = supported.sample_format();
        let stream_config = supported.config();
        let channels = usize::from(stream_config.channels.max(1));

        let (tx, rx) = std::sync::mpsc::sync_channel(CHUNK_QUEUE);
        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, tx),
            SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, tx),
            SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, tx),
            SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, tx),
            other => bail!("unsupported sample format {}", other),
        }
        .with_context(|| {
            format!(
                "failed to open '{}' at {} Hz, {} channel(s), {}",
                device_name, config.sample_rate, channels, sample_format
            )
        })?;
        stream.play().context("failed to start audio stream")?;

        info!(
            "Capturing from '{}' at {} Hz, {} channel(s), {}",
            device_name, config.sample_rate, channels, sample_format
        );
        Ok(Self {
            _stream: stream,
            device_name,
            channels,
            chunks: rx,
        })
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    tx: SyncSender<Vec<f32>>,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| forward_chunk(&tx, data),
        |err| warn!("Audio stream error: {}", err),
        None,
    )
}

/// Sample formats we can convert, best first.
fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::F32 => Some(3),
        SampleFormat::I32 => Some(2),
        SampleFormat::I16 => Some(1),
        SampleFormat::U16 => Some(0),
        _ => None,
    }
}

/// A supported range that can run at `rate`, preferring float samples and
/// then the device's default channel count.
fn pick_config(
    ranges: &[SupportedStreamConfigRange],
    rate: SampleRate,
    preferred_channels: Option<u16>,
) -> Option<SupportedStreamConfigRange> {
    ranges
        .iter()
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .filter_map(|r| {
            let rank = format_rank(r.sample_format())?;
            Some(((rank, Some(r.channels()) == preferred_channels), r))
        })
        .max_by_key(|(key, _)| *key)
        .map(|(_, r)| r.clone())
}

fn describe_rates(ranges: &[SupportedStreamConfigRange]) -> String {
    if ranges.is_empty() {
        return "none".to_string();
    }
    ranges
        .iter()
        .map(|r| {
            let (lo, hi) = (r.min_sample_rate().0, r.max_sample_rate().0);
            if lo == hi {
                format!("{} Hz {}", lo, r.sample_format())
            } else {
                format!("{}-{} Hz {}", lo, hi, r.sample_format())
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn forward_chunk<T>(tx: &SyncSender<Vec<f32>>, data: &[T])
where
    T: Sample,
    f32: FromSample<T>,
{
    let chunk: Vec<f32> = data.iter().map(|s| s.to_sample::<f32>()).collect();
    match tx.try_send(chunk) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => debug!("Processing behind, dropped {} samples", data.len()),
        Err(TrySendError::Disconnected(_)) => {}
    }
}

/// First input device whose name contains `wanted` (case-insensitive), or
/// the host default when nothing is requested.
fn select_device(host: &cpal::Host, wanted: Option<&str>) -> anyhow::Result<Device> {
    let Some(wanted) = wanted else {
        return host
            .default_input_device()
            .ok_or_else(|| anyhow!("no default input device"));
    };

    let devices = host.input_devices().context("failed to enumerate input devices")?;
    for device in devices {
        if let Ok(name) = device.name() {
            if name_matches(&name, wanted) {
                return Ok(device);
            }
        }
    }
    Err(anyhow!(
        "no input device matching '{}' (try --list-devices)",
        wanted
    ))
}

pub fn name_matches(name: &str, wanted: &str) -> bool {
    name.to_lowercase().contains(&wanted.to_lowercase())
}

/// Print every input device, marking the default.
pub fn print_input_devices() -> anyhow::Result<()> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    println!("Input devices ({}):", host.id().name());
    let mut count = 0;
    for device in host.input_devices().context("failed to enumerate input devices")? {
        let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        let marker = if default_name.as_deref() == Some(name.as_str()) { "*" } else { " " };
        match device.default_input_config() {
            Ok(cfg) => println!(
                " {} {}  ({} ch, {} Hz)",
                marker,
                name,
                cfg.channels(),
                cfg.sample_rate().0
            ),
            Err(_) => println!(" {} {}", marker, name),
        }
        count += 1;
    }
    if count == 0 {
        println!("  (none)");
    }
    Ok(())
}
