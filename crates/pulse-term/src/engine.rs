//! The blocking processing loop: capture -> frames -> bands -> lights/bars.

use anyhow::bail;
use pulse_core::config::Config;
use pulse_core::light::{BulbTarget, LightStateController};
use pulse_core::pipeline::{BandLevels, BandPipeline};
use pulse_core::spectrum::FrameAssembler;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::AudioCapture;
use crate::visualizer::Visualizer;

/// How long a receive may block before the cancel token is checked again.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct Engine {
    config: Config,
    controller: Option<LightStateController>,
    show_bars: bool,
}

impl Engine {
    pub fn new(config: Config, controller: Option<LightStateController>, show_bars: bool) -> Self {
        Self {
            config,
            controller,
            show_bars,
        }
    }

    /// Open the input device and process until `cancel` fires or capture
    /// ends. Must run on a blocking thread; the cpal stream lives here.
    pub fn run(mut self, cancel: CancellationToken) -> anyhow::Result<()> {
        let capture = AudioCapture::open(&self.config.audio)?;
        let mut viz = self.show_bars.then(Visualizer::new);

        let result = self.process(&capture.chunks, capture.channels, &cancel, |levels, light| {
            if let Some(viz) = viz.as_mut() {
                if let Err(e) = viz.draw(levels, light) {
                    debug!("Visualizer draw failed: {}", e);
                }
            }
        });

        if let Some(viz) = viz.as_mut() {
            if let Err(e) = viz.finish() {
                warn!("Failed to reset terminal: {}", e);
            }
        }
        info!("Processing stopped ({})", capture.device_name);
        result
    }

    /// The loop itself, independent of the audio backend.
    fn process(
        &mut self,
        chunks: &Receiver<Vec<f32>>,
        channels: usize,
        cancel: &CancellationToken,
        mut on_frame: impl FnMut(&BandLevels, Option<BulbTarget>),
    ) -> anyhow::Result<()> {
        let mut assembler = FrameAssembler::new(self.config.audio.frame_size);
        let mut pipeline = BandPipeline::new(&self.config);
        let mut frames: u64 = 0;

        while !cancel.is_cancelled() {
            let chunk = match chunks.recv_timeout(POLL_INTERVAL) {
                Ok(chunk) => chunk,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => bail!("audio stream closed"),
            };
            if chunk.is_empty() {
                continue;
            }

            assembler.push_interleaved(&chunk, channels);
            while let Some(frame) = assembler.next_frame() {
                let levels = pipeline.process_frame(&frame);
                let light = self.controller.as_mut().map(|ctl| {
                    if ctl.update(levels.low, Instant::now()) {
                        debug!("Beat at bass {:.1}: {:?}", levels.low, ctl.target().color);
                    }
                    ctl.target()
                });
                on_frame(&levels, light);
                frames += 1;
            }
        }

        debug!("Processed {} frames", frames);
        Ok(())
    }
}
