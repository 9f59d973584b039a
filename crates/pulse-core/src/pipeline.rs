use crate::bands::{Band, BinRange};
use crate::config::Config;
use crate::envelope::BandEnvelope;
use crate::spectrum::SpectrumAnalyzer;

/// The three envelope levels produced for one frame, each 0..=100.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandLevels {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl BandLevels {
    pub fn get(&self, band: Band) -> f32 {
        match band {
            Band::Low => self.low,
            Band::Mid => self.mid,
            Band::High => self.high,
        }
    }
}

/// Mono frame -> spectrum -> three band envelopes.
pub struct BandPipeline {
    analyzer: SpectrumAnalyzer,
    low: BandEnvelope,
    mid: BandEnvelope,
    high: BandEnvelope,
}

impl BandPipeline {
    pub fn new(config: &Config) -> Self {
        let sample_rate = config.audio.sample_rate;
        let frame_size = config.audio.frame_size;
        let envelope = |band: Band| {
            let (lo, hi) = band.hz_range(&config.bands);
            BandEnvelope::new(
                BinRange::from_hz(sample_rate, frame_size, lo, hi),
                config.envelope.clone(),
            )
        };

        Self {
            analyzer: SpectrumAnalyzer::new(frame_size),
            low: envelope(Band::Low),
            mid: envelope(Band::Mid),
            high: envelope(Band::High),
        }
    }

    pub fn envelope(&self, band: Band) -> &BandEnvelope {
        match band {
            Band::Low => &self.low,
            Band::Mid => &self.mid,
            Band::High => &self.high,
        }
    }

    /// Window + transform one mono frame and advance every envelope.
    pub fn process_frame(&mut self, frame: &[f32]) -> BandLevels {
        let spectrum = self.analyzer.magnitudes(frame);
        BandLevels {
            low: self.low.process(spectrum),
            mid: self.mid.process(spectrum),
            high: self.high.process(spectrum),
        }
    }
}
