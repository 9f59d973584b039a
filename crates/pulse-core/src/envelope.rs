//! Per-band energy envelope: noise gate, rolling auto-gain, contrast curve,
//! and asymmetric attack/release smoothing.
//!
//! One [`BandEnvelope`] exists per band and is advanced once per audio frame.
//! The output is a 0..=100 level that snaps up on transients and decays with
//! a slow tail.

use std::collections::VecDeque;

use crate::bands::BinRange;
use crate::config::EnvelopeConfig;

/// History must hold more than this many samples before the percentile
/// replaces the warm-up reference.
const MIN_HISTORY_FOR_PERCENTILE: usize = 10;

const REFERENCE_PERCENTILE: f32 = 95.0;

/// Floor for the auto-gain reference so near-silent history cannot blow up
/// the normalization.
const REFERENCE_FLOOR: f32 = 0.001;

#[derive(Debug, Clone)]
pub struct BandEnvelope {
    range: BinRange,
    config: EnvelopeConfig,
    history: VecDeque<f32>,
    val: f32,
}

impl BandEnvelope {
    pub fn new(range: BinRange, config: EnvelopeConfig) -> Self {
        let capacity = config.history_len.max(1);
        Self {
            range,
            config,
            history: VecDeque::with_capacity(capacity),
            val: 0.0,
        }
    }

    pub fn range(&self) -> BinRange {
        self.range
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Consume one magnitude spectrum and return the new level.
    pub fn process(&mut self, spectrum: &[f32]) -> f32 {
        let mut energy = band_energy(spectrum, self.range);

        if energy < self.config.noise_gate {
            energy = 0.0;
        } else {
            if self.history.len() >= self.config.history_len.max(1) {
                self.history.pop_front();
            }
            self.history.push_back(energy);
        }

        let norm = (energy / self.local_max()).clamp(0.0, 1.0);
        let target = norm.powf(self.config.contrast) * 100.0;

        let factor = if target > self.val {
            self.config.attack
        } else {
            self.config.release
        };
        self.val = smooth(self.val, target, factor);
        self.val
    }

    /// Auto-gain reference the next frame is normalized against.
    pub fn local_max(&self) -> f32 {
        let reference = if self.history.len() > MIN_HISTORY_FOR_PERCENTILE {
            percentile(self.history.iter().copied(), REFERENCE_PERCENTILE)
        } else {
            self.config.warmup_reference
        };
        if reference.is_finite() {
            reference.max(REFERENCE_FLOOR)
        } else {
            REFERENCE_FLOOR
        }
    }
}

/// Mean magnitude over the bin range; 0 for an empty range, a range outside
/// the spectrum, or a non-finite result.
pub fn band_energy(spectrum: &[f32], range: BinRange) -> f32 {
    let end = range.end.min(spectrum.len());
    if range.start >= end {
        return 0.0;
    }
    let bins = &spectrum[range.start..end];
    let mean = bins.iter().sum::<f32>() / bins.len() as f32;
    if mean.is_finite() {
        mean.max(0.0)
    } else {
        0.0
    }
}

/// One blend step toward `target`, clamped to the output range.
pub fn smooth(current: f32, target: f32, factor: f32) -> f32 {
    (current * (1.0 - factor) + target * factor).clamp(0.0, 100.0)
}

/// Percentile with linear interpolation between closest ranks.
///
/// Empty input yields 0.
pub fn percentile(values: impl IntoIterator<Item = f32>, pct: f32) -> f32 {
    let mut sorted: Vec<f32> = values.into_iter().collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f32;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}
