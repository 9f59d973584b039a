//! Downmix, frame assembly, windowing and magnitude spectrum.
//!
//! The capture callback hands over interleaved chunks of whatever size the
//! device delivers; [`FrameAssembler`] turns those into fixed-size mono
//! frames and [`SpectrumAnalyzer`] turns each frame into `N/2 + 1` magnitudes.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Collects mono samples until a full frame is available.
pub struct FrameAssembler {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size * 2),
        }
    }

    /// Downmix an interleaved chunk and append it.
    pub fn push_interleaved(&mut self, data: &[f32], channels: usize) {
        let channels = channels.max(1);
        for chunk in data.chunks_exact(channels) {
            let sample = chunk.iter().sum::<f32>() / channels as f32;
            self.pending.push(if sample.is_finite() { sample } else { 0.0 });
        }
    }

    /// Take the next complete frame, if any. Frames do not overlap.
    pub fn next_frame(&mut self) -> Option<Vec<f32>> {
        if self.pending.len() < self.frame_size {
            return None;
        }
        let rest = self.pending.split_off(self.frame_size);
        Some(std::mem::replace(&mut self.pending, rest))
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Hann window + forward FFT with pre-allocated buffers.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(frame_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame_size);

        Self {
            fft,
            window: hann_window(frame_size),
            buffer: vec![Complex::new(0.0, 0.0); frame_size],
            magnitudes: vec![0.0; frame_size / 2 + 1],
        }
    }

    /// Magnitude spectrum of one mono frame, bins `0..=N/2`.
    ///
    /// Shorter input is zero-padded; extra samples are ignored.
    pub fn magnitudes(&mut self, frame: &[f32]) -> &[f32] {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = frame.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.buffer);

        for (mag, bin) in self.magnitudes.iter_mut().zip(self.buffer.iter()) {
            *mag = bin.norm();
        }
        &self.magnitudes
    }
}

/// Symmetric Hann window (endpoints are zero).
pub fn hann_window(len: usize) -> Vec<f32> {
    if len < 2 {
        return vec![1.0; len];
    }
    let denom = (len - 1) as f32;
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / denom).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembler_downmixes_and_splits() {
        let mut asm = FrameAssembler::new(4);
        // stereo: (1, 3) -> 2, (0, 0) -> 0, ...
        asm.push_interleaved(&[1.0, 3.0, 0.0, 0.0, -1.0, 1.0], 2);
        assert!(asm.next_frame().is_none());
        assert_eq!(asm.pending(), 3);

        asm.push_interleaved(&[4.0, 4.0, 5.0, 5.0, 6.0, 6.0], 2);
        assert_eq!(asm.next_frame(), Some(vec![2.0, 0.0, 0.0, 4.0]));
        assert_eq!(asm.pending(), 2);
        assert!(asm.next_frame().is_none());
    }

    #[test]
    fn assembler_drops_partial_trailing_sample_and_nan() {
        let mut asm = FrameAssembler::new(2);
        asm.push_interleaved(&[f32::NAN, 1.0, 2.0], 2);
        asm.push_interleaved(&[7.0], 1);
        assert_eq!(asm.next_frame(), Some(vec![0.0, 7.0]));
    }

    #[test]
    fn hann_is_symmetric_with_zero_ends() {
        let w = hann_window(9);
        assert!(w[0].abs() < 1e-7);
        assert!(w[8].abs() < 1e-7);
        assert!((w[4] - 1.0).abs() < 1e-6);
        for i in 0..9 {
            assert!((w[i] - w[8 - i]).abs() < 1e-6);
        }
    }

    #[test]
    fn sine_peaks_in_its_bin() {
        let n = 1024;
        let sr = 44100.0;
        // put the tone exactly on bin 20
        let freq = 20.0 * sr / n as f32;
        let frame: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr).sin())
            .collect();

        let mut analyzer = SpectrumAnalyzer::new(n);
        let mags = analyzer.magnitudes(&frame);
        assert_eq!(mags.len(), n / 2 + 1);

        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(20));
    }

    #[test]
    fn silence_is_all_zero() {
        let mut analyzer = SpectrumAnalyzer::new(64);
        assert!(analyzer.magnitudes(&[0.0; 64]).iter().all(|&m| m == 0.0));
        // short input is zero-padded
        assert!(analyzer.magnitudes(&[]).iter().all(|&m| m == 0.0));
    }
}
