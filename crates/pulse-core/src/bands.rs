//! Frequency band identities and the Hz -> spectrum bin mapping.

use std::ops::Range;

use crate::config::BandsConfig;

/// One of the three tracked frequency ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    Low,
    Mid,
    High,
}

impl Band {
    pub const ALL: [Band; 3] = [Band::Low, Band::Mid, Band::High];

    pub fn name(self) -> &'static str {
        match self {
            Band::Low => "LOW",
            Band::Mid => "MID",
            Band::High => "HI",
        }
    }

    /// Hz range for this band from the config.
    pub fn hz_range(self, bands: &BandsConfig) -> (f32, f32) {
        match self {
            Band::Low => bands.low,
            Band::Mid => bands.mid,
            Band::High => bands.high,
        }
    }
}

/// Half-open bin range `[start, end)` into a magnitude spectrum.
///
/// Always non-empty and never includes the DC bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinRange {
    pub start: usize,
    pub end: usize,
}

impl BinRange {
    /// Map a Hz range onto spectrum bins for a transform of `frame_size`
    /// samples taken at `sample_rate`.
    pub fn from_hz(sample_rate: u32, frame_size: usize, lo_hz: f32, hi_hz: f32) -> Self {
        let bin_width = sample_rate as f64 / frame_size.max(1) as f64;
        let to_bin = |hz: f32| -> usize {
            let bin = (hz as f64 / bin_width).floor();
            if bin.is_finite() && bin > 0.0 {
                bin as usize
            } else {
                0
            }
        };

        let nyquist = frame_size / 2;
        let start = to_bin(lo_hz).max(1);
        let mut end = to_bin(hi_hz).min(nyquist);
        if start >= end {
            end = start + 1;
        }
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bands_at_44100_1024() {
        let bands = BandsConfig::default();
        let map = |b: Band| {
            let (lo, hi) = b.hz_range(&bands);
            BinRange::from_hz(44100, 1024, lo, hi)
        };
        // bin width ~43.07 Hz
        assert_eq!(map(Band::Low), BinRange { start: 1, end: 5 });
        assert_eq!(map(Band::Mid), BinRange { start: 5, end: 92 });
        assert_eq!(map(Band::High), BinRange { start: 92, end: 464 });
    }

    #[test]
    fn end_clamped_to_nyquist() {
        let r = BinRange::from_hz(8000, 256, 1000.0, 20000.0);
        assert_eq!(r.end, 128);
        assert_eq!(r.start, 32);
    }

    #[test]
    fn narrow_band_still_gets_one_bin() {
        // both edges fall into bin 2
        let r = BinRange::from_hz(44100, 1024, 90.0, 100.0);
        assert_eq!(r, BinRange { start: 2, end: 3 });
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn dc_bin_is_never_included() {
        let r = BinRange::from_hz(44100, 1024, 0.0, 10.0);
        assert_eq!(r, BinRange { start: 1, end: 2 });
    }

    #[test]
    fn ranges_stay_within_bounds() {
        let rates = [8000u32, 22050, 44100, 48000, 96000];
        let sizes = [64usize, 256, 512, 1024, 2048, 4096];
        let edges = [0.0f32, 5.0, 20.0, 99.0, 250.0, 1000.0, 4000.0, 20000.0, 30000.0];

        for &sr in &rates {
            for &n in &sizes {
                for (i, &lo) in edges.iter().enumerate() {
                    for &hi in &edges[i + 1..] {
                        let r = BinRange::from_hz(sr, n, lo, hi);
                        assert!(r.start >= 1, "{sr} {n} {lo} {hi}: {r:?}");
                        assert!(r.start < r.end, "{sr} {n} {lo} {hi}: {r:?}");
                        // Only a band lying entirely above Nyquist is pushed past N/2
                        if (lo as f64) < sr as f64 / 2.0 - sr as f64 / n as f64 {
                            assert!(r.end <= n / 2, "{sr} {n} {lo} {hi}: {r:?}");
                        }
                    }
                }
            }
        }
    }
}
