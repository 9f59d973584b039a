//! Bass level -> bulb target state machine.
//!
//! Runs on the processing thread, once per audio frame. Every update
//! publishes the complete [`BulbTarget`] through a `watch` channel so the
//! transmit loop only ever sees whole snapshots.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use tokio::sync::watch;

use super::color::Rgb;
use crate::config::LightConfig;

/// Lowest dimming produced by the interior of the bass -> dimming map.
const INTERIOR_DIMMING_FLOOR: f32 = 10.0;

/// What the bulbs should show right now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulbTarget {
    pub color: Rgb,
    /// 0..=100, 0 meaning blackout intent.
    pub dimming: u8,
    pub last_beat: Option<Instant>,
}

impl Default for BulbTarget {
    fn default() -> Self {
        Self {
            color: Rgb::WHITE,
            dimming: 0,
            last_beat: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Thresholds {
    cutoff: f32,
    max: f32,
    beat_trigger: f32,
    beat_cooldown: Duration,
}

pub struct LightStateController<R: Rng = StdRng> {
    thresholds: Thresholds,
    target: BulbTarget,
    publisher: watch::Sender<BulbTarget>,
    rng: R,
}

impl LightStateController<StdRng> {
    pub fn new(config: &LightConfig, publisher: watch::Sender<BulbTarget>) -> Self {
        Self::with_rng(config, publisher, StdRng::from_entropy())
    }
}

impl<R: Rng> LightStateController<R> {
    pub fn with_rng(config: &LightConfig, publisher: watch::Sender<BulbTarget>, rng: R) -> Self {
        let target = *publisher.borrow();
        Self {
            thresholds: Thresholds {
                cutoff: config.dimming_cutoff,
                max: config.dimming_max,
                beat_trigger: config.beat_trigger,
                beat_cooldown: config.beat_cooldown(),
            },
            target,
            publisher,
            rng,
        }
    }

    pub fn target(&self) -> BulbTarget {
        self.target
    }

    /// Feed one bass level (0..=100). Returns `true` when a beat picked a
    /// new color.
    pub fn update(&mut self, bass: f32, now: Instant) -> bool {
        let bass = if bass.is_finite() { bass } else { 0.0 };
        let t = self.thresholds;

        self.target.dimming = dimming_for(bass, t.cutoff, t.max);

        let cooled_down = self
            .target
            .last_beat
            .map_or(true, |last| now.saturating_duration_since(last) > t.beat_cooldown);
        let beat = bass > t.beat_trigger && cooled_down;
        if beat {
            self.target.color = Rgb::random_vivid(&mut self.rng);
            self.target.last_beat = Some(now);
        }

        self.publisher.send_replace(self.target);
        beat
    }
}

/// Piecewise bass -> dimming map: below `cutoff` is blackout, above `max` is
/// full, and the interior runs linearly from 10 to 100.
pub fn dimming_for(bass: f32, cutoff: f32, max: f32) -> u8 {
    if bass < cutoff {
        return 0;
    }
    if bass > max {
        return 100;
    }
    let span = (max - cutoff).max(f32::EPSILON);
    let level = INTERIOR_DIMMING_FLOOR + (100.0 - INTERIOR_DIMMING_FLOOR) * (bass - cutoff) / span;
    level.round().clamp(INTERIOR_DIMMING_FLOOR, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> (LightStateController, watch::Receiver<BulbTarget>) {
        let (tx, rx) = watch::channel(BulbTarget::default());
        let ctl = LightStateController::with_rng(
            &LightConfig::default(),
            tx,
            StdRng::seed_from_u64(42),
        );
        (ctl, rx)
    }

    #[test]
    fn dimming_boundaries() {
        let cfg = LightConfig::default();
        let (cutoff, max) = (cfg.dimming_cutoff, cfg.dimming_max);
        assert_eq!(dimming_for(cutoff - 1.0, cutoff, max), 0);
        assert_eq!(dimming_for(max + 1.0, cutoff, max), 100);
        assert_eq!(dimming_for((cutoff + max) / 2.0, cutoff, max), 55);
        assert_eq!(dimming_for(cutoff, cutoff, max), 10);
        assert_eq!(dimming_for(max, cutoff, max), 100);
        assert_eq!(dimming_for(0.0, cutoff, max), 0);
    }

    #[test]
    fn interior_never_reads_as_off() {
        let cfg = LightConfig::default();
        let mut bass = cfg.dimming_cutoff;
        while bass <= cfg.dimming_max {
            let d = dimming_for(bass, cfg.dimming_cutoff, cfg.dimming_max);
            assert!((10..=100).contains(&d));
            bass += 0.25;
        }
    }

    #[test]
    fn beats_within_cooldown_change_color_once() {
        let (mut ctl, _rx) = controller();
        let start = Instant::now();
        let cooldown = LightConfig::default().beat_cooldown();

        assert!(ctl.update(95.0, start));
        let color = ctl.target().color;
        assert!(!ctl.update(95.0, start + cooldown / 2));
        assert_eq!(ctl.target().color, color);
        assert_eq!(ctl.target().last_beat, Some(start));
    }

    #[test]
    fn beats_past_cooldown_change_color_twice() {
        let (mut ctl, _rx) = controller();
        let start = Instant::now();
        let later = start + LightConfig::default().beat_cooldown() + Duration::from_millis(1);

        assert!(ctl.update(95.0, start));
        assert!(ctl.update(95.0, later));
        assert_eq!(ctl.target().last_beat, Some(later));
    }

    #[test]
    fn below_trigger_never_beats() {
        let (mut ctl, _rx) = controller();
        let start = Instant::now();
        for i in 0..100u64 {
            assert!(!ctl.update(80.0, start + Duration::from_secs(i)));
        }
        assert_eq!(ctl.target().color, Rgb::WHITE);
        assert_eq!(ctl.target().last_beat, None);
    }

    #[test]
    fn every_update_publishes_a_whole_snapshot() {
        let (mut ctl, rx) = controller();
        let now = Instant::now();

        ctl.update(10.0, now);
        assert_eq!(rx.borrow().dimming, 0);

        ctl.update(99.0, now);
        let seen = *rx.borrow();
        assert_eq!(seen, ctl.target());
        assert_eq!(seen.dimming, 100);
        assert_eq!(seen.last_beat, Some(now));
        assert_ne!(seen.color, Rgb::WHITE);
    }

    #[test]
    fn nan_bass_is_blackout() {
        let (mut ctl, rx) = controller();
        assert!(!ctl.update(f32::NAN, Instant::now()));
        assert_eq!(rx.borrow().dimming, 0);
    }
}
