//! Band envelope extraction and bass-reactive bulb control.
//!
//! Audio frames go through [`pipeline::BandPipeline`] (window, FFT, three
//! [`envelope::BandEnvelope`]s); the LOW level feeds
//! [`light::LightStateController`], whose target is flushed to the bulbs by
//! the [`light::Transmitter`] task.

pub mod bands;
pub mod config;
pub mod envelope;
pub mod error;
pub mod light;
pub mod pipeline;
pub mod platform;
pub mod spectrum;
