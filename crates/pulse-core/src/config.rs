use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::ConfigError;
use super::platform;

/// Every tunable of the pipeline and the light controller. Read once at
/// startup and handed to each component by value; nothing mutates it later.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub bands: BandsConfig,
    #[serde(default)]
    pub envelope: EnvelopeConfig,
    #[serde(default)]
    pub light: LightConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    /// Case-insensitive substring of the input device name.
    /// `None` picks the host's default input device.
    #[serde(default)]
    pub device: Option<String>,
}

/// Hz ranges as `[low, high]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandsConfig {
    #[serde(default = "default_low_band")]
    pub low: (f32, f32),
    #[serde(default = "default_mid_band")]
    pub mid: (f32, f32),
    #[serde(default = "default_high_band")]
    pub high: (f32, f32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeConfig {
    /// Exponent of the perceptual curve applied to the normalized energy.
    #[serde(default = "default_contrast")]
    pub contrast: f32,
    #[serde(default = "default_attack")]
    pub attack: f32,
    #[serde(default = "default_release")]
    pub release: f32,
    /// Absolute mean-magnitude floor below which a frame counts as silence.
    #[serde(default = "default_noise_gate")]
    pub noise_gate: f32,
    /// Auto-gain reference used until the history holds more than 10 samples.
    #[serde(default = "default_warmup_reference")]
    pub warmup_reference: f32,
    /// Ring buffer capacity for the auto-gain history.
    #[serde(default = "default_history_len")]
    pub history_len: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bulb_port")]
    pub port: u16,
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: String,
    /// Static bulb addresses (`ip` or `ip:port`). Non-empty skips discovery.
    #[serde(default)]
    pub bulbs: Vec<String>,
    #[serde(default = "default_dimming_cutoff")]
    pub dimming_cutoff: f32,
    #[serde(default = "default_dimming_max")]
    pub dimming_max: f32,
    #[serde(default = "default_beat_trigger")]
    pub beat_trigger: f32,
    #[serde(default = "default_beat_cooldown_ms")]
    pub beat_cooldown_ms: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_min_send_interval_ms")]
    pub min_send_interval_ms: u64,
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            frame_size: default_frame_size(),
            device: None,
        }
    }
}

impl Default for BandsConfig {
    fn default() -> Self {
        Self {
            low: default_low_band(),
            mid: default_mid_band(),
            high: default_high_band(),
        }
    }
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            contrast: default_contrast(),
            attack: default_attack(),
            release: default_release(),
            noise_gate: default_noise_gate(),
            warmup_reference: default_warmup_reference(),
            history_len: default_history_len(),
        }
    }
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_bulb_port(),
            broadcast_address: default_broadcast_address(),
            bulbs: Vec::new(),
            dimming_cutoff: default_dimming_cutoff(),
            dimming_max: default_dimming_max(),
            beat_trigger: default_beat_trigger(),
            beat_cooldown_ms: default_beat_cooldown_ms(),
            tick_ms: default_tick_ms(),
            min_send_interval_ms: default_min_send_interval_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            discovery_timeout_ms: default_discovery_timeout_ms(),
            query_timeout_ms: default_query_timeout_ms(),
            join_timeout_ms: default_join_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_frame_size() -> usize {
    1024
}

fn default_low_band() -> (f32, f32) {
    (20.0, 250.0)
}

fn default_mid_band() -> (f32, f32) {
    (250.0, 4000.0)
}

fn default_high_band() -> (f32, f32) {
    (4000.0, 20000.0)
}

fn default_contrast() -> f32 {
    2.5
}

fn default_attack() -> f32 {
    0.85
}

fn default_release() -> f32 {
    0.15
}

fn default_noise_gate() -> f32 {
    0.005
}

fn default_warmup_reference() -> f32 {
    0.5
}

fn default_history_len() -> usize {
    200
}

fn default_bulb_port() -> u16 {
    platform::BULB_PORT
}

fn default_broadcast_address() -> String {
    "255.255.255.255".to_string()
}

fn default_dimming_cutoff() -> f32 {
    15.0
}

fn default_dimming_max() -> f32 {
    85.0
}

fn default_beat_trigger() -> f32 {
    80.0
}

fn default_beat_cooldown_ms() -> u64 {
    250
}

fn default_tick_ms() -> u64 {
    5
}

fn default_min_send_interval_ms() -> u64 {
    40
}

fn default_send_timeout_ms() -> u64 {
    5
}

fn default_discovery_timeout_ms() -> u64 {
    2000
}

fn default_query_timeout_ms() -> u64 {
    500
}

fn default_join_timeout_ms() -> u64 {
    500
}

fn default_settle_delay_ms() -> u64 {
    300
}

impl LightConfig {
    pub fn beat_cooldown(&self) -> Duration {
        Duration::from_millis(self.beat_cooldown_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn min_send_interval(&self) -> Duration {
        Duration::from_millis(self.min_send_interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Parse `bulbs` into socket addresses; bare IPs get the bulb port.
    pub fn static_bulbs(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        self.bulbs
            .iter()
            .map(|raw| {
                let raw = raw.trim();
                if let Ok(addr) = raw.parse::<SocketAddr>() {
                    return Ok(addr);
                }
                raw.parse::<IpAddr>()
                    .map(|ip| SocketAddr::new(ip, self.port))
                    .map_err(|_| ConfigError::Invalid(format!("bad bulb address '{}'", raw)))
            })
            .collect()
    }

    pub fn broadcast_target(&self) -> Result<SocketAddr, ConfigError> {
        self.broadcast_address
            .parse::<IpAddr>()
            .map(|ip| SocketAddr::new(ip, self.port))
            .map_err(|_| {
                ConfigError::Invalid(format!(
                    "bad broadcast address '{}'",
                    self.broadcast_address
                ))
            })
    }
}

impl Config {
    /// Load from an explicit path (must exist), or from the default location
    /// if a file is there, or fall back to defaults. Never writes anything.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.audio.sample_rate == 0 {
            return invalid("audio.sample_rate must be positive");
        }
        if self.audio.frame_size < 2 {
            return invalid("audio.frame_size must be at least 2");
        }
        for (name, (lo, hi)) in [
            ("low", self.bands.low),
            ("mid", self.bands.mid),
            ("high", self.bands.high),
        ] {
            if !(lo >= 0.0 && lo < hi) {
                return Err(ConfigError::Invalid(format!(
                    "bands.{} must satisfy 0 <= low < high, got [{}, {}]",
                    name, lo, hi
                )));
            }
        }

        let env = &self.envelope;
        if !(env.attack > 0.0 && env.attack <= 1.0) {
            return invalid("envelope.attack must be in (0, 1]");
        }
        if !(env.release > 0.0 && env.release <= 1.0) {
            return invalid("envelope.release must be in (0, 1]");
        }
        if !(env.contrast > 0.0) {
            return invalid("envelope.contrast must be positive");
        }
        if !(env.noise_gate >= 0.0) {
            return invalid("envelope.noise_gate must not be negative");
        }
        if env.history_len <= 10 {
            return invalid("envelope.history_len must be greater than 10");
        }

        let light = &self.light;
        if !(light.dimming_cutoff < light.dimming_max) {
            return invalid("light.dimming_cutoff must be below light.dimming_max");
        }
        if light.tick_ms == 0 {
            return invalid("light.tick_ms must be positive");
        }
        light.static_bulbs()?;
        light.broadcast_target()?;
        Ok(())
    }
}
