use anyhow::Context;
use clap::Parser;
use pulse_core::config::Config;
use std::path::PathBuf;

/// Three-band audio bars in the terminal, with bass-reactive smart bulbs.
#[derive(Parser, Debug, Default)]
#[command(name = "wizpulse", version, about)]
pub struct Args {
    /// Config file (defaults to ~/.config/wizpulse/config.toml when present)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Capture from the first input device whose name contains this text
    #[arg(long, value_name = "NAME")]
    pub device: Option<String>,

    /// Run the bars only, never touch bulbs
    #[arg(long)]
    pub no_lights: bool,

    /// Bulb address (ip or ip:port); repeat for several. Skips discovery.
    #[arg(long = "bulb", value_name = "ADDR")]
    pub bulbs: Vec<String>,

    /// Print the available input devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Do not draw bars
    #[arg(long)]
    pub no_viz: bool,

    /// Log to stderr instead of the log file
    #[arg(long)]
    pub log_stderr: bool,
}

impl Args {
    /// Load the config file and layer the command line on top.
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load(self.config.as_deref()).context("failed to load config")?;
        self.apply(&mut config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(device) = &self.device {
            config.audio.device = Some(device.clone());
        }
        if self.no_lights {
            config.light.enabled = false;
        }
        if !self.bulbs.is_empty() {
            config.light.bulbs = self.bulbs.clone();
        }
    }
}
