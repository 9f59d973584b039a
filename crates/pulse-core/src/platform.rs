use std::path::PathBuf;

/// UDP port WiZ-style bulbs listen on for `getPilot` / `setPilot`.
pub const BULB_PORT: u16 = 38899;

const APP_DIR: &str = "wizpulse";

/// `~/<xdg>/wizpulse` on unix, macOS included; the platform's own
/// directory elsewhere. Falls back to the temp dir without a home.
fn app_dir(xdg: &str, platform_dir: Option<PathBuf>) -> PathBuf {
    let base = if cfg!(unix) {
        dirs::home_dir().map(|home| home.join(xdg))
    } else {
        platform_dir
    };
    base.unwrap_or_else(std::env::temp_dir).join(APP_DIR)
}

/// Holds the log file.
pub fn data_dir() -> PathBuf {
    app_dir(".local/share", dirs::data_local_dir())
}

/// Holds `config.toml`.
pub fn config_dir() -> PathBuf {
    app_dir(".config", dirs::config_dir())
}

pub fn log_path() -> PathBuf {
    data_dir().join("wizpulse.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_end_in_app_dir() {
        assert!(data_dir().ends_with(APP_DIR));
        assert!(config_dir().ends_with(APP_DIR));
        assert!(log_path().ends_with("wizpulse/wizpulse.log"));
    }

    #[cfg(unix)]
    #[test]
    fn unix_uses_xdg_layout_under_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(data_dir(), home.join(".local/share/wizpulse"));
            assert_eq!(config_dir(), home.join(".config/wizpulse"));
        }
    }
}
