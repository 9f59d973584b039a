//! Error types for configuration loading and bulb communication.
use thiserror::Error;

/// Errors talking to a single bulb. None of these abort a run; callers log
/// them and move on to the next bulb.
#[derive(Error, Debug)]
pub enum LightError {
    /// Socket bind / send / receive failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Reply was not valid JSON for the expected shape
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No reply within the allotted time
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Bulb answered with an `error` object
    #[error("bulb error {code}: {message}")]
    Bulb { code: i64, message: String },

    /// Bulb answered without a `result` object
    #[error("reply carried no result")]
    NoReply,

    /// Bad bulb or broadcast address in the config
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for light operations
pub type Result<T> = std::result::Result<T, LightError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
