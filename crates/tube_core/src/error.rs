use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by the playback controller and the browser session.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("no URL entered")]
    EmptyUrl,
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("no browser session is open")]
    NoSession,
    #[error("browser could not be started: {0}")]
    Launch(String),
    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("script failed: {0}")]
    Script(String),
    #[error("frame capture failed: {0}")]
    Capture(String),
}

/// Failures surfaced by the frame classifier.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height}x3")]
    FrameShape {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },
    #[error("weights download from {url} failed: {message}")]
    Download { url: String, message: String },
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model error: {0}")]
    Model(#[from] candle_core::Error),
}

/// Failures while reading or writing `config.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot serialise config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
