//! Error type for the bridge.
//!
//! Wraps the errors of every layer the pipeline touches so that setup code
//! can use `?` throughout. Per-track failures never surface here; the
//! pipeline turns them into an [`Outcome`](crate::pipeline::Outcome).

use std::path::PathBuf;

/// Errors raised while configuring or running the bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An encoder link error.
    #[error(transparent)]
    Link(#[from] rdslink_core::Error),

    /// A text-processing setup error (bad placeholder, unreadable denylist).
    #[error(transparent)]
    Text(#[from] rdslink_text::TextError),

    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        /// The file that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file was not valid TOML for the config schema.
    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        /// The file that failed.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// The message broker failed.
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// A payload could not be encoded or decoded as JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An HTTP request (webhook) failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A notification sink answered with a non-success status.
    #[error("{sink} returned HTTP {status}")]
    SinkStatus {
        /// The sink that failed.
        sink: &'static str,
        /// The HTTP status code.
        status: u16,
    },
}

/// A convenience `Result` alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_errors_display_transparently() {
        let e: Error = rdslink_core::Error::ConnectionLost.into();
        assert_eq!(e.to_string(), "connection lost");
    }

    #[test]
    fn config_error_display() {
        let e = Error::Config("encoder.port must be non-zero".into());
        assert_eq!(
            e.to_string(),
            "invalid configuration: encoder.port must be non-zero"
        );
    }

    #[test]
    fn sink_status_display() {
        let e = Error::SinkStatus {
            sink: "discord",
            status: 500,
        };
        assert_eq!(e.to_string(), "discord returned HTTP 500");
    }
}
