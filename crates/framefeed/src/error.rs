//! Error types for framefeed.
//!
//! Failures of an individual frame fetch are not errors at this level: they
//! are carried as [`crate::frame::FetchFailure`] values and absorbed by the
//! session. The types here cover setup, configuration and CLI concerns.

use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionState;

/// The main error type for framefeed operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// No bearer token was configured for the snapshot endpoint.
    #[error("no API token configured (set camera.token or FRAMEFEED_CAMERA__TOKEN)")]
    MissingToken,

    /// A configured URL could not be parsed.
    #[error("invalid URL '{url}': {message}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Description of what went wrong.
        message: String,
    },

    // === Transport Errors ===
    /// The HTTP client could not be built or a request could not be made.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend reported itself unhealthy.
    #[error("backend unhealthy: {0}")]
    Unhealthy(String),

    // === Session Errors ===
    /// A lifecycle transition was requested from the wrong state.
    #[error("cannot {operation} a session in state {state}")]
    SessionState {
        /// The requested transition.
        operation: &'static str,
        /// The state the session was in.
        state: SessionState,
    },

    // === I/O Errors ===
    /// Failed to write a frame to disk.
    #[error("failed to write frame to {path}: {source}")]
    FrameWrite {
        /// Destination path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for framefeed operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new configuration validation error.
    #[must_use]
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create a new invalid URL error.
    #[must_use]
    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is a configuration problem the user can fix.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad(_)
                | Self::ConfigValidation { .. }
                | Self::MissingToken
                | Self::InvalidUrl { .. }
        )
    }

    /// Check if this error is a lifecycle misuse.
    #[must_use]
    pub fn is_session_state_error(&self) -> bool {
        matches!(self, Self::SessionState { .. })
    }
}
