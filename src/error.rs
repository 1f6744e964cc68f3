//! Centralized error types for the motor link
//!
//! All link errors are represented by the `LinkError` enum.
//! Use `Result<T>` as shorthand for `std::result::Result<T, LinkError>`.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// All link errors
#[derive(Debug)]
pub enum LinkError {
    // === Codec ===
    /// Frame cannot be encoded or decoded at all (programming error)
    MalformedFrame { reason: String },
    /// Inbound frame shorter than header + parameter value
    FrameTooShort { len: usize, min: usize },

    // === Cycle ===
    /// No write acknowledgement within the timeout
    SendTimeout { timeout: Duration },
    /// Transport refused or failed the write
    SendFailed { reason: String },
    /// No reply notification within the timeout
    ReplyTimeout { timeout: Duration },
    /// Connection dropped, session over
    Disconnected,

    // === Config ===
    /// Config file could not be read
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Invalid config value
    ConfigValidation { field: &'static str, reason: String },
}

impl LinkError {
    /// Whether the session can continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FrameTooShort { .. }
                | Self::SendTimeout { .. }
                | Self::SendFailed { .. }
                | Self::ReplyTimeout { .. }
        )
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigRead { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedFrame { reason } => write!(f, "Malformed frame: {}", reason),
            Self::FrameTooShort { len, min } => {
                write!(f, "Frame too short ({} bytes, need {})", len, min)
            }
            Self::SendTimeout { timeout } => {
                write!(f, "Write Timeout ({} ms)", timeout.as_millis())
            }
            Self::SendFailed { reason } => write!(f, "Write Failed: {}", reason),
            Self::ReplyTimeout { timeout } => {
                write!(f, "Reply Timeout ({} ms)", timeout.as_millis())
            }
            Self::Disconnected => write!(f, "Disconnected"),
            Self::ConfigRead { path, .. } => write!(f, "Cannot read config: {}", path.display()),
            Self::ConfigValidation { field, reason } => {
                write!(f, "Invalid {}: {}", field, reason)
            }
        }
    }
}

/// Alias for Result with LinkError
pub type Result<T> = std::result::Result<T, LinkError>;
