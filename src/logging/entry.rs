//! Log entry types
//!
//! Core types for representing link events for the presentation layer.

use serde::{Deserialize, Serialize};

/// Severity of a system message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Direction of protocol frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    In,  // Controller -> Host (notification)
    Out, // Host -> Controller (write)
}

/// Type of log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogKind {
    /// Command or status frame
    Protocol {
        direction: Direction,
        /// Function code name of the parameter section
        function: String,
        size: usize,
    },
    /// Lifecycle and error messages from the link itself
    System { level: LogLevel, message: String },
}

/// Log entry from link operations (serializable for export)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String, // HH:MM:SS.mmm
    pub kind: LogKind,
}

impl LogEntry {
    /// Current timestamp as HH:MM:SS.mmm
    #[inline]
    fn now() -> String {
        chrono::Local::now().format("%H:%M:%S%.3f").to_string()
    }

    /// Create an informational system entry
    pub fn system(message: impl Into<String>) -> Self {
        Self::system_with_level(LogLevel::Info, message)
    }

    /// Create a warning system entry
    pub fn warn(message: impl Into<String>) -> Self {
        Self::system_with_level(LogLevel::Warn, message)
    }

    /// Create an error system entry
    pub fn error(message: impl Into<String>) -> Self {
        Self::system_with_level(LogLevel::Error, message)
    }

    pub fn system_with_level(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Self::now(),
            kind: LogKind::System {
                level,
                message: message.into(),
            },
        }
    }

    /// Create a protocol entry for an inbound frame
    pub fn protocol_in(function: impl Into<String>, size: usize) -> Self {
        Self {
            timestamp: Self::now(),
            kind: LogKind::Protocol {
                direction: Direction::In,
                function: function.into(),
                size,
            },
        }
    }

    /// Create a protocol entry for an outbound frame
    pub fn protocol_out(function: impl Into<String>, size: usize) -> Self {
        Self {
            timestamp: Self::now(),
            kind: LogKind::Protocol {
                direction: Direction::Out,
                function: function.into(),
                size,
            },
        }
    }

    /// One-line text rendering
    pub fn format_line(&self) -> String {
        match &self.kind {
            LogKind::Protocol {
                direction,
                function,
                size,
            } => {
                let arrow = match direction {
                    Direction::In => "<<",
                    Direction::Out => ">>",
                };
                format!("{} {} {} ({} B)", self.timestamp, arrow, function, size)
            }
            LogKind::System { level, message } => {
                format!("{} [{:?}] {}", self.timestamp, level, message)
            }
        }
    }
}
