//! Configuration management
//!
//! Link timings, protocol limits and per-motor command defaults.
//! Stored as TOML; every section and field is optional.

use crate::constants::{
    CHANNEL_CAPACITY, CYCLE_PERIOD_MS, DEFAULT_FRAME_SIZE, FRAME_SIZE_WARN_EVERY,
    PUBLISH_INTERVAL_MS, QUEUE_CAPACITY, REPLY_TIMEOUT_MS, TARGET_FRAME_SIZE, TRANSPORT_OVERHEAD,
    WRITE_ACK_TIMEOUT_MS,
};
use crate::error::{LinkError, Result};
use crate::motor::{MotorCommand, MotorId};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

// =============================================================================
// Application Configuration
// =============================================================================

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub link: LinkConfig,
    /// Command values restored on every new connection
    #[serde(deserialize_with = "motor1_section")]
    pub motor1: MotorCommand,
    #[serde(deserialize_with = "motor2_section")]
    pub motor2: MotorCommand,
    pub logs: LogsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            motor1: MotorCommand::defaults_for(MotorId::Motor1),
            motor2: MotorCommand::defaults_for(MotorId::Motor2),
            logs: LogsConfig::default(),
        }
    }
}

impl Config {
    /// Command defaults indexed by `MotorId::index`
    pub fn motor_defaults(&self) -> [MotorCommand; 2] {
        [self.motor1, self.motor2]
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        self.link.validate()
    }
}

// A `[motorN]` table only overrides the fields it names. The rest come from
// that motor's own defaults, not from `MotorCommand::default()`.
fn motor_section<'de, D>(
    deserializer: D,
    motor: MotorId,
) -> std::result::Result<MotorCommand, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = toml::Table::deserialize(deserializer)?;
    let mut merged = match toml::Value::try_from(MotorCommand::defaults_for(motor)) {
        Ok(toml::Value::Table(table)) => table,
        Ok(_) => return Err(D::Error::custom("motor defaults are not a table")),
        Err(e) => return Err(D::Error::custom(e)),
    };
    merged.extend(overrides);
    toml::Value::Table(merged)
        .try_into()
        .map_err(D::Error::custom)
}

fn motor1_section<'de, D>(deserializer: D) -> std::result::Result<MotorCommand, D::Error>
where
    D: Deserializer<'de>,
{
    motor_section(deserializer, MotorId::Motor1)
}

fn motor2_section<'de, D>(deserializer: D) -> std::result::Result<MotorCommand, D::Error>
where
    D: Deserializer<'de>,
{
    motor_section(deserializer, MotorId::Motor2)
}

// =============================================================================
// Link Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Cycle period, start to start
    pub cycle_period_ms: u64,
    /// Wait for a write acknowledgement (acknowledged transports only)
    pub write_ack_timeout_ms: u64,
    /// Wait for the reply notification after a write
    pub reply_timeout_ms: u64,
    /// Minimum interval between telemetry publications
    pub publish_interval_ms: u64,
    /// Bytes of each transport frame not available to the payload
    pub transport_overhead: usize,
    /// Parameter request queue capacity
    pub queue_capacity: usize,
    /// Frame size assumed until the transport negotiates one
    pub default_frame_size: usize,
    /// Frame size below which the engine warns
    pub target_frame_size: usize,
    /// Warn about a small frame size every N cycles
    pub frame_size_warn_every: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            cycle_period_ms: CYCLE_PERIOD_MS,
            write_ack_timeout_ms: WRITE_ACK_TIMEOUT_MS,
            reply_timeout_ms: REPLY_TIMEOUT_MS,
            publish_interval_ms: PUBLISH_INTERVAL_MS,
            transport_overhead: TRANSPORT_OVERHEAD,
            queue_capacity: QUEUE_CAPACITY,
            default_frame_size: DEFAULT_FRAME_SIZE,
            target_frame_size: TARGET_FRAME_SIZE,
            frame_size_warn_every: FRAME_SIZE_WARN_EVERY,
        }
    }
}

impl LinkConfig {
    pub fn cycle_period(&self) -> Duration {
        Duration::from_millis(self.cycle_period_ms)
    }

    pub fn write_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.write_ack_timeout_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cycle_period_ms == 0 {
            return Err(LinkError::ConfigValidation {
                field: "cycle_period_ms",
                reason: "must be greater than 0".into(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(LinkError::ConfigValidation {
                field: "queue_capacity",
                reason: "must be greater than 0".into(),
            });
        }
        if self.transport_overhead >= self.default_frame_size {
            return Err(LinkError::ConfigValidation {
                field: "transport_overhead",
                reason: format!(
                    "{} leaves no payload in a {}-byte frame",
                    self.transport_overhead, self.default_frame_size
                ),
            });
        }
        if self.reply_timeout_ms > self.cycle_period_ms {
            warn!(
                "reply_timeout_ms ({}) exceeds cycle_period_ms ({}), cycles will run late",
                self.reply_timeout_ms, self.cycle_period_ms
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Capacity of the `LogEntry` channel handed to the presentation layer
    pub channel_capacity: usize,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Parse and validate a TOML document
pub fn from_toml(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).map_err(|e| LinkError::ConfigValidation {
        field: "config",
        reason: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Load config from file
pub fn load(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|e| LinkError::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    from_toml(&content)
}

/// Load config from file if given, falling back to defaults on any error
pub fn load_or_default(path: Option<&Path>) -> Config {
    let Some(path) = path else {
        return Config::default();
    };
    match load(path) {
        Ok(config) => config,
        Err(e) => {
            warn!("{}, using defaults", e);
            Config::default()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
