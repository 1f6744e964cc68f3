//! Link-layer engine for a two-motor controller over a notify/write channel
//!
//! - `codec`: command and status frame layout
//! - `link`: cycle engine, command assembler, status demultiplexer, telemetry
//! - `transport`: what the link needs from the radio, plus a loopback
//!
//! ```ignore
//! let (handle, mut logs) = motor_link::link::start(Config::default(), transport);
//! handle.link().set_command_field(MotorId::Motor1, CommandField::TargetPosition, 5000)?;
//! let mut telemetry = handle.link().subscribe();
//! ```

pub mod cli;
pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod link;
pub mod logging;
pub mod motor;
pub mod transport;

pub use error::{LinkError, Result};
pub use link::{MotorLink, TelemetrySnapshot};
pub use motor::{CommandField, MotorCommand, MotorId, MotorStatus};
