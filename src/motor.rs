//! Per-motor command and status state
//!
//! The controller drives two motors. Each has a block of command fields
//! (written by the host every cycle) and a block of status fields
//! (reported back by the firmware).

use crate::constants::{
    MOTOR1_COMMAND_BASE, MOTOR1_STATUS_BASE, MOTOR2_COMMAND_BASE, MOTOR2_STATUS_BASE,
};
use serde::{Deserialize, Serialize};

/// Motor selector (device id on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotorId {
    Motor1,
    Motor2,
}

impl MotorId {
    pub const ALL: [MotorId; 2] = [MotorId::Motor1, MotorId::Motor2];

    /// Device id carried in the frame header
    pub fn device_id(self) -> u8 {
        match self {
            Self::Motor1 => 0,
            Self::Motor2 => 1,
        }
    }

    pub fn from_device_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Motor1),
            1 => Some(Self::Motor2),
            _ => None,
        }
    }

    /// Array index for per-motor state
    pub fn index(self) -> usize {
        self.device_id() as usize
    }

    /// First PDO slot of this motor's command block
    pub fn command_base(self) -> usize {
        match self {
            Self::Motor1 => MOTOR1_COMMAND_BASE,
            Self::Motor2 => MOTOR2_COMMAND_BASE,
        }
    }

    /// First PDO slot of this motor's status block
    pub fn status_base(self) -> usize {
        match self {
            Self::Motor1 => MOTOR1_STATUS_BASE,
            Self::Motor2 => MOTOR2_STATUS_BASE,
        }
    }
}

impl std::fmt::Display for MotorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Motor1 => write!(f, "motor1"),
            Self::Motor2 => write!(f, "motor2"),
        }
    }
}

impl std::str::FromStr for MotorId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "motor1" | "1" => Ok(Self::Motor1),
            "motor2" | "2" => Ok(Self::Motor2),
            other => Err(format!("unknown motor '{}' (expected motor1 or motor2)", other)),
        }
    }
}

/// One scalar of a motor's command block, in slot order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandField {
    TargetPosition,
    TargetVelocity,
    ProfileAccTime,
    HomingLevel,
    HomingDir,
    CurrentBase,
    CurrentP,
    CurrentN,
    FastStopDec,
}

impl CommandField {
    pub const ALL: [CommandField; 9] = [
        CommandField::TargetPosition,
        CommandField::TargetVelocity,
        CommandField::ProfileAccTime,
        CommandField::HomingLevel,
        CommandField::HomingDir,
        CommandField::CurrentBase,
        CommandField::CurrentP,
        CommandField::CurrentN,
        CommandField::FastStopDec,
    ];

    /// Slot offset from the motor's command base
    pub fn offset(self) -> usize {
        self as usize
    }

    /// Absolute PDO slot for `motor`
    pub fn slot(self, motor: MotorId) -> usize {
        motor.command_base() + self.offset()
    }
}

/// Command block of one motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorCommand {
    pub target_position: i32,
    pub target_velocity: i32,
    pub profile_acc_time: i32,
    pub homing_level: i32,
    pub homing_dir: i32,
    pub current_base: i32,
    pub current_p: i32,
    pub current_n: i32,
    pub fast_stop_dec: i32,
}

impl MotorCommand {
    /// Power-on defaults of the controller for `motor`
    pub fn defaults_for(motor: MotorId) -> Self {
        let current_base = match motor {
            MotorId::Motor1 => 1200,
            MotorId::Motor2 => 800,
        };
        Self {
            current_base,
            ..Self::default()
        }
    }

    pub fn get(&self, field: CommandField) -> i32 {
        match field {
            CommandField::TargetPosition => self.target_position,
            CommandField::TargetVelocity => self.target_velocity,
            CommandField::ProfileAccTime => self.profile_acc_time,
            CommandField::HomingLevel => self.homing_level,
            CommandField::HomingDir => self.homing_dir,
            CommandField::CurrentBase => self.current_base,
            CommandField::CurrentP => self.current_p,
            CommandField::CurrentN => self.current_n,
            CommandField::FastStopDec => self.fast_stop_dec,
        }
    }

    pub fn set(&mut self, field: CommandField, value: i32) {
        let slot = match field {
            CommandField::TargetPosition => &mut self.target_position,
            CommandField::TargetVelocity => &mut self.target_velocity,
            CommandField::ProfileAccTime => &mut self.profile_acc_time,
            CommandField::HomingLevel => &mut self.homing_level,
            CommandField::HomingDir => &mut self.homing_dir,
            CommandField::CurrentBase => &mut self.current_base,
            CommandField::CurrentP => &mut self.current_p,
            CommandField::CurrentN => &mut self.current_n,
            CommandField::FastStopDec => &mut self.fast_stop_dec,
        };
        *slot = value;
    }
}

impl Default for MotorCommand {
    fn default() -> Self {
        Self {
            target_position: 0,
            target_velocity: 1000,
            profile_acc_time: 200,
            homing_level: 1,
            homing_dir: 1,
            current_base: 1200,
            current_p: 3,
            current_n: 3,
            fast_stop_dec: 30,
        }
    }
}

/// Status block of one motor (last known values)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorStatus {
    /// Status bitfield
    pub status_word: i32,
    pub actual_position: i32,
    pub actual_velocity: i32,
}

/// Status fields decoded from one frame; `None` = not carried by the frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotorStatusUpdate {
    pub status_word: Option<i32>,
    pub actual_position: Option<i32>,
    pub actual_velocity: Option<i32>,
}

impl MotorStatus {
    /// Overwrite only the fields present in `update`
    pub fn apply(&mut self, update: &MotorStatusUpdate) {
        if let Some(v) = update.status_word {
            self.status_word = v;
        }
        if let Some(v) = update.actual_position {
            self.actual_position = v;
        }
        if let Some(v) = update.actual_velocity {
            self.actual_velocity = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_slots_alias_on_6_to_8() {
        assert_eq!(CommandField::CurrentP.slot(MotorId::Motor1), 6);
        assert_eq!(CommandField::TargetPosition.slot(MotorId::Motor2), 6);
        assert_eq!(CommandField::FastStopDec.slot(MotorId::Motor1), 8);
        assert_eq!(CommandField::ProfileAccTime.slot(MotorId::Motor2), 8);
        assert_eq!(CommandField::FastStopDec.slot(MotorId::Motor2), 14);
        assert_eq!(
            CommandField::FastStopDec.slot(MotorId::Motor2) + 1,
            crate::constants::COMMAND_SLOTS
        );
    }

    #[test]
    fn test_defaults_differ_in_current_base() {
        assert_eq!(MotorCommand::defaults_for(MotorId::Motor1).current_base, 1200);
        assert_eq!(MotorCommand::defaults_for(MotorId::Motor2).current_base, 800);
        assert_eq!(MotorCommand::defaults_for(MotorId::Motor2).target_velocity, 1000);
    }

    #[test]
    fn test_get_set_every_field() {
        let mut cmd = MotorCommand::default();
        for (i, field) in CommandField::ALL.iter().enumerate() {
            cmd.set(*field, 100 + i as i32);
        }
        for (i, field) in CommandField::ALL.iter().enumerate() {
            assert_eq!(cmd.get(*field), 100 + i as i32);
        }
    }

    #[test]
    fn test_status_apply_keeps_absent_fields() {
        let mut status = MotorStatus {
            status_word: 7,
            actual_position: 42,
            actual_velocity: -3,
        };
        status.apply(&MotorStatusUpdate {
            status_word: Some(8),
            actual_position: None,
            actual_velocity: None,
        });
        assert_eq!(status.status_word, 8);
        assert_eq!(status.actual_position, 42);
        assert_eq!(status.actual_velocity, -3);
    }

    #[test]
    fn test_device_id_roundtrip() {
        for motor in MotorId::ALL {
            assert_eq!(MotorId::from_device_id(motor.device_id()), Some(motor));
        }
        assert_eq!(MotorId::from_device_id(2), None);
    }
}
