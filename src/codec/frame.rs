//! Command frame encoding and status frame decoding
//!
//! Pure functions over byte slices. Truncation to the negotiated frame
//! size is the caller's job: `encode_command_frame` always produces the
//! full logical layout.

use super::{FunctionCode, ParameterRequest};
use crate::constants::{
    FORCE_SLOT, FRAME_LEN, HEADER_LEN, PARAMETER_VALUE_OFFSET, PDO_OFFSET, PDO_SLOTS, SLOT_SIZE,
};
use crate::error::{LinkError, Result};
use crate::motor::{CommandField, MotorCommand, MotorId, MotorStatusUpdate};
use bytes::Bytes;

/// Byte offset of PDO slot `k`
#[inline]
pub fn slot_offset(k: usize) -> usize {
    PDO_OFFSET + k * SLOT_SIZE
}

/// Write the parameter section (header + value) into `buf`
pub fn write_header(buf: &mut [u8], request: &ParameterRequest) {
    buf[0] = request.function as u8;
    buf[1] = request.index;
    buf[2] = request.device;
    buf[3] = request.sub_index;
    buf[PARAMETER_VALUE_OFFSET..HEADER_LEN].copy_from_slice(&request.value.to_le_bytes());
}

/// Write one PDO slot
///
/// Slots past the protocol table are a programming error.
pub fn write_slot(buf: &mut [u8], k: usize, value: i32) -> Result<()> {
    let start = slot_offset(k);
    if k >= PDO_SLOTS || start + SLOT_SIZE > buf.len() {
        return Err(LinkError::MalformedFrame {
            reason: format!("PDO slot {} outside table of {}", k, PDO_SLOTS),
        });
    }
    buf[start..start + SLOT_SIZE].copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Write both command blocks into the PDO section
///
/// Motor 1 first, then motor 2: slots 6..=8 are shared and end up
/// holding motor 2's target position, velocity and acceleration time.
pub fn write_commands(buf: &mut [u8], motor1: &MotorCommand, motor2: &MotorCommand) -> Result<()> {
    for (motor, cmd) in [(MotorId::Motor1, motor1), (MotorId::Motor2, motor2)] {
        for field in CommandField::ALL {
            write_slot(buf, field.slot(motor), cmd.get(field))?;
        }
    }
    Ok(())
}

/// Encode a full command frame
pub fn encode_command_frame(
    motor1: &MotorCommand,
    motor2: &MotorCommand,
    request: &ParameterRequest,
) -> Result<Bytes> {
    let mut buf = vec![0u8; FRAME_LEN];
    write_header(&mut buf, request);
    write_commands(&mut buf, motor1, motor2)?;
    Ok(Bytes::from(buf))
}

/// Parameter section of an inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterReply {
    /// Raw function code (firmware may send codes this side does not know)
    pub function: u8,
    pub index: u8,
    pub device: u8,
    pub sub_index: u8,
    pub value: i32,
}

impl ParameterReply {
    pub fn function_code(&self) -> Option<FunctionCode> {
        FunctionCode::from_u8(self.function)
    }
}

/// Fields recovered from a (possibly truncated) status frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedStatus {
    /// `None` when the input is shorter than the header
    pub parameter: Option<ParameterReply>,
    /// Slots fully contained in the input, in order
    pub pdo: Vec<i32>,
}

impl DecodedStatus {
    pub fn slot(&self, k: usize) -> Option<i32> {
        self.pdo.get(k).copied()
    }

    /// Status block of `motor`; absent slots stay `None`
    pub fn motor(&self, motor: MotorId) -> MotorStatusUpdate {
        let base = motor.status_base();
        MotorStatusUpdate {
            status_word: self.slot(base),
            actual_position: self.slot(base + 1),
            actual_velocity: self.slot(base + 2),
        }
    }

    pub fn force(&self) -> Option<i32> {
        self.slot(FORCE_SLOT)
    }
}

#[inline]
fn read_i32(data: &[u8], offset: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[offset..offset + 4]);
    i32::from_le_bytes(raw)
}

/// Decode a status frame
///
/// Short input is not an error: only the fields whose byte range fits
/// are returned. Empty input is `MalformedFrame`.
pub fn decode_status_frame(data: &[u8]) -> Result<DecodedStatus> {
    if data.is_empty() {
        return Err(LinkError::MalformedFrame {
            reason: "empty frame".into(),
        });
    }

    let parameter = (data.len() >= HEADER_LEN).then(|| ParameterReply {
        function: data[0],
        index: data[1],
        device: data[2],
        sub_index: data[3],
        value: read_i32(data, PARAMETER_VALUE_OFFSET),
    });

    let available = data.len().saturating_sub(PDO_OFFSET) / SLOT_SIZE;
    let pdo = (0..available.min(PDO_SLOTS))
        .map(|k| read_i32(data, slot_offset(k)))
        .collect();

    Ok(DecodedStatus { parameter, pdo })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{OperationMode, ParameterIndex};
    use proptest::prelude::*;

    fn status_frame(header: [u8; 8], slots: &[i32]) -> Vec<u8> {
        let mut data = header.to_vec();
        for s in slots {
            data.extend_from_slice(&s.to_le_bytes());
        }
        data
    }

    #[test]
    fn test_encode_full_length() {
        let frame = encode_command_frame(
            &MotorCommand::default(),
            &MotorCommand::default(),
            &ParameterRequest::FREE,
        )
        .unwrap();
        assert_eq!(frame.len(), FRAME_LEN);
        assert_eq!(frame[0], 255);
        // Unused reserved slots stay zero
        assert!(frame[slot_offset(15)..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_encode_header_little_endian() {
        let req = ParameterRequest::write(
            MotorId::Motor2,
            ParameterIndex::OperationMode,
            OperationMode::Homing.into(),
        );
        let frame =
            encode_command_frame(&MotorCommand::default(), &MotorCommand::default(), &req).unwrap();
        assert_eq!(&frame[..8], &[1, 3, 1, 0, 40, 0, 0, 0]);
    }

    #[test]
    fn test_motor2_wins_on_overlap() {
        let motor1 = MotorCommand {
            current_p: 3,
            current_n: 4,
            fast_stop_dec: 5,
            ..MotorCommand::default()
        };
        let motor2 = MotorCommand {
            target_position: 555,
            target_velocity: 777,
            profile_acc_time: 999,
            ..MotorCommand::default()
        };
        let frame = encode_command_frame(&motor1, &motor2, &ParameterRequest::FREE).unwrap();
        let decoded = decode_status_frame(&frame).unwrap();
        assert_eq!(decoded.slot(6), Some(555));
        assert_eq!(decoded.slot(7), Some(777));
        assert_eq!(decoded.slot(8), Some(999));
    }

    #[test]
    fn test_write_slot_out_of_table() {
        let mut buf = vec![0u8; FRAME_LEN];
        assert!(matches!(
            write_slot(&mut buf, PDO_SLOTS, 1),
            Err(LinkError::MalformedFrame { .. })
        ));
        assert!(write_slot(&mut buf, PDO_SLOTS - 1, 1).is_ok());
    }

    #[test]
    fn test_write_slot_buffer_too_small() {
        let mut buf = vec![0u8; 12];
        assert!(write_slot(&mut buf, 0, 1).is_ok());
        assert!(write_slot(&mut buf, 1, 1).is_err());
    }

    #[test]
    fn test_decode_empty_is_malformed() {
        assert!(matches!(
            decode_status_frame(&[]),
            Err(LinkError::MalformedFrame { .. })
        ));
    }

    #[test]
    fn test_decode_header_only_partial() {
        let decoded = decode_status_frame(&[2, 4, 0, 0, 10, 0]).unwrap();
        assert!(decoded.parameter.is_none());
        assert!(decoded.pdo.is_empty());
        assert_eq!(decoded.force(), None);
    }

    #[test]
    fn test_decode_read_ack() {
        let data = status_frame([2, 4, 0, 0, 10, 0, 0, 0], &[]);
        let decoded = decode_status_frame(&data).unwrap();
        let reply = decoded.parameter.unwrap();
        assert_eq!(reply.function_code(), Some(FunctionCode::ReadAck));
        assert_eq!(reply.index, 4);
        assert_eq!(reply.device, 0);
        assert_eq!(reply.value, 10);
    }

    #[test]
    fn test_decode_truncated_pdo_reports_absent() {
        // Header + 4 full slots + 3 stray bytes
        let mut data = status_frame([255, 0, 0, 0, 0, 0, 0, 0], &[11, 22, 33, 44]);
        data.extend_from_slice(&[1, 2, 3]);
        let decoded = decode_status_frame(&data).unwrap();
        assert_eq!(decoded.pdo, vec![11, 22, 33, 44]);

        let m1 = decoded.motor(MotorId::Motor1);
        assert_eq!(m1.status_word, Some(11));
        assert_eq!(m1.actual_velocity, Some(33));

        let m2 = decoded.motor(MotorId::Motor2);
        assert_eq!(m2.status_word, Some(44));
        assert_eq!(m2.actual_position, None);
        assert_eq!(m2.actual_velocity, None);
        assert_eq!(decoded.force(), None);
    }

    #[test]
    fn test_decode_force_slot() {
        let mut slots = vec![0i32; 16];
        slots[15] = -1234;
        let data = status_frame([255, 0, 0, 0, 0, 0, 0, 0], &slots);
        assert_eq!(decode_status_frame(&data).unwrap().force(), Some(-1234));
    }

    #[test]
    fn test_decode_ignores_bytes_past_table() {
        let data = vec![0u8; FRAME_LEN + 64];
        assert_eq!(decode_status_frame(&data).unwrap().pdo.len(), PDO_SLOTS);
    }

    fn arb_command() -> impl Strategy<Value = MotorCommand> {
        proptest::array::uniform9(any::<i32>()).prop_map(|v| MotorCommand {
            target_position: v[0],
            target_velocity: v[1],
            profile_acc_time: v[2],
            homing_level: v[3],
            homing_dir: v[4],
            current_base: v[5],
            current_p: v[6],
            current_n: v[7],
            fast_stop_dec: v[8],
        })
    }

    proptest! {
        #[test]
        fn prop_roundtrip_recovers_fields(
            motor1 in arb_command(),
            motor2 in arb_command(),
            index in any::<u8>(),
            device in 0u8..2,
            sub_index in any::<u8>(),
            value in any::<i32>(),
        ) {
            let req = ParameterRequest::new(FunctionCode::Write, index, device, sub_index, value);
            let frame = encode_command_frame(&motor1, &motor2, &req).unwrap();
            let decoded = decode_status_frame(&frame).unwrap();

            let reply = decoded.parameter.unwrap();
            prop_assert_eq!(reply.function_code(), Some(FunctionCode::Write));
            prop_assert_eq!(reply.index, index);
            prop_assert_eq!(reply.device, device);
            prop_assert_eq!(reply.sub_index, sub_index);
            prop_assert_eq!(reply.value, value);

            for field in CommandField::ALL {
                // Motor 1's slots 6..=8 are shadowed by motor 2
                if field.slot(MotorId::Motor1) < MotorId::Motor2.command_base() {
                    prop_assert_eq!(decoded.slot(field.slot(MotorId::Motor1)), Some(motor1.get(field)));
                }
                prop_assert_eq!(decoded.slot(field.slot(MotorId::Motor2)), Some(motor2.get(field)));
            }
        }

        #[test]
        fn prop_decode_never_panics(data in proptest::collection::vec(any::<u8>(), 1..300)) {
            let decoded = decode_status_frame(&data).unwrap();
            prop_assert_eq!(decoded.parameter.is_some(), data.len() >= HEADER_LEN);
            prop_assert!(decoded.pdo.len() <= PDO_SLOTS);
        }
    }
}
