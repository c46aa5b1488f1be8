//! Control, acknowledgement and notify packets.
//!
//! Each packet is encoded with its checksum freshly computed, and decoding
//! verifies the checksum before anything else is trusted.

use bytes::{Buf, BufMut};

use crate::commands::{CtrlCommand, NotifyCommand};
use crate::constants::*;
use crate::crc::header_crc8;
use crate::error::{ProtocolError, ProtocolResult};

fn put_header(buf: &mut Vec<u8>, header: [u8; 4]) {
    buf.put_slice(&header);
    buf.put_u8(header_crc8(&header));
    // Pad up to the aligned body offset.
    buf.put_bytes(0, BODY_OFFSET - HEADER_SIZE);
}

fn check_header(frame: &[u8], min_len: usize) -> ProtocolResult<()> {
    if frame.len() < min_len {
        return Err(ProtocolError::too_short(min_len, frame.len()));
    }
    let expected = header_crc8(frame);
    let actual = frame[CRC_OFFSET];
    if expected != actual {
        log::debug!("header crc mismatch: computed 0x{expected:02X}, frame 0x{actual:02X}");
        return Err(ProtocolError::CrcMismatch { expected, actual });
    }
    Ok(())
}

// ============================================================================
// Control request
// ============================================================================

/// A control request sent to the co-processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtrlPacket {
    /// Sequence number, stamped by the sender.
    pub sequence: u8,
    /// Sensor the command is addressed to.
    pub sensor_type: u8,
    /// Command code.
    pub command: CtrlCommand,
    /// Command body.
    pub data: Vec<u8>,
}

impl CtrlPacket {
    /// Create a control request with sequence 0.
    pub fn new(sensor_type: u8, command: CtrlCommand, data: Vec<u8>) -> Self {
        CtrlPacket {
            sequence: 0,
            sensor_type,
            command,
            data,
        }
    }

    /// Size of the encoded frame.
    pub fn encoded_len(&self) -> usize {
        CTRL_HEADER_SIZE + self.data.len()
    }

    /// Encode the packet, computing its checksum.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        if self.data.len() > CTRL_MAX_DATA_LEN {
            return Err(ProtocolError::DataTooLong {
                max: CTRL_MAX_DATA_LEN,
                actual: self.data.len(),
            });
        }
        let mut buf = Vec::with_capacity(self.encoded_len());
        put_header(
            &mut buf,
            [
                self.sequence,
                self.sensor_type,
                self.command.code(),
                self.data.len() as u8,
            ],
        );
        buf.put_slice(&self.data);
        Ok(buf)
    }

    /// Decode a control request.
    pub fn decode(frame: &[u8]) -> ProtocolResult<Self> {
        check_header(frame, CTRL_HEADER_SIZE)?;
        let length = frame[3] as usize;
        if frame.len() < CTRL_HEADER_SIZE + length {
            return Err(ProtocolError::too_short(
                CTRL_HEADER_SIZE + length,
                frame.len(),
            ));
        }
        Ok(CtrlPacket {
            sequence: frame[0],
            sensor_type: frame[1],
            command: CtrlCommand::try_from(frame[2])?,
            data: frame[BODY_OFFSET..BODY_OFFSET + length].to_vec(),
        })
    }
}

// ============================================================================
// Acknowledgement
// ============================================================================

/// Acknowledgement of a control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPacket {
    /// Sequence number of the acknowledged request.
    pub sequence: u8,
    /// Sensor the request was addressed to.
    pub sensor_type: u8,
    /// Command being acknowledged.
    pub command: CtrlCommand,
    /// Result reported by the co-processor; negative on failure.
    pub ret_val: i8,
}

impl AckPacket {
    /// Build the acknowledgement for `ctrl` carrying `ret_val`.
    pub fn for_request(ctrl: &CtrlPacket, ret_val: i8) -> Self {
        AckPacket {
            sequence: ctrl.sequence,
            sensor_type: ctrl.sensor_type,
            command: ctrl.command,
            ret_val,
        }
    }

    /// Whether the co-processor reported success.
    pub fn is_ok(&self) -> bool {
        self.ret_val >= 0
    }

    /// Encode the acknowledgement, computing its checksum.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ACK_SIZE);
        buf.put_slice(&[self.sequence, self.sensor_type, self.command.code()]);
        buf.put_i8(self.ret_val);
        let crc = header_crc8(&buf);
        buf.put_u8(crc);
        buf.put_bytes(0, ACK_SIZE - HEADER_SIZE);
        buf
    }

    /// Decode an acknowledgement.
    pub fn decode(frame: &[u8]) -> ProtocolResult<Self> {
        check_header(frame, ACK_SIZE)?;
        Ok(AckPacket {
            sequence: frame[0],
            sensor_type: frame[1],
            command: CtrlCommand::try_from(frame[2])?,
            ret_val: frame[3] as i8,
        })
    }
}

// ============================================================================
// Notification
// ============================================================================

/// A notification frame with a fixed five-word body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyPacket {
    /// Sequence number, stamped by the sender.
    pub sequence: u8,
    /// Sensor the notification concerns.
    pub sensor_type: u8,
    /// Notify command code.
    pub command: NotifyCommand,
    /// Number of meaningful body bytes.
    pub length: u8,
    /// Body words.
    pub value: [i32; NOTIFY_VALUE_COUNT],
}

impl NotifyPacket {
    /// Create a notification with an all-zero body.
    pub fn new(sensor_type: u8, command: NotifyCommand) -> Self {
        NotifyPacket {
            sequence: 0,
            sensor_type,
            command,
            length: 0,
            value: [0; NOTIFY_VALUE_COUNT],
        }
    }

    /// Create a notification whose body is `body`, packed little-endian into
    /// the value words. Bytes beyond the body capacity are discarded.
    pub fn with_body(sensor_type: u8, command: NotifyCommand, body: &[u8]) -> Self {
        let mut raw = [0u8; NOTIFY_VALUE_COUNT * 4];
        let len = body.len().min(raw.len());
        raw[..len].copy_from_slice(&body[..len]);
        let mut packet = Self::new(sensor_type, command);
        packet.length = len as u8;
        for (word, chunk) in packet.value.iter_mut().zip(raw.chunks_exact(4)) {
            *word = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        packet
    }

    /// The body as raw little-endian bytes.
    pub fn body(&self) -> [u8; NOTIFY_VALUE_COUNT * 4] {
        let mut raw = [0u8; NOTIFY_VALUE_COUNT * 4];
        for (chunk, word) in raw.chunks_exact_mut(4).zip(self.value.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        raw
    }

    /// Encode the notification, computing its checksum.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(NOTIFY_SIZE);
        put_header(
            &mut buf,
            [self.sequence, self.sensor_type, self.command.code(), self.length],
        );
        for word in self.value {
            buf.put_i32_le(word);
        }
        buf
    }

    /// Decode a notification. Trailing bytes past the fixed size (mailbox
    /// slot padding) are ignored.
    pub fn decode(frame: &[u8]) -> ProtocolResult<Self> {
        check_header(frame, NOTIFY_SIZE)?;
        let mut body = &frame[BODY_OFFSET..NOTIFY_SIZE];
        let mut value = [0i32; NOTIFY_VALUE_COUNT];
        for word in value.iter_mut() {
            *word = body.get_i32_le();
        }
        Ok(NotifyPacket {
            sequence: frame[0],
            sensor_type: frame[1],
            command: NotifyCommand::try_from(frame[2])?,
            length: frame[3],
            value,
        })
    }
}

/// Peek at the command byte of a raw notification without validating it.
pub fn peek_command(frame: &[u8]) -> Option<u8> {
    frame.get(2).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::crc8;

    #[test]
    fn test_ctrl_layout() {
        let mut ctrl = CtrlPacket::new(3, CtrlCommand::Configure, vec![0xDE, 0xAD]);
        ctrl.sequence = 9;
        let frame = ctrl.encode().unwrap();

        assert_eq!(frame.len(), 10);
        assert_eq!(&frame[..4], &[9, 3, 4, 2]);
        assert_eq!(frame[4], crc8(&[9, 3, 4, 2]));
        assert_eq!(&frame[5..8], &[0, 0, 0]);
        assert_eq!(&frame[8..], &[0xDE, 0xAD]);

        assert_eq!(CtrlPacket::decode(&frame).unwrap(), ctrl);
    }

    #[test]
    fn test_ctrl_data_too_long() {
        let ctrl = CtrlPacket::new(1, CtrlCommand::Debug, vec![0; 256]);
        assert_eq!(
            ctrl.encode(),
            Err(ProtocolError::DataTooLong { max: 255, actual: 256 })
        );
    }

    #[test]
    fn test_ctrl_truncated_body() {
        let ctrl = CtrlPacket::new(1, CtrlCommand::Configure, vec![1, 2, 3, 4]);
        let frame = ctrl.encode().unwrap();
        assert_eq!(
            CtrlPacket::decode(&frame[..10]),
            Err(ProtocolError::too_short(12, 10))
        );
    }

    #[test]
    fn test_ack_layout() {
        let ack = AckPacket {
            sequence: 0x42,
            sensor_type: 1,
            command: CtrlCommand::Flush,
            ret_val: -22,
        };
        let frame = ack.encode();
        assert_eq!(frame.len(), ACK_SIZE);
        assert_eq!(frame[3], (-22i8) as u8);
        assert_eq!(frame[4], crc8(&frame[..4]));
        assert_eq!(AckPacket::decode(&frame).unwrap(), ack);
        assert!(!ack.is_ok());
    }

    #[test]
    fn test_ack_bad_crc() {
        let ack = AckPacket {
            sequence: 1,
            sensor_type: 1,
            command: CtrlCommand::Enable,
            ret_val: 0,
        };
        let mut frame = ack.encode();
        frame[4] ^= 0xFF;
        assert!(matches!(
            AckPacket::decode(&frame),
            Err(ProtocolError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_notify_layout() {
        let mut notify = NotifyPacket::new(5, NotifyCommand::Data);
        notify.sequence = 1;
        notify.length = 20;
        notify.value = [1, -1, 2, 3, 0x0102_0304];
        let frame = notify.encode();

        assert_eq!(frame.len(), NOTIFY_SIZE);
        assert_eq!(&frame[8..12], &1i32.to_le_bytes());
        assert_eq!(&frame[12..16], &(-1i32).to_le_bytes());
        assert_eq!(&frame[24..28], &[4, 3, 2, 1]);
    }

    #[test]
    fn test_notify_decode_ignores_slot_padding() {
        let notify = NotifyPacket::with_body(2, NotifyCommand::Ready, &[7, 8, 9]);
        let mut frame = notify.encode();
        frame.extend_from_slice(&[0xFF; 4]);
        let decoded = NotifyPacket::decode(&frame).unwrap();
        assert_eq!(decoded, notify);
        assert_eq!(decoded.length, 3);
        assert_eq!(&decoded.body()[..4], &[7, 8, 9, 0]);
    }

    #[test]
    fn test_notify_unknown_command() {
        let mut frame = NotifyPacket::new(1, NotifyCommand::Test).encode();
        frame[2] = 0x30;
        frame[4] = crc8(&frame[..4]);
        assert_eq!(
            NotifyPacket::decode(&frame),
            Err(ProtocolError::UnknownNotifyCommand(0x30))
        );
        assert_eq!(peek_command(&frame), Some(0x30));
    }
}
