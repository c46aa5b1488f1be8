//! Sensor-hub framed protocol
//!
//! This crate defines the packets exchanged between the host and the sensor
//! co-processor on top of the IPI mailbox transport. Every packet shares a
//! 5-byte header protected by a CRC-8, followed by padding up to a 4-byte
//! boundary and a command-specific body.
//!
//! # Protocol Overview
//!
//! - **Control requests** (host → co-processor): `CtrlPacket`, answered by
//!   exactly one `AckPacket` on the control-in channel.
//! - **Acknowledgements** (co-processor → host): `AckPacket`, carrying the
//!   signed result of the control command.
//! - **Notifications** (either direction): `NotifyPacket`, a fixed 28-byte
//!   frame with five 32-bit value words.
//!
//! ```text
//! offset  0        1            2         3        4       5..8     8..
//!        +--------+------------+---------+--------+-------+--------+--------
//!        | seq    | sensor_type| command | length | crc8  | pad    | body
//!        +--------+------------+---------+--------+-------+--------+--------
//! ```
//!
//! # Example
//!
//! ```rust
//! use shub_protocol::{CtrlCommand, CtrlPacket};
//!
//! let mut ctrl = CtrlPacket::new(1, CtrlCommand::Enable, vec![]);
//! ctrl.sequence = 7;
//! let frame = ctrl.encode().unwrap();
//! assert_eq!(frame.len(), 8);
//! assert_eq!(CtrlPacket::decode(&frame).unwrap().command, CtrlCommand::Enable);
//! ```

mod commands;
mod constants;
mod crc;
mod error;
mod packets;
mod payloads;

pub use commands::*;
pub use constants::*;
pub use crc::*;
pub use error::*;
pub use packets::*;
pub use payloads::*;
