//! Sensor-hub communication service
//!
//! Pairs the framed packets from `shub-protocol` with the IPI transport:
//!
//! - [`SensorComm::ctrl_send`] sends a control request and validates the
//!   acknowledgement.
//! - [`SensorComm::notify`] and [`SensorComm::notify_bypass`] send
//!   notifications through the queue or straight to the mailbox.
//! - Inbound notifications are decoded and routed to the handler registered
//!   for their command.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # fn demo(transport: Arc<shub_ipi::Transport>) -> Result<(), shub_comm::CommError> {
//! use shub_comm::SensorComm;
//! use shub_protocol::{BatchParams, CtrlCommand, CtrlPacket, DataNotify, NotifyCommand};
//!
//! let comm = SensorComm::new(transport);
//! comm.register_notify_handler(NotifyCommand::Data, |packet| {
//!     let data = DataNotify::from_notify(packet);
//!     println!("sensor {} wrote up to {}", packet.sensor_type, data.write_position);
//! });
//!
//! let batch = BatchParams { delay: 20_000_000, latency: 0 };
//! let mut enable = CtrlPacket::new(1, CtrlCommand::Enable, batch.encode());
//! comm.ctrl_send(&mut enable)?;
//! # Ok(())
//! # }
//! ```

mod comm;
mod error;
mod notify;

pub use comm::SensorComm;
pub use error::{CommError, CommResult};
pub use notify::NotifyHandler;
