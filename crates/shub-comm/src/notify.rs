//! Per-command notification handlers.

use std::sync::Arc;

use parking_lot::RwLock;
use shub_metrics::metric_defs;
use shub_metrics::metrics::counter;
use shub_protocol::{peek_command, NotifyCommand, NotifyPacket, ProtocolError};
use tracing::{trace, warn};

/// Handler for one notify command.
pub type NotifyHandler = Arc<dyn Fn(&NotifyPacket) + Send + Sync>;

/// Handlers indexed by notify command code.
pub(crate) struct NotifyTable {
    handlers: RwLock<[Option<NotifyHandler>; NotifyCommand::COUNT]>,
}

impl Default for NotifyTable {
    fn default() -> Self {
        NotifyTable {
            handlers: RwLock::new(std::array::from_fn(|_| None)),
        }
    }
}

impl NotifyTable {
    /// Install `handler` for `command`, returning the one it replaces.
    pub fn register(&self, command: NotifyCommand, handler: NotifyHandler) -> Option<NotifyHandler> {
        self.handlers.write()[command.code() as usize].replace(handler)
    }

    /// Remove the handler for `command`.
    pub fn unregister(&self, command: NotifyCommand) -> Option<NotifyHandler> {
        self.handlers.write()[command.code() as usize].take()
    }

    pub fn is_registered(&self, command: NotifyCommand) -> bool {
        self.handlers.read()[command.code() as usize].is_some()
    }

    pub fn clear(&self) {
        for slot in self.handlers.write().iter_mut() {
            *slot = None;
        }
    }

    /// Decode an inbound frame and hand it to its command's handler.
    ///
    /// Malformed frames are logged and dropped. Commands without a handler
    /// are ignored.
    pub fn dispatch(&self, frame: &[u8]) {
        let packet = match NotifyPacket::decode(frame) {
            Ok(packet) => packet,
            Err(err @ ProtocolError::CrcMismatch { .. }) => {
                counter!(metric_defs::COMM_CRC_ERRORS).increment(1);
                warn!(%err, "dropping notification");
                return;
            }
            Err(err) => {
                counter!(metric_defs::COMM_NOTIFY_DROPPED).increment(1);
                warn!(%err, command = ?peek_command(frame), len = frame.len(), "dropping notification");
                return;
            }
        };

        let handler = self.handlers.read()[packet.command.code() as usize].clone();
        match handler {
            Some(handler) => {
                counter!(
                    metric_defs::COMM_NOTIFY_DISPATCHED,
                    "command" => packet.command.as_str()
                )
                .increment(1);
                handler(&packet);
            }
            None => trace!(command = %packet.command, "no handler for notification"),
        }
    }
}
