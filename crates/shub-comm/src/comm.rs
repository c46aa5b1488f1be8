//! The sensor-hub command and notification service.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use shub_ipi::Transport;
use shub_metrics::metric_defs;
use shub_metrics::metrics::counter;
use shub_protocol::{AckPacket, CtrlPacket, NotifyCommand, NotifyPacket, ProtocolError, ACK_SIZE};
use tracing::{debug, warn};

use crate::error::{CommError, CommResult};
use crate::notify::{NotifyHandler, NotifyTable};

/// Sends control requests and notifications to the co-processor and routes
/// its notifications to per-command handlers.
///
/// Creating a `SensorComm` makes it the transport's notification consumer.
pub struct SensorComm {
    transport: Arc<Transport>,
    sequence: AtomicU8,
    table: Arc<NotifyTable>,
}

impl SensorComm {
    /// Attach to `transport` and start receiving its notifications.
    pub fn new(transport: Arc<Transport>) -> Self {
        let table = Arc::new(NotifyTable::default());
        let inbound = Arc::clone(&table);
        transport.register_notify(move |frame| inbound.dispatch(frame));
        SensorComm {
            transport,
            sequence: AtomicU8::new(0),
            table,
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    fn next_sequence(&self) -> u8 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a control request and wait for its acknowledgement.
    ///
    /// Stamps the next sequence number into `ctrl`. A negative result in the
    /// acknowledgement is returned as [`CommError::RemoteFailure`].
    pub fn ctrl_send(&self, ctrl: &mut CtrlPacket) -> CommResult<AckPacket> {
        ctrl.sequence = self.next_sequence();
        let frame = ctrl.encode()?;

        let mut raw = [0u8; ACK_SIZE];
        self.transport
            .submit_sync(self.transport.ctrl_channel(), &frame, &mut raw)?;

        let ack = AckPacket::decode(&raw).map_err(|err| {
            if matches!(err, ProtocolError::CrcMismatch { .. }) {
                counter!(metric_defs::COMM_CRC_ERRORS).increment(1);
            }
            warn!(%err, command = %ctrl.command, sequence = ctrl.sequence, "bad acknowledgement");
            err
        })?;

        if !ack.is_ok() {
            debug!(command = %ack.command, ret_val = ack.ret_val, "command rejected");
            return Err(CommError::RemoteFailure {
                command: ack.command,
                ret_val: ack.ret_val,
            });
        }
        Ok(ack)
    }

    /// Send a notification through the queue and wait for the co-processor
    /// to take it.
    pub fn notify(&self, notify: &mut NotifyPacket) -> CommResult<()> {
        notify.sequence = self.next_sequence();
        let frame = notify.encode();
        self.transport
            .submit_sync(self.transport.notify_channel(), &frame, &mut [])?;
        Ok(())
    }

    /// Send a notification immediately, skipping the queue and the
    /// acknowledgement.
    pub fn notify_bypass(&self, notify: &mut NotifyPacket) -> CommResult<()> {
        notify.sequence = self.next_sequence();
        let frame = notify.encode();
        self.transport
            .send_noack(self.transport.notify_channel(), &frame)?;
        Ok(())
    }

    /// Route inbound `command` notifications to `handler`, replacing any
    /// previous handler for that command.
    pub fn register_notify_handler<F>(&self, command: NotifyCommand, handler: F)
    where
        F: Fn(&NotifyPacket) + Send + Sync + 'static,
    {
        let handler: NotifyHandler = Arc::new(handler);
        if self.table.register(command, handler).is_some() {
            debug!(%command, "replaced notify handler");
        }
    }

    /// Stop routing `command` notifications.
    pub fn unregister_notify_handler(&self, command: NotifyCommand) {
        self.table.unregister(command);
    }

    /// Whether a handler is installed for `command`.
    pub fn has_notify_handler(&self, command: NotifyCommand) -> bool {
        self.table.is_registered(command)
    }

    /// Detach from the transport's notifications and drop all handlers.
    pub fn shutdown(&self) {
        self.transport.unregister_notify();
        self.table.clear();
    }
}

impl std::fmt::Debug for SensorComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorComm")
            .field("transport", &self.transport)
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish()
    }
}
