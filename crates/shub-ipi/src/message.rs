//! Transfers and the messages that batch them.

use bytes::Bytes;

use crate::error::IpiError;
use crate::mailbox::ChannelId;

/// Callback run once a message has been dispatched. It receives the message
/// back, with [`Message::status`] set and rx buffers filled.
pub type CompletionFn = Box<dyn FnOnce(Message) + Send + 'static>;

/// One send/receive operation on a channel.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub(crate) channel: ChannelId,
    pub(crate) tx: Option<Bytes>,
    pub(crate) tx_len: usize,
    pub(crate) rx: Vec<u8>,
    pub(crate) rx_len: usize,
}

impl Transfer {
    /// Send `tx` on `channel` and expect an `rx_len`-byte acknowledgement.
    pub fn new(channel: ChannelId, tx: impl Into<Bytes>, rx_len: usize) -> Self {
        let tx = tx.into();
        Transfer {
            channel,
            tx_len: tx.len(),
            tx: Some(tx),
            rx: Vec::new(),
            rx_len,
        }
    }

    /// Send `tx` on `channel` and expect an empty acknowledgement.
    pub fn send(channel: ChannelId, tx: impl Into<Bytes>) -> Self {
        Self::new(channel, tx, 0)
    }

    /// Build a transfer from raw parts without checking them.
    ///
    /// `tx_len` may disagree with `tx`; such transfers fail with
    /// [`IpiError::InvalidArgument`] when dispatched.
    pub fn from_parts(channel: ChannelId, tx: Option<Bytes>, tx_len: usize, rx_len: usize) -> Self {
        Transfer {
            channel,
            tx,
            tx_len,
            rx: Vec::new(),
            rx_len,
        }
    }

    /// Channel the transfer is sent on.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Bytes to send.
    pub fn tx(&self) -> Option<&[u8]> {
        self.tx.as_deref()
    }

    /// Number of bytes to send.
    pub fn tx_len(&self) -> usize {
        self.tx_len
    }

    /// Expected acknowledgement length.
    pub fn rx_len(&self) -> usize {
        self.rx_len
    }

    /// Received bytes (at most `rx_len`).
    pub fn rx(&self) -> &[u8] {
        &self.rx
    }

    /// Take ownership of the received bytes.
    pub fn into_rx(self) -> Vec<u8> {
        self.rx
    }

    /// Check the buffer arguments before anything touches the mailbox.
    pub(crate) fn validate(&self) -> Result<(), IpiError> {
        match &self.tx {
            None if self.tx_len > 0 => Err(IpiError::InvalidArgument("tx buffer missing")),
            Some(tx) if tx.len() < self.tx_len => {
                Err(IpiError::InvalidArgument("tx buffer shorter than tx_len"))
            }
            _ => Ok(()),
        }
    }
}

/// An ordered batch of transfers executed and completed as one unit.
pub struct Message {
    pub(crate) transfers: Vec<Transfer>,
    pub(crate) status: Result<(), IpiError>,
    pub(crate) complete: Option<CompletionFn>,
}

impl Message {
    /// Create an empty message.
    pub fn new() -> Self {
        Message {
            transfers: Vec::new(),
            status: Err(IpiError::InProgress),
            complete: None,
        }
    }

    /// Create a message holding a single transfer.
    pub fn single(transfer: Transfer) -> Self {
        let mut message = Self::new();
        message.add_tail(transfer);
        message
    }

    /// Append a transfer; transfers run in insertion order.
    pub fn add_tail(&mut self, transfer: Transfer) {
        self.transfers.push(transfer);
    }

    /// Builder form of [`Message::add_tail`].
    pub fn with_transfer(mut self, transfer: Transfer) -> Self {
        self.add_tail(transfer);
        self
    }

    /// Set the completion callback.
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Message) + Send + 'static,
    {
        self.complete = Some(Box::new(f));
        self
    }

    /// Final status: the first failure among the transfers, or `Ok`.
    /// [`IpiError::InProgress`] until the message has been dispatched.
    pub fn status(&self) -> &Result<(), IpiError> {
        &self.status
    }

    /// The transfers, in execution order.
    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    /// Take ownership of the transfers.
    pub fn into_transfers(self) -> Vec<Transfer> {
        self.transfers
    }

    /// Hand the message to its completion callback, if it has one.
    pub(crate) fn complete(mut self) {
        if let Some(complete) = self.complete.take() {
            complete(self);
        }
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("transfers", &self.transfers)
            .field("status", &self.status)
            .field("has_completion", &self.complete.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_new() {
        let t = Transfer::new(ChannelId(2), vec![1u8, 2, 3], 8);
        assert_eq!(t.tx(), Some(&[1u8, 2, 3][..]));
        assert_eq!(t.tx_len(), 3);
        assert_eq!(t.rx_len(), 8);
        assert!(t.rx().is_empty());
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_transfer_missing_tx() {
        let t = Transfer::from_parts(ChannelId(2), None, 4, 0);
        assert_eq!(t.validate(), Err(IpiError::InvalidArgument("tx buffer missing")));

        let t = Transfer::from_parts(ChannelId(2), None, 0, 0);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_transfer_short_tx() {
        let t = Transfer::from_parts(ChannelId(2), Some(Bytes::from_static(&[1])), 2, 0);
        assert!(matches!(t.validate(), Err(IpiError::InvalidArgument(_))));
    }

    #[test]
    fn test_message_starts_in_progress() {
        let message = Message::single(Transfer::send(ChannelId(1), vec![0u8]));
        assert_eq!(message.status(), &Err(IpiError::InProgress));
        assert_eq!(message.transfers().len(), 1);
    }

    #[test]
    fn test_message_complete_runs_callback_once() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut message = Message::new().on_complete(move |m| {
            tx.send(m.transfers().len()).unwrap();
        });
        message.add_tail(Transfer::send(ChannelId(1), vec![0u8]));
        message.add_tail(Transfer::send(ChannelId(1), vec![1u8]));
        message.complete();
        assert_eq!(rx.try_recv(), Ok(2));
        assert!(rx.try_recv().is_err());
    }
}
