//! Runs one transfer on the hardware: occupy the slot, send with busy retry,
//! wait for the acknowledgement.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use shub_metrics::metric_defs;
use shub_metrics::metrics::counter;
use tracing::{debug, warn};

use crate::config::{RetryPolicy, TransportConfig};
use crate::error::IpiError;
use crate::mailbox::{ChannelId, Mailbox};
use crate::retry::{send_with_retry, Sleeper};
use crate::slot::{Completion, HwTransferSlot, SlotGuard};
use crate::stats::Counters;

/// Executes transfers one at a time against a [`Mailbox`].
pub(crate) struct Executor {
    mailbox: Arc<dyn Mailbox>,
    slot: HwTransferSlot,
    stats: Counters,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    timeout: Duration,
    slot_size: usize,
}

impl Executor {
    pub fn new(mailbox: Arc<dyn Mailbox>, config: &TransportConfig, sleeper: Arc<dyn Sleeper>) -> Self {
        Executor {
            mailbox,
            slot: HwTransferSlot::new(),
            stats: Counters::default(),
            retry: config.retry.clone(),
            sleeper,
            timeout: config.completion_timeout(),
            slot_size: config.slot_size,
        }
    }

    pub fn mailbox(&self) -> &Arc<dyn Mailbox> {
        &self.mailbox
    }

    pub fn slot(&self) -> &HwTransferSlot {
        &self.slot
    }

    pub fn stats(&self) -> &Counters {
        &self.stats
    }

    fn post(&self, channel: ChannelId, payload: &[u8]) -> Result<u32, IpiError> {
        let result = send_with_retry(
            self.mailbox.as_ref(),
            channel,
            payload,
            self.slot_size,
            &self.retry,
            self.sleeper.as_ref(),
        );
        self.stats.record_send(&result);
        result
    }

    /// Send without waiting for an acknowledgement and without touching the
    /// transfer slot.
    pub fn send(&self, channel: ChannelId, payload: &[u8]) -> Result<(), IpiError> {
        self.post(channel, payload).map(|_| ())
    }

    /// Send `payload` on `channel` and wait for the acknowledgement.
    ///
    /// The slot is armed before the send so an acknowledgement that races the
    /// send call is not lost. The returned completion holds at most `rx_len`
    /// bytes together with the length the remote actually sent.
    pub fn transfer(
        &self,
        channel: ChannelId,
        payload: &[u8],
        rx_len: usize,
    ) -> Result<Completion, IpiError> {
        let mut guard = self.slot.occupy();
        let done = guard.arm(channel, rx_len);

        self.post(channel, payload)?;

        match done.recv_timeout(self.timeout) {
            Ok(completion) => {
                debug!(%channel, len = completion.realized_len, "transfer acknowledged");
                Ok(completion)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                self.abandon(guard, &done, channel);
                Err(IpiError::Timeout {
                    channel,
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Give up on the armed transfer after its deadline.
    ///
    /// An acknowledgement that landed between the deadline and the disarm
    /// belongs to nobody and is counted as dropped.
    fn abandon(&self, mut guard: SlotGuard<'_>, done: &Receiver<Completion>, channel: ChannelId) {
        guard.disarm();
        if let Ok(late) = done.try_recv() {
            self.stats.record_dropped_completion();
            counter!(metric_defs::IPI_DROPPED_COMPLETIONS).increment(1);
            warn!(%channel, len = late.realized_len, "dropped transfer: acknowledgement after deadline");
        }
        self.stats.record_timeout();
        counter!(metric_defs::IPI_TIMEOUTS, "channel" => channel.to_string()).increment(1);
        warn!(%channel, timeout = ?self.timeout, "transfer timed out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{InboundHandler, SendStatus};
    use parking_lot::Mutex;
    use std::sync::Weak;

    /// Mailbox that completes the executor's slot synchronously from `send`.
    struct LoopbackMailbox {
        executor: Mutex<Weak<Executor>>,
        reply: Option<Vec<u8>>,
    }

    impl Mailbox for LoopbackMailbox {
        fn send(&self, _channel: ChannelId, _payload: &[u8], _slots: usize) -> SendStatus {
            if let (Some(reply), Some(executor)) = (&self.reply, self.executor.lock().upgrade()) {
                executor.slot().complete(reply);
            }
            SendStatus::Accepted
        }

        fn register(&self, _channel: ChannelId, _handler: InboundHandler) -> Result<(), i32> {
            Ok(())
        }

        fn unregister(&self, _channel: ChannelId) {}
    }

    fn executor(reply: Option<Vec<u8>>, timeout_ms: u64) -> Arc<Executor> {
        let mailbox = Arc::new(LoopbackMailbox {
            executor: Mutex::new(Weak::new()),
            reply,
        });
        let config = TransportConfig {
            completion_timeout_ms: timeout_ms,
            ..TransportConfig::default()
        };
        let executor = Arc::new(Executor::new(
            mailbox.clone(),
            &config,
            Arc::new(crate::retry::ThreadSleeper),
        ));
        *mailbox.executor.lock() = Arc::downgrade(&executor);
        executor
    }

    #[test]
    fn test_reply_inside_send_is_not_lost() {
        let executor = executor(Some(vec![0xAA, 0xBB]), 500);
        let completion = executor.transfer(ChannelId(2), &[1, 2, 3, 4], 2).unwrap();
        assert_eq!(completion.data, vec![0xAA, 0xBB]);
        assert_eq!(completion.realized_len, 2);
        assert!(!executor.slot().is_armed());
    }

    #[test]
    fn test_timeout_disarms_slot() {
        let executor = executor(None, 10);
        let err = executor.transfer(ChannelId(2), &[1, 2, 3, 4], 2).unwrap_err();
        assert!(matches!(err, IpiError::Timeout { channel: ChannelId(2), .. }));
        assert!(!executor.slot().is_armed());
        assert!(!executor.slot().complete(&[0xAA, 0xBB]));
        assert_eq!(executor.stats().snapshot().timeouts, 1);
        assert_eq!(executor.stats().snapshot().sends, 1);
        assert_eq!(executor.stats().snapshot().dropped_completions, 0);
    }

    #[test]
    fn test_ack_between_deadline_and_disarm_is_dropped() {
        let executor = executor(None, 10);
        let mut guard = executor.slot().occupy();
        let done = guard.arm(ChannelId(2), 2);
        // The acknowledgement lands after the wait gave up.
        assert!(executor.slot().complete(&[0xAA, 0xBB]));

        executor.abandon(guard, &done, ChannelId(2));
        let stats = executor.stats().snapshot();
        assert_eq!(stats.dropped_completions, 1);
        assert_eq!(stats.timeouts, 1);
        assert!(!executor.slot().is_armed());
    }
}
