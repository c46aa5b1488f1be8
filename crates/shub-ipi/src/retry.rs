//! Busy-retry loop shared by queued transfers and no-ack sends.

use std::thread;
use std::time::Duration;

use shub_metrics::metric_defs;
use shub_metrics::metrics::counter;
use tracing::{trace, warn};

use crate::config::RetryPolicy;
use crate::error::IpiError;
use crate::mailbox::{pad_to_slots, ChannelId, Mailbox, SendStatus};

/// Something that can pause the calling thread.
///
/// The transport sleeps between bursts of busy retries; tests substitute a
/// recorder so they can observe the cadence without waiting.
pub trait Sleeper: Send + Sync {
    /// Block the current thread for roughly `duration`.
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by [`std::thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Post `payload` on `channel`, retrying while the mailbox reports busy.
///
/// Returns the number of attempts it took. The payload is zero-padded to the
/// mailbox slot granularity before sending.
pub(crate) fn send_with_retry(
    mailbox: &dyn Mailbox,
    channel: ChannelId,
    payload: &[u8],
    slot_size: usize,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
) -> Result<u32, IpiError> {
    let (frame, slots) = pad_to_slots(payload, slot_size);
    let label = channel.to_string();

    for attempt in 1..=policy.max_attempts {
        match mailbox.send(channel, &frame, slots) {
            SendStatus::Accepted => {
                counter!(metric_defs::IPI_SENDS, "channel" => label).increment(1);
                if attempt > 1 {
                    trace!(%channel, attempt, "send accepted after busy retries");
                }
                return Ok(attempt);
            }
            SendStatus::Failed(status) => {
                counter!(metric_defs::IPI_IO_ERRORS, "channel" => label).increment(1);
                warn!(%channel, status, "mailbox send failed");
                return Err(IpiError::Io { channel, status });
            }
            SendStatus::Busy => {
                counter!(metric_defs::IPI_BUSY_RETRIES, "channel" => label.clone())
                    .increment(1);
                if policy.sleeps_after(attempt) {
                    let pause = policy.backoff();
                    trace!(%channel, attempt, ?pause, "channel busy, backing off");
                    sleeper.sleep(pause);
                }
            }
        }
    }

    counter!(metric_defs::IPI_BUSY_EXHAUSTED, "channel" => label).increment(1);
    warn!(%channel, attempts = policy.max_attempts, "channel still busy, giving up");
    Err(IpiError::Busy {
        channel,
        attempts: policy.max_attempts,
    })
}
