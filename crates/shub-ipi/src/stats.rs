//! In-process transfer counters.
//!
//! These mirror the exported metrics but can be read back directly, which is
//! what tests and health checks want.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::IpiError;

/// Snapshot of the transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Payloads accepted by the mailbox.
    pub sends: u64,
    /// Sends abandoned because the channel stayed busy.
    pub busy_exhausted: u64,
    /// Sends rejected with a fatal mailbox status.
    pub io_errors: u64,
    /// Transfers that never saw an acknowledgement.
    pub timeouts: u64,
    /// Acknowledgements with an unexpected length.
    pub length_mismatches: u64,
    /// Acknowledgements that arrived with nobody waiting.
    pub dropped_completions: u64,
    /// Messages whose completion has run.
    pub messages_completed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    sends: AtomicU64,
    busy_exhausted: AtomicU64,
    io_errors: AtomicU64,
    timeouts: AtomicU64,
    length_mismatches: AtomicU64,
    dropped_completions: AtomicU64,
    messages_completed: AtomicU64,
}

impl Counters {
    /// Count the outcome of a send attempt sequence.
    pub fn record_send<T>(&self, result: &Result<T, IpiError>) {
        let counter = match result {
            Ok(_) => &self.sends,
            Err(IpiError::Busy { .. }) => &self.busy_exhausted,
            Err(IpiError::Io { .. }) => &self.io_errors,
            Err(_) => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_length_mismatch(&self) {
        self.length_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_completion(&self) {
        self.dropped_completions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_completed(&self) {
        self.messages_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TransportStats {
        TransportStats {
            sends: self.sends.load(Ordering::Relaxed),
            busy_exhausted: self.busy_exhausted.load(Ordering::Relaxed),
            io_errors: self.io_errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            length_mismatches: self.length_mismatches.load(Ordering::Relaxed),
            dropped_completions: self.dropped_completions.load(Ordering::Relaxed),
            messages_completed: self.messages_completed.load(Ordering::Relaxed),
        }
    }
}
