//! The single in-flight transfer slot.
//!
//! At most one transfer may be outstanding on the hardware at any time. The
//! executor occupies the slot for the duration of a send/wait cycle and arms
//! it with the receiving side of a completion channel; the inbound router
//! fills the armed slot from interrupt context.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Mutex, MutexGuard};

use crate::mailbox::ChannelId;

/// Acknowledgement delivered to a waiting transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Completion {
    /// Received bytes, truncated to the expected length.
    pub data: Vec<u8>,
    /// Length the remote side actually sent.
    pub realized_len: usize,
}

#[derive(Debug, Default)]
struct SlotState {
    channel: Option<ChannelId>,
    rx_len: usize,
    waiter: Option<Sender<Completion>>,
}

/// Holder of the one outstanding transfer.
#[derive(Debug, Default)]
pub(crate) struct HwTransferSlot {
    occupant: Mutex<()>,
    state: Mutex<SlotState>,
}

impl HwTransferSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the slot is free and take it.
    pub fn occupy(&self) -> SlotGuard<'_> {
        SlotGuard {
            slot: self,
            _occupant: self.occupant.lock(),
        }
    }

    /// Take the slot if nobody holds it.
    #[cfg(test)]
    pub fn try_occupy(&self) -> Option<SlotGuard<'_>> {
        self.occupant.try_lock().map(|occupant| SlotGuard {
            slot: self,
            _occupant: occupant,
        })
    }

    /// Whether a transfer is waiting for its acknowledgement.
    pub fn is_armed(&self) -> bool {
        self.state.lock().waiter.is_some()
    }

    /// Outbound channel of the waiting transfer, if any.
    pub fn armed_channel(&self) -> Option<ChannelId> {
        let state = self.state.lock();
        state.waiter.as_ref().and(state.channel)
    }

    /// Deliver an acknowledgement to the waiting transfer.
    ///
    /// Returns `false` when nothing is waiting; the data is dropped. The
    /// waiter is consumed, so a second acknowledgement for the same transfer
    /// is dropped as well.
    pub fn complete(&self, data: &[u8]) -> bool {
        let (waiter, rx_len) = {
            let mut state = self.state.lock();
            match state.waiter.take() {
                Some(waiter) => (waiter, state.rx_len),
                None => return false,
            }
        };
        let kept = data.len().min(rx_len);
        let completion = Completion {
            data: data[..kept].to_vec(),
            realized_len: data.len(),
        };
        // The receiver is gone if the transfer already timed out.
        waiter.send(completion).is_ok()
    }
}

/// Exclusive use of the [`HwTransferSlot`]. Disarms the slot when dropped.
pub(crate) struct SlotGuard<'a> {
    slot: &'a HwTransferSlot,
    _occupant: MutexGuard<'a, ()>,
}

impl SlotGuard<'_> {
    /// Prepare the slot for an acknowledgement of up to `rx_len` bytes.
    pub fn arm(&mut self, channel: ChannelId, rx_len: usize) -> Receiver<Completion> {
        let (tx, rx) = bounded(1);
        let mut state = self.slot.state.lock();
        state.channel = Some(channel);
        state.rx_len = rx_len;
        state.waiter = Some(tx);
        rx
    }

    /// Forget the current waiter.
    pub fn disarm(&mut self) {
        let mut state = self.slot.state.lock();
        state.channel = None;
        state.rx_len = 0;
        state.waiter = None;
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.disarm();
    }
}
