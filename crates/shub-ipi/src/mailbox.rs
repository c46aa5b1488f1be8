//! Boundary with the physical mailbox.
//!
//! The mailbox moves payloads in fixed-size slots on numbered channels. The
//! transport only needs three primitives from it: a non-blocking `send`, and
//! binding/unbinding an inbound handler that the mailbox invokes from its
//! interrupt context.

use std::borrow::Cow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A numbered endpoint inside the shared mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u32);

impl ChannelId {
    /// Create a new channel id.
    pub const fn new(id: u32) -> Self {
        ChannelId(id)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a single mailbox send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The mailbox took the payload.
    Accepted,
    /// The channel is full right now; try again.
    Busy,
    /// Fatal failure with the raw (negative) status.
    Failed(i32),
}

impl SendStatus {
    /// Interpret a raw status: 0 accepted, positive busy, negative fatal.
    pub fn from_raw(status: i32) -> Self {
        match status {
            0 => SendStatus::Accepted,
            s if s > 0 => SendStatus::Busy,
            s => SendStatus::Failed(s),
        }
    }
}

/// Handler the mailbox invokes for each inbound payload on a bound channel.
pub type InboundHandler = Arc<dyn Fn(ChannelId, &[u8]) + Send + Sync>;

/// The physical mailbox.
///
/// Implementations must be callable from any thread. `send` must not block
/// waiting for the remote side; a full channel is reported as
/// [`SendStatus::Busy`].
pub trait Mailbox: Send + Sync {
    /// Post `payload` (exactly `slots` slots long) on `channel`.
    fn send(&self, channel: ChannelId, payload: &[u8], slots: usize) -> SendStatus;

    /// Bind `handler` to inbound traffic on `channel`.
    ///
    /// Returns the raw failure status if the binding is refused.
    fn register(&self, channel: ChannelId, handler: InboundHandler) -> Result<(), i32>;

    /// Unbind whatever handler is bound to `channel`.
    fn unregister(&self, channel: ChannelId);
}

/// Number of mailbox slots needed for `len` bytes.
pub fn slot_count(len: usize, slot_size: usize) -> usize {
    len.div_ceil(slot_size)
}

/// Zero-pad `payload` up to a whole number of slots.
pub(crate) fn pad_to_slots(payload: &[u8], slot_size: usize) -> (Cow<'_, [u8]>, usize) {
    let slots = slot_count(payload.len(), slot_size);
    let padded_len = slots * slot_size;
    if padded_len == payload.len() {
        (Cow::Borrowed(payload), slots)
    } else {
        let mut padded = Vec::with_capacity(padded_len);
        padded.extend_from_slice(payload);
        padded.resize(padded_len, 0);
        (Cow::Owned(padded), slots)
    }
}
