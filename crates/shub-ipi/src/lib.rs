//! IPI mailbox transport
//!
//! Moves messages between the host and the sensor co-processor over a shared
//! mailbox that can carry exactly one outstanding transfer at a time.
//!
//! # Architecture
//!
//! ```text
//! submit_sync / submit_async
//!        │
//!        ▼
//!   MessageQueue ──► dispatch pass ──► Executor ──► Mailbox::send (busy retry)
//!                         ▲                │
//!                         │                ▼
//!                 completion callback   HwTransferSlot ◄── ctrl-in handler
//!                                                          notify-in handler ──► notify consumer
//! ```
//!
//! - Messages are ordered lists of [`Transfer`]s and complete in FIFO order.
//! - One dispatch pass runs at a time. It runs on the `ipi-dispatch` worker
//!   thread or, for blocking submissions, on the submitting thread.
//! - A busy mailbox is retried per [`RetryPolicy`]; an acknowledgement that
//!   arrives after its transfer gave up is dropped.
//!
//! # Features
//!
//! - `sim`: [`sim::SimMailbox`], an in-process remote endpoint for tests.

mod config;
mod error;
mod executor;
mod mailbox;
mod message;
mod queue;
mod retry;
mod slot;
mod stats;
mod transport;

#[cfg(feature = "sim")]
pub mod sim;

pub use config::{ChannelMap, RetryPolicy, TransportConfig};
pub use error::{ConfigError, IpiError, IpiResult, StartError};
pub use mailbox::{slot_count, ChannelId, InboundHandler, Mailbox, SendStatus};
pub use message::{CompletionFn, Message, Transfer};
pub use retry::{Sleeper, ThreadSleeper};
pub use stats::TransportStats;
pub use transport::{NotifyCallback, Transport, TransportBuilder};
