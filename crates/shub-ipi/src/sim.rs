//! Simulated mailbox for tests and benchmarks.
//!
//! [`SimMailbox`] plays the remote endpoint. Every send attempt is handed to
//! a responder closure that decides whether the channel is busy, whether the
//! send fails, or which replies the remote produces. Replies are delivered
//! from a dedicated "interrupt" thread, never from inside `send`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::mailbox::{ChannelId, InboundHandler, Mailbox, SendStatus};

/// One send attempt as seen by the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimSend {
    /// Outbound channel.
    pub channel: ChannelId,
    /// Payload as posted, padded to whole slots.
    pub payload: Vec<u8>,
    /// Slot count passed with the payload.
    pub slots: usize,
    /// 1-based attempt number across the mailbox's lifetime.
    pub attempt: u64,
}

/// A payload the remote sends back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Inbound channel it arrives on.
    pub channel: ChannelId,
    /// Payload bytes.
    pub payload: Vec<u8>,
    /// Delay after the triggering send.
    pub delay: Duration,
}

impl Delivery {
    /// Deliver `payload` on `channel` as soon as possible.
    pub fn now(channel: ChannelId, payload: impl Into<Vec<u8>>) -> Self {
        Delivery {
            channel,
            payload: payload.into(),
            delay: Duration::ZERO,
        }
    }

    /// Deliver `payload` on `channel` after `delay`.
    pub fn after(channel: ChannelId, payload: impl Into<Vec<u8>>, delay: Duration) -> Self {
        Delivery {
            channel,
            payload: payload.into(),
            delay,
        }
    }
}

/// What the remote does with a send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimReply {
    /// Take the payload and answer with these deliveries, in order.
    Accept(Vec<Delivery>),
    /// Report the channel busy.
    Busy,
    /// Fail the send with this (negative) status.
    Fail(i32),
}

impl SimReply {
    /// Accept without answering.
    pub fn silent() -> Self {
        SimReply::Accept(Vec::new())
    }

    /// Accept and answer with a single immediate delivery.
    pub fn reply(channel: ChannelId, payload: impl Into<Vec<u8>>) -> Self {
        SimReply::Accept(vec![Delivery::now(channel, payload)])
    }
}

type Responder = Box<dyn FnMut(&SimSend) -> SimReply + Send>;

enum IrqEvent {
    Deliver { due: Instant, channel: ChannelId, payload: Vec<u8> },
    Stop,
}

struct SimInner {
    handlers: RwLock<HashMap<ChannelId, InboundHandler>>,
    responder: Mutex<Responder>,
    sends: Mutex<Vec<SimSend>>,
    attempts: AtomicU64,
    irq_tx: Sender<IrqEvent>,
}

impl SimInner {
    fn schedule(&self, delivery: Delivery) {
        let event = IrqEvent::Deliver {
            due: Instant::now() + delivery.delay,
            channel: delivery.channel,
            payload: delivery.payload,
        };
        let _ = self.irq_tx.send(event);
    }

    fn deliver(&self, channel: ChannelId, payload: &[u8]) {
        let handler = self.handlers.read().get(&channel).cloned();
        match handler {
            Some(handler) => handler(channel, payload),
            None => trace!(%channel, len = payload.len(), "sim: no handler bound"),
        }
    }
}

fn run_irq(inner: Arc<SimInner>, events: Receiver<IrqEvent>) {
    loop {
        match events.recv() {
            Ok(IrqEvent::Deliver { due, channel, payload }) => {
                let now = Instant::now();
                if due > now {
                    thread::sleep(due - now);
                }
                inner.deliver(channel, &payload);
            }
            Ok(IrqEvent::Stop) | Err(_) => break,
        }
    }
    debug!("sim irq thread stopped");
}

/// Scriptable in-process [`Mailbox`].
pub struct SimMailbox {
    inner: Arc<SimInner>,
    irq: Mutex<Option<JoinHandle<()>>>,
}

impl SimMailbox {
    /// Create a mailbox whose remote side is driven by `responder`.
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: FnMut(&SimSend) -> SimReply + Send + 'static,
    {
        let (irq_tx, events) = unbounded();
        let inner = Arc::new(SimInner {
            handlers: RwLock::new(HashMap::new()),
            responder: Mutex::new(Box::new(responder)),
            sends: Mutex::new(Vec::new()),
            attempts: AtomicU64::new(0),
            irq_tx,
        });
        let irq_inner = Arc::clone(&inner);
        // A sim that cannot start its irq thread simply never delivers.
        let irq = thread::Builder::new()
            .name("sim-irq".into())
            .spawn(move || run_irq(irq_inner, events))
            .ok();
        Arc::new(SimMailbox {
            inner,
            irq: Mutex::new(irq),
        })
    }

    /// Remote that accepts everything and answers with the first
    /// `reply_len` bytes of each payload on `reply_channel`.
    pub fn echo(reply_channel: ChannelId, reply_len: usize) -> Arc<Self> {
        Self::new(move |send| {
            let len = reply_len.min(send.payload.len());
            SimReply::reply(reply_channel, &send.payload[..len])
        })
    }

    /// Remote that accepts everything and never answers.
    pub fn silent() -> Arc<Self> {
        Self::new(|_| SimReply::silent())
    }

    /// Replace the responder.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&SimSend) -> SimReply + Send + 'static,
    {
        *self.inner.responder.lock() = Box::new(responder);
    }

    /// Deliver `payload` on `channel` from the irq thread as if the remote
    /// sent it unprompted.
    pub fn inject(&self, channel: ChannelId, payload: impl Into<Vec<u8>>) {
        self.inner.schedule(Delivery::now(channel, payload));
    }

    /// Like [`SimMailbox::inject`], after `delay`.
    pub fn inject_after(&self, channel: ChannelId, payload: impl Into<Vec<u8>>, delay: Duration) {
        self.inner.schedule(Delivery::after(channel, payload, delay));
    }

    /// Total send attempts, busy and failed ones included.
    pub fn attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Accepted sends, in order.
    pub fn sends(&self) -> Vec<SimSend> {
        self.inner.sends.lock().clone()
    }

    /// Whether a handler is bound to `channel`.
    pub fn is_bound(&self, channel: ChannelId) -> bool {
        self.inner.handlers.read().contains_key(&channel)
    }
}

impl Mailbox for SimMailbox {
    fn send(&self, channel: ChannelId, payload: &[u8], slots: usize) -> SendStatus {
        let attempt = self.inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let send = SimSend {
            channel,
            payload: payload.to_vec(),
            slots,
            attempt,
        };
        let reply = {
            let mut responder = self.inner.responder.lock();
            (*responder)(&send)
        };
        match reply {
            SimReply::Busy => SendStatus::Busy,
            SimReply::Fail(status) => SendStatus::Failed(status),
            SimReply::Accept(deliveries) => {
                self.inner.sends.lock().push(send);
                for delivery in deliveries {
                    self.inner.schedule(delivery);
                }
                SendStatus::Accepted
            }
        }
    }

    fn register(&self, channel: ChannelId, handler: InboundHandler) -> Result<(), i32> {
        self.inner.handlers.write().insert(channel, handler);
        Ok(())
    }

    fn unregister(&self, channel: ChannelId) {
        self.inner.handlers.write().remove(&channel);
    }
}

impl Drop for SimMailbox {
    fn drop(&mut self) {
        let _ = self.inner.irq_tx.send(IrqEvent::Stop);
        let irq = self.irq.lock().take();
        if let Some(irq) = irq {
            // The last reference can go away inside a handler on the irq
            // thread itself.
            if irq.thread().id() != thread::current().id() {
                let _ = irq.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_delivered_to_bound_handler() {
        let sim = SimMailbox::echo(ChannelId(22), 2);
        let (tx, rx) = crossbeam_channel::unbounded();
        sim.register(
            ChannelId(22),
            Arc::new(move |channel: ChannelId, data: &[u8]| {
                tx.send((channel, data.to_vec())).unwrap();
            }),
        )
        .unwrap();

        assert_eq!(sim.send(ChannelId(2), &[0xAA, 0xBB, 0, 0], 1), SendStatus::Accepted);
        let (channel, data) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(channel, ChannelId(22));
        assert_eq!(data, vec![0xAA, 0xBB]);
        assert_eq!(sim.sends().len(), 1);
        assert_eq!(sim.sends()[0].slots, 1);
    }

    #[test]
    fn test_busy_and_fail_are_not_recorded() {
        let sim = SimMailbox::new(|send| match send.attempt {
            1 => SimReply::Busy,
            2 => SimReply::Fail(-5),
            _ => SimReply::silent(),
        });
        assert_eq!(sim.send(ChannelId(2), &[0; 4], 1), SendStatus::Busy);
        assert_eq!(sim.send(ChannelId(2), &[0; 4], 1), SendStatus::Failed(-5));
        assert_eq!(sim.send(ChannelId(2), &[0; 4], 1), SendStatus::Accepted);
        assert_eq!(sim.attempts(), 3);
        assert_eq!(sim.sends().len(), 1);
    }

    #[test]
    fn test_unregister() {
        let sim = SimMailbox::silent();
        sim.register(ChannelId(23), Arc::new(|_: ChannelId, _: &[u8]| {})).unwrap();
        assert!(sim.is_bound(ChannelId(23)));
        sim.unregister(ChannelId(23));
        assert!(!sim.is_bound(ChannelId(23)));
        // Delivering to an unbound channel is a no-op.
        sim.inject(ChannelId(23), vec![1, 2, 3]);
    }
}
