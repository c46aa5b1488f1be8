//! The transport front door and inbound router.

use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver};
use parking_lot::{Mutex, RwLock};
use shub_metrics::metric_defs;
use shub_metrics::metrics::counter;
use tracing::{debug, error, info, trace, warn};

use crate::config::TransportConfig;
use crate::error::{IpiError, IpiResult, StartError};
use crate::executor::Executor;
use crate::mailbox::{ChannelId, InboundHandler, Mailbox};
use crate::message::{Message, Transfer};
use crate::queue::{self, MessageQueue, WorkerCommand};
use crate::retry::{Sleeper, ThreadSleeper};
use crate::stats::TransportStats;

/// Consumer of inbound notifications. Receives the raw payload.
pub type NotifyCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// State shared between the front door, the dispatch worker and the
/// mailbox's inbound handlers.
struct Shared {
    config: TransportConfig,
    executor: Executor,
    queue: MessageQueue,
    notify: RwLock<Option<NotifyCallback>>,
}

impl Shared {
    fn handle_inbound(&self, channel: ChannelId, data: &[u8]) {
        let channels = &self.config.channels;
        if channel == channels.ctrl_in {
            self.complete_transfer(data);
        } else if channel == channels.notify_in {
            self.deliver_notify(data);
        } else {
            warn!(%channel, len = data.len(), "inbound traffic on unexpected channel");
        }
    }

    fn complete_transfer(&self, data: &[u8]) {
        let slot = self.executor.slot();
        let armed = slot.armed_channel();
        if slot.complete(data) {
            trace!(channel = ?armed, len = data.len(), "completed transfer");
        } else {
            self.executor.stats().record_dropped_completion();
            counter!(metric_defs::IPI_DROPPED_COMPLETIONS).increment(1);
            warn!(len = data.len(), "dropped transfer: nothing waiting for acknowledgement");
        }
    }

    fn deliver_notify(&self, data: &[u8]) {
        // Clone out of the lock so the callback may re-register.
        let callback = self.notify.read().clone();
        match callback {
            Some(callback) => callback(data),
            None => trace!(len = data.len(), "notification with no consumer"),
        }
    }
}

fn run_worker(shared: Arc<Shared>, commands: Receiver<WorkerCommand>) {
    debug!("dispatch worker started");
    loop {
        match commands.recv() {
            Ok(WorkerCommand::Dispatch) => {
                shared.queue.dispatch(&shared.executor);
            }
            Ok(WorkerCommand::Stop) => {
                // Drain whatever was accepted before the queue closed.
                shared.queue.dispatch(&shared.executor);
                break;
            }
            Err(_) => break,
        }
    }
    debug!("dispatch worker stopped");
}

/// Builder for a [`Transport`].
pub struct TransportBuilder {
    mailbox: Arc<dyn Mailbox>,
    config: TransportConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl TransportBuilder {
    /// Use `config` instead of the defaults.
    pub fn config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `sleeper` for busy backoff.
    pub fn sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Validate the configuration, start the dispatch worker and bind the
    /// inbound channels.
    ///
    /// A channel the mailbox refuses to bind is logged and skipped; the
    /// transport still starts.
    pub fn start(self) -> Result<Transport, StartError> {
        self.config.validate()?;
        shub_metrics::describe_metrics();

        let (queue, commands) = MessageQueue::new();
        let executor = Executor::new(self.mailbox, &self.config, self.sleeper);
        let shared = Arc::new(Shared {
            config: self.config,
            executor,
            queue,
            notify: RwLock::new(None),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("ipi-dispatch".into())
            .spawn(move || run_worker(worker_shared, commands))
            .map_err(StartError::Spawn)?;

        let channels = shared.config.channels;
        for channel in [channels.ctrl_in, channels.notify_in] {
            let weak: Weak<Shared> = Arc::downgrade(&shared);
            let handler: InboundHandler = Arc::new(move |channel: ChannelId, data: &[u8]| {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_inbound(channel, data);
                }
            });
            if let Err(status) = shared.executor.mailbox().register(channel, handler) {
                warn!(%channel, status, "failed to bind inbound channel");
            }
        }

        info!(
            ctrl_out = %channels.ctrl_out,
            notify_out = %channels.notify_out,
            ctrl_in = %channels.ctrl_in,
            notify_in = %channels.notify_in,
            "transport started"
        );

        Ok(Transport {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }
}

/// Message transport over a single-transfer mailbox.
///
/// Any number of threads may submit work. Messages complete in submission
/// order and only one transfer is ever outstanding on the hardware.
///
/// ```no_run
/// # use std::sync::Arc;
/// # fn demo(mailbox: Arc<dyn shub_ipi::Mailbox>) -> Result<(), Box<dyn std::error::Error>> {
/// use shub_ipi::{Transport, TransportConfig};
///
/// let transport = Transport::builder(mailbox)
///     .config(TransportConfig::default())
///     .start()?;
///
/// let mut ack = [0u8; 8];
/// transport.submit_sync(transport.ctrl_channel(), &[0x01, 0x02, 0x03, 0x04], &mut ack)?;
/// transport.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct Transport {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Transport {
    /// Start building a transport on `mailbox`.
    pub fn builder(mailbox: Arc<dyn Mailbox>) -> TransportBuilder {
        TransportBuilder {
            mailbox,
            config: TransportConfig::default(),
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Send `tx` on `channel`, wait for an acknowledgement of exactly
    /// `rx.len()` bytes and copy it into `rx`.
    ///
    /// Blocks the calling thread only. On a length mismatch `rx` holds
    /// whatever prefix was received.
    pub fn submit_sync(&self, channel: ChannelId, tx: &[u8], rx: &mut [u8]) -> IpiResult<()> {
        let transfer = Transfer::new(channel, Bytes::copy_from_slice(tx), rx.len());
        let message = self.transfer_sync(Message::single(transfer))?;
        if let Some(transfer) = message.transfers().first() {
            let received = transfer.rx();
            rx[..received.len()].copy_from_slice(received);
        }
        message.status().clone()
    }

    /// Run `message` and block until it completes.
    ///
    /// Any completion callback already set on `message` is replaced. The
    /// returned message carries the final status and the received bytes.
    /// Fails with [`IpiError::Reentrant`] when called from a completion
    /// callback, since the caller would wait on the pass it is running in.
    pub fn transfer_sync(&self, message: Message) -> IpiResult<Message> {
        if queue::in_dispatch() {
            return Err(IpiError::Reentrant);
        }

        let (done_tx, done_rx) = bounded(1);
        let message = message.on_complete(move |message| {
            let _ = done_tx.send(message);
        });
        self.shared.queue.enqueue(message)?;

        // Run a pass here instead of waiting for the worker to wake up.
        self.shared.queue.dispatch(&self.shared.executor);

        done_rx.recv().map_err(|_| IpiError::ShutDown)
    }

    /// Queue `message` and return. Its completion callback runs later on the
    /// dispatching thread, never from inside this call.
    ///
    /// After shutdown the message is dropped without its callback running.
    pub fn submit_async(&self, message: Message) -> IpiResult<()> {
        self.shared.queue.enqueue(message)
    }

    /// Send `tx` on `channel` without queuing and without waiting for an
    /// acknowledgement. Busy retry still applies.
    pub fn send_noack(&self, channel: ChannelId, tx: &[u8]) -> IpiResult<()> {
        if self.shared.queue.is_closed() {
            return Err(IpiError::ShutDown);
        }
        self.shared.executor.send(channel, tx)
    }

    /// Install the notification consumer, replacing any previous one.
    pub fn register_notify<F>(&self, callback: F)
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        *self.shared.notify.write() = Some(Arc::new(callback));
    }

    /// Remove the notification consumer.
    pub fn unregister_notify(&self) {
        *self.shared.notify.write() = None;
    }

    /// Route an inbound payload as if the mailbox had delivered it on
    /// `channel`.
    #[cfg(any(test, feature = "sim"))]
    pub fn handle_inbound(&self, channel: ChannelId, data: &[u8]) {
        self.shared.handle_inbound(channel, data);
    }

    /// Outbound control channel.
    pub fn ctrl_channel(&self) -> ChannelId {
        self.shared.config.channels.ctrl_out
    }

    /// Outbound notify channel.
    pub fn notify_channel(&self) -> ChannelId {
        self.shared.config.channels.notify_out
    }

    pub fn config(&self) -> &TransportConfig {
        &self.shared.config
    }

    /// Messages waiting to be dispatched.
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Whether a transfer is waiting for its acknowledgement right now.
    pub fn transfer_in_flight(&self) -> bool {
        self.shared.executor.slot().is_armed()
    }

    pub fn stats(&self) -> TransportStats {
        self.shared.executor.stats().snapshot()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.queue.is_closed()
    }

    /// Stop accepting work, drain the queue, stop the worker and unbind the
    /// inbound channels. Calling it again does nothing.
    ///
    /// Waits for a dispatch pass running on a submitter's thread as well as
    /// for the worker. From inside a completion callback nothing is waited
    /// for, and the running pass finishes on its own.
    pub fn shutdown(&self) {
        if !self.shared.queue.close() {
            return;
        }
        debug!("transport shutting down");
        self.shared.queue.stop_worker();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if worker.thread().id() == thread::current().id() {
                // Called from a completion callback; the worker exits on its
                // own once the callback returns.
                debug!("shutdown requested from the dispatch worker");
            } else if worker.join().is_err() {
                error!("dispatch worker panicked");
            }
        }

        // A submitter may still hold the pass the worker skipped. Its
        // messages need the inbound channels until they finish.
        self.shared.queue.drain(&self.shared.executor);

        let channels = self.shared.config.channels;
        let mailbox = self.shared.executor.mailbox();
        mailbox.unregister(channels.ctrl_in);
        mailbox.unregister(channels.notify_in);
        self.unregister_notify();
        info!("transport shut down");
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("config", &self.shared.config)
            .field("queue_len", &self.queue_len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
