//! FIFO message queue and its dispatch pass.

use std::cell::Cell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex, MutexGuard};
use shub_metrics::metric_defs;
use shub_metrics::metrics::{counter, gauge, histogram};
use tracing::{debug, error, trace, warn};

use crate::error::IpiError;
use crate::executor::Executor;
use crate::message::{Message, Transfer};

thread_local! {
    static IN_DISPATCH: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is inside a dispatch pass (and therefore
/// possibly inside a completion callback).
pub(crate) fn in_dispatch() -> bool {
    IN_DISPATCH.with(Cell::get)
}

struct DispatchMarker;

impl DispatchMarker {
    fn enter() -> Self {
        IN_DISPATCH.with(|flag| flag.set(true));
        DispatchMarker
    }
}

impl Drop for DispatchMarker {
    fn drop(&mut self) {
        IN_DISPATCH.with(|flag| flag.set(false));
    }
}

/// Instructions for the dispatch worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerCommand {
    /// Run a dispatch pass.
    Dispatch,
    /// Run a final pass and exit.
    Stop,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Message>,
    running: bool,
    closed: bool,
}

/// Pending messages plus the flag that keeps dispatch passes exclusive.
pub(crate) struct MessageQueue {
    state: Mutex<QueueState>,
    /// Signalled whenever a pass clears `running`.
    idle: Condvar,
    wake: Sender<WorkerCommand>,
}

/// Ownership of the `running` flag for one dispatch pass.
///
/// Holds the queue lock except while a message runs. Dropping it clears
/// `running` and wakes [`MessageQueue::drain`], on unwind as well.
struct Pass<'a> {
    queue: &'a MessageQueue,
    state: MutexGuard<'a, QueueState>,
    _marker: DispatchMarker,
}

impl Drop for Pass<'_> {
    fn drop(&mut self) {
        self.state.running = false;
        self.queue.idle.notify_all();
    }
}

impl MessageQueue {
    /// Create a queue and the receiving end the worker listens on.
    pub fn new() -> (Self, Receiver<WorkerCommand>) {
        let (wake, commands) = unbounded();
        let queue = MessageQueue {
            state: Mutex::new(QueueState::default()),
            idle: Condvar::new(),
            wake,
        };
        (queue, commands)
    }

    /// Append `message` and schedule a dispatch pass. Never blocks.
    pub fn enqueue(&self, message: Message) -> Result<(), IpiError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(IpiError::ShutDown);
            }
            state.pending.push_back(message);
            gauge!(metric_defs::IPI_QUEUE_DEPTH).set(state.pending.len() as f64);
        }
        // The worker may already be gone during shutdown; the final pass
        // drains whatever was accepted before the queue closed.
        let _ = self.wake.send(WorkerCommand::Dispatch);
        Ok(())
    }

    /// Stop accepting messages. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        !std::mem::replace(&mut state.closed, true)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Ask the worker to exit after a final pass.
    pub fn stop_worker(&self) {
        let _ = self.wake.send(WorkerCommand::Stop);
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Drain the queue, running every message to completion in FIFO order.
    ///
    /// Returns immediately if another pass is already running; that pass
    /// picks up anything enqueued meanwhile. The queue lock is released while
    /// transfers and callbacks run. Returns the number of messages completed.
    pub fn dispatch(&self, executor: &Executor) -> usize {
        if in_dispatch() {
            return 0;
        }

        let mut state = self.state.lock();
        if state.running {
            trace!("dispatch pass already running");
            return 0;
        }
        state.running = true;
        let mut pass = Pass {
            queue: self,
            state,
            _marker: DispatchMarker::enter(),
        };

        let mut completed = 0;
        while let Some(message) = pass.state.pending.pop_front() {
            gauge!(metric_defs::IPI_QUEUE_DEPTH).set(pass.state.pending.len() as f64);
            MutexGuard::unlocked(&mut pass.state, || run_message(executor, message));
            completed += 1;
        }

        if completed > 0 {
            debug!(completed, "dispatch pass finished");
        }
        completed
    }

    /// Block until the queue is empty and no pass is running, running the
    /// remaining messages here if nobody else will.
    ///
    /// Returns at once when called from inside a pass.
    pub fn drain(&self, executor: &Executor) {
        if in_dispatch() {
            return;
        }
        loop {
            {
                let mut state = self.state.lock();
                while state.running {
                    self.idle.wait(&mut state);
                }
                if state.pending.is_empty() {
                    return;
                }
            }
            self.dispatch(executor);
        }
    }
}

fn run_message(executor: &Executor, mut message: Message) {
    let started = Instant::now();
    let transfers = &mut message.transfers;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_transfers(executor, transfers)));
    message.status = match outcome {
        Ok(status) => status,
        Err(_) => {
            counter!(metric_defs::IPI_ABORTED_MESSAGES).increment(1);
            error!("mailbox panicked while running a message");
            Err(IpiError::Aborted)
        }
    };

    histogram!(metric_defs::IPI_MESSAGE_LATENCY)
        .record(started.elapsed().as_secs_f64() * 1_000_000.0);
    counter!(metric_defs::IPI_MESSAGES_COMPLETED).increment(1);
    executor.stats().record_message_completed();

    if let Err(err) = &message.status {
        debug!(%err, "message failed");
    }

    if panic::catch_unwind(AssertUnwindSafe(|| message.complete())).is_err() {
        error!("message completion callback panicked");
    }
}

/// Run transfers in order; the first failure ends the message.
fn run_transfers(executor: &Executor, transfers: &mut [Transfer]) -> Result<(), IpiError> {
    for transfer in transfers.iter_mut() {
        transfer.validate()?;

        if transfer.tx_len == 0 {
            // Nothing goes on the wire, so nothing comes back.
            if transfer.rx_len != 0 {
                return Err(length_mismatch(transfer, 0));
            }
            continue;
        }

        let tx = match &transfer.tx {
            Some(tx) => tx.slice(..transfer.tx_len),
            None => return Err(IpiError::InvalidArgument("tx buffer missing")),
        };
        let completion = executor.transfer(transfer.channel, &tx, transfer.rx_len)?;
        transfer.rx = completion.data;

        if completion.realized_len != transfer.rx_len {
            executor.stats().record_length_mismatch();
            return Err(length_mismatch(transfer, completion.realized_len));
        }
    }
    Ok(())
}

fn length_mismatch(transfer: &Transfer, actual: usize) -> IpiError {
    counter!(metric_defs::IPI_LENGTH_MISMATCHES, "channel" => transfer.channel.to_string())
        .increment(1);
    warn!(
        channel = %transfer.channel,
        expected = transfer.rx_len,
        actual,
        "acknowledgement length mismatch"
    );
    IpiError::LengthMismatch {
        expected: transfer.rx_len,
        actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::mailbox::{ChannelId, InboundHandler, Mailbox, SendStatus};
    use crate::retry::ThreadSleeper;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// Mailbox that accepts everything and never acknowledges.
    #[derive(Default)]
    struct CountingMailbox {
        sends: Mutex<usize>,
    }

    impl Mailbox for CountingMailbox {
        fn send(&self, _channel: ChannelId, _payload: &[u8], _slots: usize) -> SendStatus {
            *self.sends.lock() += 1;
            SendStatus::Accepted
        }

        fn register(&self, _channel: ChannelId, _handler: InboundHandler) -> Result<(), i32> {
            Ok(())
        }

        fn unregister(&self, _channel: ChannelId) {}
    }

    /// Mailbox whose first send panics.
    #[derive(Default)]
    struct PanickingMailbox {
        calls: AtomicUsize,
    }

    impl Mailbox for PanickingMailbox {
        fn send(&self, _channel: ChannelId, _payload: &[u8], _slots: usize) -> SendStatus {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("mailbox fault");
            }
            SendStatus::Accepted
        }

        fn register(&self, _channel: ChannelId, _handler: InboundHandler) -> Result<(), i32> {
            Ok(())
        }

        fn unregister(&self, _channel: ChannelId) {}
    }

    /// Mailbox that parks every send until the gate opens.
    struct GatedMailbox {
        entered: Sender<()>,
        gate: Receiver<()>,
    }

    impl Mailbox for GatedMailbox {
        fn send(&self, _channel: ChannelId, _payload: &[u8], _slots: usize) -> SendStatus {
            let _ = self.entered.send(());
            let _ = self.gate.recv();
            SendStatus::Accepted
        }

        fn register(&self, _channel: ChannelId, _handler: InboundHandler) -> Result<(), i32> {
            Ok(())
        }

        fn unregister(&self, _channel: ChannelId) {}
    }

    fn executor_on(mailbox: Arc<dyn Mailbox>) -> Executor {
        let config = TransportConfig {
            completion_timeout_ms: 5,
            ..TransportConfig::default()
        };
        Executor::new(mailbox, &config, Arc::new(ThreadSleeper))
    }

    fn setup() -> (MessageQueue, Executor, Arc<CountingMailbox>) {
        let mailbox = Arc::new(CountingMailbox::default());
        let executor = executor_on(mailbox.clone());
        let (queue, _commands) = MessageQueue::new();
        (queue, executor, mailbox)
    }

    fn recording(order: &Arc<Mutex<Vec<(usize, Result<(), IpiError>)>>>, id: usize) -> impl FnOnce(Message) + Send + 'static {
        let order = order.clone();
        move |m: Message| order.lock().push((id, m.status().clone()))
    }

    #[test]
    fn test_dispatch_runs_in_fifo_order() {
        let (queue, executor, _mailbox) = setup();
        let order = Arc::new(Mutex::new(Vec::new()));
        for id in 0..5 {
            let message = Message::single(Transfer::from_parts(ChannelId(2), None, 0, 0))
                .on_complete(recording(&order, id));
            queue.enqueue(message).unwrap();
        }
        assert_eq!(queue.len(), 5);
        assert_eq!(queue.dispatch(&executor), 5);
        assert_eq!(queue.len(), 0);
        let ids: Vec<usize> = order.lock().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert!(order.lock().iter().all(|(_, status)| status.is_ok()));
    }

    #[test]
    fn test_missing_tx_never_reaches_mailbox() {
        let (queue, executor, mailbox) = setup();
        let order = Arc::new(Mutex::new(Vec::new()));
        let message = Message::single(Transfer::from_parts(ChannelId(2), None, 4, 0))
            .on_complete(recording(&order, 0));
        queue.enqueue(message).unwrap();
        queue.dispatch(&executor);
        assert_eq!(*mailbox.sends.lock(), 0);
        assert!(matches!(order.lock()[0].1, Err(IpiError::InvalidArgument(_))));
    }

    #[test]
    fn test_zero_tx_with_rx_is_length_mismatch() {
        let (queue, executor, mailbox) = setup();
        let order = Arc::new(Mutex::new(Vec::new()));
        let message = Message::single(Transfer::from_parts(ChannelId(2), None, 0, 4))
            .on_complete(recording(&order, 0));
        queue.enqueue(message).unwrap();
        queue.dispatch(&executor);
        assert_eq!(*mailbox.sends.lock(), 0);
        assert_eq!(
            order.lock()[0].1,
            Err(IpiError::LengthMismatch { expected: 4, actual: 0 })
        );
    }

    #[test]
    fn test_failure_short_circuits_message_not_queue() {
        let (queue, executor, mailbox) = setup();
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = Message::new()
            .with_transfer(Transfer::new(ChannelId(2), vec![1u8, 2, 3, 4], 8))
            .with_transfer(Transfer::new(ChannelId(2), vec![5u8, 6, 7, 8], 8))
            .on_complete(recording(&order, 0));
        let second = Message::single(Transfer::from_parts(ChannelId(2), None, 0, 0))
            .on_complete(recording(&order, 1));
        queue.enqueue(first).unwrap();
        queue.enqueue(second).unwrap();
        assert_eq!(queue.dispatch(&executor), 2);

        // The first transfer timed out; the second was never sent.
        assert_eq!(*mailbox.sends.lock(), 1);
        let order = order.lock();
        assert!(matches!(order[0].1, Err(IpiError::Timeout { .. })));
        assert_eq!(order[1].1, Ok(()));
    }

    #[test]
    fn test_panicking_callback_keeps_queue_usable() {
        let (queue, executor, _mailbox) = setup();
        let order = Arc::new(Mutex::new(Vec::new()));
        queue
            .enqueue(Message::new().on_complete(|_| panic!("callback failure")))
            .unwrap();
        queue
            .enqueue(Message::new().on_complete(recording(&order, 1)))
            .unwrap();
        assert_eq!(queue.dispatch(&executor), 2);
        assert_eq!(order.lock().len(), 1);
        assert_eq!(queue.dispatch(&executor), 0);
    }

    #[test]
    fn test_panicking_mailbox_fails_message_and_releases_pass() {
        let executor = executor_on(Arc::new(PanickingMailbox::default()));
        let (queue, _commands) = MessageQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        queue
            .enqueue(
                Message::single(Transfer::new(ChannelId(2), vec![1u8, 2, 3, 4], 0))
                    .on_complete(recording(&order, 0)),
            )
            .unwrap();
        queue
            .enqueue(Message::new().on_complete(recording(&order, 1)))
            .unwrap();

        assert_eq!(queue.dispatch(&executor), 2);
        assert!(!executor.slot().is_armed());
        assert_eq!(order.lock()[0].1, Err(IpiError::Aborted));
        assert_eq!(order.lock()[1].1, Ok(()));

        // The running flag was released, so a later pass still runs.
        queue
            .enqueue(Message::new().on_complete(recording(&order, 2)))
            .unwrap();
        assert_eq!(queue.dispatch(&executor), 1);
        assert_eq!(order.lock().len(), 3);
    }

    #[test]
    fn test_drain_waits_for_pass_held_elsewhere() {
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        let executor = executor_on(Arc::new(GatedMailbox {
            entered: entered_tx,
            gate: gate_rx,
        }));
        let (queue, _commands) = MessageQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        queue
            .enqueue(
                Message::single(Transfer::new(ChannelId(2), vec![1u8, 2, 3, 4], 0))
                    .on_complete(recording(&order, 0)),
            )
            .unwrap();

        thread::scope(|scope| {
            let holder = scope.spawn(|| queue.dispatch(&executor));
            entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
            for id in 1..3 {
                queue
                    .enqueue(Message::new().on_complete(recording(&order, id)))
                    .unwrap();
            }

            let drainer = scope.spawn(|| queue.drain(&executor));
            thread::sleep(Duration::from_millis(20));
            assert!(!drainer.is_finished());

            gate_tx.send(()).unwrap();
            drainer.join().unwrap();
            assert_eq!(queue.len(), 0);
            assert_eq!(order.lock().len(), 3);
            assert_eq!(holder.join().unwrap(), 3);
        });
    }

    #[test]
    fn test_closed_queue_rejects() {
        let (queue, _executor, _mailbox) = setup();
        assert!(queue.close());
        assert!(!queue.close());
        assert!(queue.is_closed());
        assert_eq!(queue.enqueue(Message::new()), Err(IpiError::ShutDown));
    }
}
