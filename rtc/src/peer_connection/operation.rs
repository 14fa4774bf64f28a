//! Serialization queue of a peer connection.
//!
//! Every call that reads or mutates negotiation state, and every
//! notification coming from the ICE, DTLS and SCTP collaborators, is turned
//! into an [`Operation`] and run on one dedicated thread, strictly in
//! submission order. An operation runs with the connection state locked and
//! may hand back a [`Completion`], which runs after the lock was released
//! and after the events raised by the operation were dispatched. Promises
//! are fulfilled from completions, so code waiting on them may re-enter the
//! peer connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, trace, warn};
use tokio::sync::mpsc;

use crate::peer_connection::event::{EventDispatcher, RTCPeerConnectionEvent};
use shared::error::{Error, Result};

pub(crate) type Completion = Box<dyn FnOnce() + Send>;

pub(crate) type Operation<S> = Box<dyn FnOnce(&mut S) -> Option<Completion> + Send>;

/// TaskState is the state an operation queue serializes access to.
pub(crate) trait TaskState: Send + 'static {
    /// take_events drains what the last operation raised
    fn take_events(&mut self) -> Vec<RTCPeerConnectionEvent>;
}

enum Message<S> {
    Run(&'static str, Operation<S>),
    Stop,
}

/// OperationSender enqueues operations. Once the queue is closed, new
/// operations are dropped without running, which rejects the promises they
/// hold with `ErrConnectionClosed`.
pub(crate) struct OperationSender<S> {
    tx: mpsc::UnboundedSender<Message<S>>,
    is_closed: Arc<AtomicBool>,
}

impl<S> Clone for OperationSender<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            is_closed: Arc::clone(&self.is_closed),
        }
    }
}

impl<S> OperationSender<S> {
    /// enqueue appends `op` and tells whether it was accepted
    pub(crate) fn enqueue<F>(&self, name: &'static str, op: F) -> bool
    where
        F: FnOnce(&mut S) -> Option<Completion> + Send + 'static,
    {
        if self.is_closed() {
            debug!("skipping {name}: connection is closed");
            return false;
        }
        trace!("enqueue {name}");
        let op: Operation<S> = Box::new(op);
        self.tx.send(Message::Run(name, op)).is_ok()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_closed(&self) {
        self.is_closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum LoopState {
    Starting,
    Running,
    Stopped,
}

#[derive(Default)]
struct Lifecycle {
    state: Mutex<Option<LoopState>>,
    cond: Condvar,
}

impl Lifecycle {
    fn set(&self, state: LoopState) {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(state);
        self.cond.notify_all();
    }

    fn wait_while(&self, state: LoopState) {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while *guard == Some(state) {
            guard = match self.cond.wait(guard) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }
}

/// Operations owns the thread draining the queue.
pub(crate) struct Operations<S> {
    sender: OperationSender<S>,
    lifecycle: Arc<Lifecycle>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// channel creates the sending side ahead of the loop, so collaborators can
/// be handed a sender before the state they feed exists.
pub(crate) fn channel<S>() -> (OperationSender<S>, OperationReceiver<S>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        OperationSender {
            tx,
            is_closed: Arc::new(AtomicBool::new(false)),
        },
        OperationReceiver { rx },
    )
}

pub(crate) struct OperationReceiver<S> {
    rx: mpsc::UnboundedReceiver<Message<S>>,
}

impl<S: TaskState> Operations<S> {
    /// start spawns the operation thread and returns once it is running.
    pub(crate) fn start(
        name: &str,
        sender: OperationSender<S>,
        receiver: OperationReceiver<S>,
        state: Arc<Mutex<S>>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Result<Self> {
        let lifecycle = Arc::new(Lifecycle::default());
        lifecycle.set(LoopState::Starting);

        let thread_lifecycle = Arc::clone(&lifecycle);
        let handle = thread::Builder::new()
            .name(format!("{name}-ops"))
            .spawn(move || {
                thread_lifecycle.set(LoopState::Running);
                run_loop(receiver, state, dispatcher);
                thread_lifecycle.set(LoopState::Stopped);
            })?;

        lifecycle.wait_while(LoopState::Starting);

        Ok(Self {
            sender,
            lifecycle,
            thread: Mutex::new(Some(handle)),
        })
    }

    pub(crate) fn sender(&self) -> &OperationSender<S> {
        &self.sender
    }

    /// is_operation_thread tells whether the caller runs inside an
    /// operation or an event handler
    pub(crate) fn is_operation_thread(&self) -> bool {
        let thread = match self.thread.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        thread
            .as_ref()
            .is_some_and(|handle| handle.thread().id() == thread::current().id())
    }

    /// stop_and_join closes the queue, lets the operations already queued
    /// drain, and blocks until the thread exited. Called from the operation
    /// thread itself, it only asks the loop to stop.
    pub(crate) fn stop_and_join(&self) -> Result<()> {
        self.sender.mark_closed();
        // the loop may already be gone
        let _ = self.sender.tx.send(Message::Stop);

        if self.is_operation_thread() {
            return Ok(());
        }
        let handle = self.thread.lock()?.take();

        if let Some(handle) = handle {
            self.lifecycle.wait_while(LoopState::Running);
            handle
                .join()
                .map_err(|_| Error::Other("operation thread panicked".to_owned()))?;
            debug!("operation thread stopped");
        }
        Ok(())
    }
}

fn run_loop<S: TaskState>(
    mut receiver: OperationReceiver<S>,
    state: Arc<Mutex<S>>,
    dispatcher: Arc<EventDispatcher>,
) {
    while let Some(msg) = receiver.rx.blocking_recv() {
        let (name, op) = match msg {
            Message::Run(name, op) => (name, op),
            Message::Stop => break,
        };

        trace!("run {name}");
        let (completion, events) = {
            let mut guard = match state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => {
                    warn!("state lock poisoned before {name}");
                    poisoned.into_inner()
                }
            };
            let completion = op(&mut *guard);
            (completion, guard.take_events())
        };

        dispatcher.dispatch(events);
        if let Some(completion) = completion {
            completion();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::peer_connection::promise;

    #[derive(Default)]
    struct Counter {
        runs: Vec<u32>,
        events: Vec<RTCPeerConnectionEvent>,
    }

    impl TaskState for Counter {
        fn take_events(&mut self) -> Vec<RTCPeerConnectionEvent> {
            std::mem::take(&mut self.events)
        }
    }

    fn start() -> Result<(Operations<Counter>, Arc<Mutex<Counter>>, Arc<EventDispatcher>)> {
        let (sender, receiver) = channel();
        let state = Arc::new(Mutex::new(Counter::default()));
        let dispatcher = Arc::new(EventDispatcher::default());
        let ops = Operations::start(
            "test",
            sender,
            receiver,
            Arc::clone(&state),
            Arc::clone(&dispatcher),
        )?;
        Ok((ops, state, dispatcher))
    }

    #[test]
    fn test_operations_run_in_order() -> Result<()> {
        let (ops, state, dispatcher) = start()?;

        let mut promises = vec![];
        for i in 0..10u32 {
            let (resolver, promise) = promise::channel();
            assert!(ops.sender().enqueue("push", move |counter: &mut Counter| {
                counter.runs.push(i);
                counter
                    .events
                    .push(RTCPeerConnectionEvent::OnTransceiverAdded(i as usize));
                Some(Box::new(move || resolver.resolve(Ok(i))))
            }));
            promises.push(promise);
        }

        for (i, promise) in promises.into_iter().enumerate() {
            assert_eq!(promise.wait()?, i as u32);
        }
        assert_eq!(state.lock()?.runs, (0..10).collect::<Vec<u32>>());
        assert_eq!(
            dispatcher.poll(),
            Some(RTCPeerConnectionEvent::OnTransceiverAdded(0))
        );

        ops.stop_and_join()
    }

    #[test]
    fn test_operations_closed_queue_rejects() -> Result<()> {
        let (ops, state, _) = start()?;
        ops.stop_and_join()?;

        let (resolver, promise) = promise::channel::<()>();
        let accepted = ops.sender().enqueue("late", move |counter: &mut Counter| {
            counter.runs.push(1);
            Some(Box::new(move || resolver.resolve(Ok(()))))
        });
        assert!(!accepted);
        assert_eq!(promise.wait(), Err(Error::ErrConnectionClosed));
        assert!(state.lock()?.runs.is_empty());

        // stopping twice is harmless
        ops.stop_and_join()
    }

    #[test]
    fn test_operations_drain_before_stop() -> Result<()> {
        let (ops, state, _) = start()?;
        for i in 0..5u32 {
            ops.sender().enqueue("push", move |counter: &mut Counter| {
                counter.runs.push(i);
                None
            });
        }
        ops.stop_and_join()?;
        assert_eq!(state.lock()?.runs.len(), 5);
        Ok(())
    }
}
