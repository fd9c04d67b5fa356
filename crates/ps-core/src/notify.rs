//! Ordered, asynchronous fan-out of update events.
//!
//! A [`ListenerNotifier`] delivers every notification batch on one
//! sequential worker thread, so listeners registered earlier always hear
//! about a batch before listeners registered later. The worker is created
//! lazily on the first notification and retires once its queue drains;
//! retirement and the next spawn check are serialized by the same lock
//! that guards the listener list, so no batch can be lost to that race.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::warn;

/// Observer of key/value update events.
pub trait UpdateListener: Send + Sync {
    /// Called once per notification batch, on the notifier's worker thread.
    fn on_update(&self, source: &str, key: &str, value: &str);
}

/// One unit of fan-out: a key/value pair plus the listeners registered at
/// the time `notify` was called.
struct Batch {
    source: Arc<str>,
    key: String,
    value: String,
    listeners: Vec<Arc<dyn UpdateListener>>,
}

struct NotifierState {
    listeners: Vec<Arc<dyn UpdateListener>>,
    /// Send half of the live worker's queue, `None` while idle.
    worker: Option<Sender<Batch>>,
}

/// Ordered asynchronous event fan-out with a lazily managed worker thread.
pub struct ListenerNotifier {
    source: Arc<str>,
    state: Arc<Mutex<NotifierState>>,
}

impl ListenerNotifier {
    /// `source` identifies the notifying component to listeners.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into().into(),
            state: Arc::new(Mutex::new(NotifierState {
                listeners: Vec::new(),
                worker: None,
            })),
        }
    }

    /// Register a listener. Returns `false` if the same listener (by
    /// pointer identity) is already registered.
    pub fn register(&self, listener: Arc<dyn UpdateListener>) -> bool {
        let mut state = self.state.lock();
        if state.listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }
        state.listeners.push(listener);
        true
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unregister(&self, listener: &Arc<dyn UpdateListener>) -> bool {
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|l| !Arc::ptr_eq(l, listener));
        state.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Queue one batch for every currently registered listener.
    ///
    /// Within the batch, callbacks run in registration order on the worker
    /// thread. No ordering holds between batches queued by concurrent
    /// callers.
    pub fn notify(&self, key: &str, value: &str) {
        let mut state = self.state.lock();
        if state.listeners.is_empty() {
            return;
        }
        let batch = Batch {
            source: self.source.clone(),
            key: key.to_string(),
            value: value.to_string(),
            listeners: state.listeners.clone(),
        };
        // The worker only clears its slot under this lock, so a `Some`
        // sender here is guaranteed to reach a live queue.
        let batch = match &state.worker {
            Some(sender) => match sender.send(batch) {
                Ok(()) => return,
                Err(returned) => returned.0,
            },
            None => batch,
        };
        let (sender, receiver) = mpsc::channel();
        sender.send(batch).ok();
        state.worker = Some(sender);
        let shared = Arc::clone(&self.state);
        thread::spawn(move || run_worker(shared, receiver));
    }
}

/// Drain the queue, retiring when it is empty.
fn run_worker(shared: Arc<Mutex<NotifierState>>, receiver: Receiver<Batch>) {
    loop {
        match receiver.try_recv() {
            Ok(batch) => deliver(&batch),
            Err(TryRecvError::Empty) => {
                // Re-check under the notifier lock before retiring, so a
                // racing `notify` either lands on this queue or sees the
                // slot already cleared and spawns a fresh worker.
                let mut state = shared.lock();
                match receiver.try_recv() {
                    Ok(batch) => {
                        drop(state);
                        deliver(&batch);
                    }
                    Err(_) => {
                        state.worker = None;
                        return;
                    }
                }
            }
            Err(TryRecvError::Disconnected) => return,
        }
    }
}

fn deliver(batch: &Batch) {
    for listener in &batch.listeners {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            listener.on_update(&batch.source, &batch.key, &batch.value);
        }));
        if result.is_err() {
            warn!(
                source = %batch.source,
                key = %batch.key,
                "listener panicked during notification; continuing with remaining listeners"
            );
        }
    }
}
