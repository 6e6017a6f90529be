//! Streaming handoff between a listing worker and its consumer.
//!
//! Enumeration walks the repository on a dedicated producer thread and hands
//! names to the consumer one at a time through a rendezvous channel. Nothing
//! beyond the single in-flight name is buffered, the consumer drains at its
//! own pace, and cancellation is cooperative: the producer checks a shared
//! flag between pushes and stops as soon as it is raised or the consumer
//! goes away.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Cooperative cancellation signal for a streaming listing.
///
/// Clones share the same flag. Raising the signal terminates the listing at
/// the next handoff; there is no timeout primitive, callers impose timeouts
/// by cancelling themselves.
#[derive(Clone, Debug, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// A fresh, unraised signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether the signal has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Producer-side handle for pushing names into a [`NameStream`].
pub(crate) struct NameSink {
    tx: SyncSender<String>,
    cancel: Cancellation,
}

impl NameSink {
    /// Hand one name to the consumer, blocking until it is taken.
    ///
    /// Returns `false` once the listing is cancelled or the consumer has
    /// gone away; the producer must stop immediately.
    pub(crate) fn push(&self, name: String) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(name).is_ok()
    }
}

/// Pull-based stream of object names produced by a background worker.
///
/// The worker parks on a zero-capacity channel until the consumer takes the
/// next name. Dropping the stream (or raising its [`Cancellation`]) unblocks
/// the worker; the worker thread is joined before the drop returns, so a
/// finished stream never leaks a thread.
pub struct NameStream {
    rx: Option<Receiver<String>>,
    cancel: Cancellation,
    worker: Option<JoinHandle<()>>,
}

impl NameStream {
    /// Spawn a producer thread feeding a new stream.
    pub(crate) fn spawn<F>(cancel: Cancellation, produce: F) -> Self
    where
        F: FnOnce(&NameSink) + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(0);
        let sink = NameSink {
            tx,
            cancel: cancel.clone(),
        };
        let worker = thread::spawn(move || produce(&sink));
        Self {
            rx: Some(rx),
            cancel,
            worker: Some(worker),
        }
    }

    /// Drop the receiver first so a producer parked on the full slot is
    /// unblocked, then join the worker.
    fn shutdown(&mut self) {
        self.rx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Iterator for NameStream {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.cancel.is_cancelled() {
            self.shutdown();
            return None;
        }
        match self.rx.as_ref()?.recv() {
            Ok(name) => Some(name),
            Err(_) => {
                self.shutdown();
                None
            }
        }
    }
}

impl Drop for NameStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}
