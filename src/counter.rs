//! Atomic counter with wait-for-zero semantics.
//!
//! A [`Counter`] tracks how many bound jobs are still outstanding. Binding a
//! job increments it; the worker that completes the job decrements it and
//! wakes waiters when it reaches zero. The handle is cheaply cloneable, and
//! every bound job holds a strong reference to the shared state, so a worker
//! can never observe a counter that has been dropped.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Shared heart of a counter: the value plus the wait machinery.
#[derive(Default)]
pub(crate) struct CounterShared {
    value: AtomicU32,
    lock: Mutex<()>,
    zero: Condvar,
}

impl CounterShared {
    /// Registers one more outstanding completion.
    pub(crate) fn add_one(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Retires one outstanding completion, waking waiters on zero.
    ///
    /// The release half of the decrement publishes every write made by the
    /// completed job to any thread that observes the counter at zero.
    pub(crate) fn release_one(&self) {
        let prev = self.value.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "counter decremented below zero");
        if prev == 1 {
            // Take and drop the lock so a waiter between its predicate check
            // and its wait cannot miss the notification.
            drop(self.lock.lock());
            self.zero.notify_all();
        }
    }

    /// Blocks until the counter observes zero.
    pub(crate) fn wait_zero(&self) {
        if self.value.load(Ordering::Acquire) == 0 {
            return;
        }
        let mut guard = self.lock.lock();
        while self.value.load(Ordering::Acquire) != 0 {
            self.zero.wait(&mut guard);
        }
    }

    fn current(&self) -> u32 {
        self.value.load(Ordering::Acquire)
    }
}

/// Cloneable handle to an atomic completion counter.
///
/// # Examples
///
/// ```
/// use jobgraph::Counter;
///
/// let counter = Counter::new();
/// assert!(counter.is_zero());
///
/// counter.increment();
/// let worker = counter.clone();
/// std::thread::spawn(move || worker.decrement());
/// counter.wait_zero();
/// assert!(counter.is_zero());
/// ```
#[derive(Clone)]
pub struct Counter {
    shared: Arc<CounterShared>,
}

impl Counter {
    /// Creates a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(CounterShared::default()),
        }
    }

    /// Atomically increments the counter.
    pub fn increment(&self) {
        self.shared.add_one();
    }

    /// Atomically decrements the counter, waking waiters when it reaches
    /// zero.
    ///
    /// Decrementing below zero is a caller error (debug-asserted).
    pub fn decrement(&self) {
        self.shared.release_one();
    }

    /// Returns whether the counter currently observes zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.shared.current() == 0
    }

    /// Current observation of the counter value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.shared.current()
    }

    /// Blocks the calling thread until the counter observes zero.
    ///
    /// Returns immediately if it is already zero. All decrements - and thus
    /// all bound job bodies - happen-before this returns.
    pub fn wait_zero(&self) {
        self.shared.wait_zero();
    }

    /// Shared state, for binding jobs to this counter.
    pub(crate) fn shared(&self) -> &Arc<CounterShared> {
        &self.shared
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter")
            .field("value", &self.shared.current())
            .finish()
    }
}
