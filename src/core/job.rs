//! Job records and handles.
//!
//! A [`Job`] is the unit of scheduled work: an optional callable, an opaque
//! payload pointer, the count of unresolved prerequisites, an intrusive list
//! of dependents to release on completion, an optional counter binding, and
//! a finished flag. Records live in the scheduler's scratch arena and are
//! plain data - nothing is dropped when the arena rewinds.
//!
//! Hosts only ever see [`JobRef`], a `Copy` handle branded with the lifetime
//! of the scheduler borrow that created it. A handle therefore cannot outlive
//! [`Scheduler::reset`](crate::Scheduler::reset), which takes `&mut self`.

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, Ordering};

use crate::counter::CounterShared;

/// Shape of a job body: a plain function receiving the opaque user-data
/// pointer supplied at creation. No return value; failures must be captured
/// through state reachable from the pointer.
pub type JobFn = fn(*mut ());

/// One edge of the dependency graph, linking a prerequisite to a job that
/// waits on it. Edges are arena-allocated and chained intrusively off the
/// prerequisite, so wiring a graph allocates nothing on the heap.
pub(crate) struct DependentEdge {
    pub(crate) waiter: NonNull<Job>,
    pub(crate) next: *mut DependentEdge,
}

/// Arena-resident job record.
///
/// Field mutability after `kick` is confined to the atomics; `func`, `data`,
/// and the counter binding are immutable once created, and the dependent
/// list is only written by the wiring thread before `kick`.
pub(crate) struct Job {
    func: Option<JobFn>,
    data: *mut (),
    /// Unresolved prerequisites; the job is runnable iff this is zero.
    pending: AtomicU32,
    /// Head of the intrusive list of jobs waiting on this one.
    dependents: AtomicPtr<DependentEdge>,
    /// Borrowed counter state; non-null means this job holds one strong
    /// reference, released by the worker after completion.
    counter: *const CounterShared,
    finished: AtomicBool,
}

impl Job {
    pub(crate) fn new(func: Option<JobFn>, data: *mut (), counter: *const CounterShared) -> Self {
        Self {
            func,
            data,
            pending: AtomicU32::new(0),
            dependents: AtomicPtr::new(std::ptr::null_mut()),
            counter,
            finished: AtomicBool::new(false),
        }
    }

    pub(crate) fn func(&self) -> Option<JobFn> {
        self.func
    }

    pub(crate) fn data(&self) -> *mut () {
        self.data
    }

    pub(crate) fn counter(&self) -> *const CounterShared {
        self.counter
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Publishes completion. The release store pairs with the acquire load in
    /// [`is_finished`](Self::is_finished), making every write performed by
    /// the job body visible to observers of the flag.
    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.pending.load(Ordering::Acquire) == 0
    }

    /// Registers one more unresolved prerequisite.
    pub(crate) fn add_pending(&self) {
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    /// Resolves one prerequisite; returns true when this was the last one.
    pub(crate) fn complete_prerequisite(&self) -> bool {
        let prev = self.pending.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "pending count decremented below zero");
        prev == 1
    }

    /// Chains `edge` onto this job's dependent list. Wiring-thread only,
    /// before `kick`; workers read the list after the queue hand-off.
    pub(crate) fn link_dependent(&self, mut edge: NonNull<DependentEdge>) {
        // Safety: the edge was just allocated and is not yet shared.
        unsafe { edge.as_mut().next = self.dependents.load(Ordering::Relaxed) };
        self.dependents.store(edge.as_ptr(), Ordering::Relaxed);
    }

    /// Walks the dependents recorded for this job.
    pub(crate) fn dependents(&self) -> DependentIter {
        DependentIter {
            cursor: self.dependents.load(Ordering::Relaxed),
        }
    }
}

/// Iterator over a job's dependent edges.
pub(crate) struct DependentIter {
    cursor: *mut DependentEdge,
}

impl Iterator for DependentIter {
    type Item = NonNull<Job>;

    fn next(&mut self) -> Option<Self::Item> {
        // Safety: edges live in the arena, which outlives any walk performed
        // by workers while jobs are outstanding.
        let edge = unsafe { self.cursor.as_ref()? };
        self.cursor = edge.next;
        Some(edge.waiter)
    }
}

/// Raw job pointer that may cross threads inside the ready queue.
///
/// Records are shared between the wiring thread and workers; every field
/// touched after `kick` is atomic, and the arena outlives the workers.
#[derive(Clone, Copy)]
pub(crate) struct JobPtr(pub(crate) NonNull<Job>);

unsafe impl Send for JobPtr {}

/// Handle to a job created in the current cycle.
///
/// `JobRef` is `Copy` and borrows the scheduler that created it, so handles
/// cannot be used across [`Scheduler::reset`](crate::Scheduler::reset) or
/// after the scheduler is dropped.
#[derive(Clone, Copy)]
pub struct JobRef<'s> {
    ptr: NonNull<Job>,
    _scheduler: PhantomData<&'s ()>,
}

impl<'s> JobRef<'s> {
    pub(crate) fn from_ptr(ptr: NonNull<Job>) -> Self {
        Self {
            ptr,
            _scheduler: PhantomData,
        }
    }

    pub(crate) fn ptr(self) -> NonNull<Job> {
        self.ptr
    }

    /// Returns whether this job has finished executing in the current cycle.
    #[must_use]
    pub fn is_finished(self) -> bool {
        // Safety: the lifetime brand guarantees the record is still live.
        unsafe { self.ptr.as_ref() }.is_finished()
    }
}

impl fmt::Debug for JobRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRef")
            .field("finished", &self.is_finished())
            .finish()
    }
}
