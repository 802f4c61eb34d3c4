//! Scheduler façade and worker loop.
//!
//! The [`Scheduler`] owns the scratch arena and the per-cycle job list,
//! spawns the fixed worker pool, and exposes the graph-building and
//! synchronisation surface: job construction, dependency wiring, `kick`,
//! waiting, pause, and stop.
//!
//! # Design
//!
//! - **Reference-counted topological release**: each job carries the count
//!   of its unresolved prerequisites; a completing job walks its dependent
//!   edges and decrements each waiter, enqueueing those that reach zero.
//! - **One completion condvar**: workers broadcast a scheduler-wide signal
//!   after any job finishes; waiters re-check their predicate. This bounds
//!   the primitive count at the cost of spurious wakeups.
//! - **Compile-time reset discipline**: `reset` takes `&mut self`, so no
//!   [`JobRef`] or arena borrow can survive into the next cycle.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use crate::arena::ScratchArena;
use crate::config::SchedulerConfig;
use crate::counter::{Counter, CounterShared};

use super::error::SchedulerError;
use super::job::{DependentEdge, Job, JobFn, JobPtr, JobRef};
use super::ready_queue::{Popped, ReadyQueue};

/// State shared between the façade and the worker threads.
struct Shared {
    queue: ReadyQueue,
    /// Paired with `done`: workers broadcast after any job completes.
    done_lock: Mutex<()>,
    done: Condvar,
    /// Jobs kicked but not yet completed; used to validate `reset`.
    outstanding: AtomicUsize,
}

impl Shared {
    /// Wakes every thread blocked on the completion signal.
    fn broadcast_done(&self) {
        drop(self.done_lock.lock());
        self.done.notify_all();
    }
}

/// Job scheduler with a fixed worker pool and a per-cycle scratch arena.
///
/// See the [crate documentation](crate) for an overview and examples. The
/// scheduler is built and waited on from a single host thread; worker
/// threads only ever touch the shared execution state.
pub struct Scheduler {
    shared: Arc<Shared>,
    arena: ScratchArena,
    /// Jobs created since the last `kick`.
    staged: RefCell<Vec<JobPtr>>,
    workers: Vec<JoinHandle<()>>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Spawns `config.worker_count` workers and preallocates the scratch
    /// arena.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] if the configuration fails
    /// validation.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let shared = Arc::new(Shared {
            queue: ReadyQueue::new(),
            done_lock: Mutex::new(()),
            done: Condvar::new(),
            outstanding: AtomicUsize::new(0),
        });

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            workers.push(spawn_worker(
                worker_id,
                Arc::clone(&shared),
                config.thread_stack_size,
            ));
        }

        info!(
            worker_count = config.worker_count,
            scratch_capacity = config.scratch_capacity,
            "scheduler initialized"
        );

        Ok(Self {
            shared,
            arena: ScratchArena::with_capacity(config.scratch_capacity),
            staged: RefCell::new(Vec::new()),
            workers,
            config,
        })
    }

    /// The configuration this scheduler was built with.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The scratch arena backing this scheduler's current cycle.
    #[must_use]
    pub fn scratch(&self) -> &ScratchArena {
        &self.arena
    }

    /// The host's suggested parallelism (CPU count).
    #[must_use]
    pub fn max_threads() -> u32 {
        u32::try_from(num_cpus::get()).unwrap_or(u32::MAX)
    }

    /// Rewinds the scratch arena and clears per-cycle state.
    ///
    /// Taking `&mut self` statically guarantees that no [`JobRef`] or arena
    /// borrow from the previous cycle survives. The queue must already be
    /// drained (debug-asserted); workers still retiring their last
    /// completion are waited for, so the rewind never races a record walk.
    pub fn reset(&mut self) {
        debug_assert!(
            !self.shared.queue.is_running() || self.shared.queue.is_empty(),
            "reset with jobs still queued"
        );
        if self.shared.queue.is_running() {
            let mut guard = self.shared.done_lock.lock();
            while self.shared.outstanding.load(Ordering::Acquire) != 0 {
                self.shared.done.wait(&mut guard);
            }
        }
        self.staged.get_mut().clear();
        self.arena.reset();
    }

    /// Moves `value` into the scratch arena for the current cycle.
    ///
    /// The value is never dropped; the memory is reclaimed by
    /// [`reset`](Self::reset).
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ScratchExhausted`] if the arena is full.
    pub fn alloc<T>(&self, value: T) -> Result<&mut T, SchedulerError> {
        self.arena.alloc(value)
    }

    /// Allocates a default-initialised slice in the scratch arena, aligned
    /// to at least `align` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ScratchExhausted`] if the arena is full.
    pub fn alloc_slice<T: Default>(
        &self,
        count: usize,
        align: usize,
    ) -> Result<&mut [T], SchedulerError> {
        self.arena.alloc_slice(count, align)
    }

    /// Creates a job that will invoke `func` with `data` once every
    /// prerequisite declared via [`depend`](Self::depend) has finished.
    ///
    /// `data` is opaque to the scheduler and is not dereferenced by it; the
    /// job body owns that contract, including keeping the pointee alive
    /// until the job has finished. Binding a `counter` increments it now and
    /// decrements it after the job completes.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ScratchExhausted`] if the arena is full, or
    /// [`SchedulerError::Stopped`] after `set_running(false)`.
    pub fn create_job(
        &self,
        func: JobFn,
        data: *mut (),
        counter: Option<&Counter>,
    ) -> Result<JobRef<'_>, SchedulerError> {
        self.create_record(Some(func), data, counter)
    }

    /// Creates a job with no callable, used purely to aggregate fan-in.
    ///
    /// When `parent` is given, the new group is wired as one of its
    /// prerequisites, so the parent cannot run until the group (and
    /// therefore everything the group waits on) has finished.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ScratchExhausted`] if the arena is full, or
    /// [`SchedulerError::Stopped`] after `set_running(false)`.
    pub fn create_group<'s>(
        &'s self,
        parent: Option<JobRef<'s>>,
    ) -> Result<JobRef<'s>, SchedulerError> {
        let group = self.create_record(None, ptr::null_mut(), None)?;
        if let Some(parent) = parent {
            self.depend(parent, group)?;
        }
        Ok(group)
    }

    fn create_record(
        &self,
        func: Option<JobFn>,
        data: *mut (),
        counter: Option<&Counter>,
    ) -> Result<JobRef<'_>, SchedulerError> {
        if !self.shared.queue.is_running() {
            return Err(SchedulerError::Stopped);
        }

        let slot = self
            .arena
            .alloc_raw(mem::size_of::<Job>(), mem::align_of::<Job>())?
            .cast::<Job>();

        // Bind after the allocation succeeded so a full arena cannot leave a
        // stray increment behind. The raw Arc reference is released by the
        // worker that completes the job.
        let bound = match counter {
            Some(counter) => {
                counter.increment();
                Arc::into_raw(Arc::clone(counter.shared()))
            }
            None => ptr::null::<CounterShared>(),
        };

        // Safety: `slot` is a fresh, exclusive, properly aligned region.
        unsafe { slot.as_ptr().write(Job::new(func, data, bound)) };

        self.staged.borrow_mut().push(JobPtr(slot));
        Ok(JobRef::from_ptr(slot))
    }

    /// Declares that `waiter` cannot run until `prereq` has finished.
    ///
    /// Must be called before the jobs are kicked. The edge record lives in
    /// the scratch arena, so wiring a graph performs no heap allocation.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ScratchExhausted`] if the arena is full.
    pub fn depend<'s>(
        &'s self,
        waiter: JobRef<'s>,
        prereq: JobRef<'s>,
    ) -> Result<(), SchedulerError> {
        debug_assert!(
            !waiter.is_finished() && !prereq.is_finished(),
            "dependencies must be declared before the jobs run"
        );
        let edge = self.arena.alloc(DependentEdge {
            waiter: waiter.ptr(),
            next: ptr::null_mut(),
        })?;
        // Safety: the handle brand guarantees both records are live.
        let prereq_job = unsafe { prereq.ptr().as_ref() };
        unsafe { waiter.ptr().as_ref() }.add_pending();
        prereq_job.link_dependent(NonNull::from(edge));
        Ok(())
    }

    /// Seeds the ready queue with every staged job whose prerequisite count
    /// is zero and wakes the workers.
    ///
    /// Jobs with unresolved prerequisites enter the queue later, released by
    /// the completion of the jobs they wait on. Calling `kick` again after
    /// creating more jobs is allowed; each call drains only the jobs created
    /// since the previous one.
    pub fn kick(&self) {
        let mut staged = self.staged.borrow_mut();
        if staged.is_empty() {
            return;
        }
        let total = staged.len();
        self.shared.outstanding.fetch_add(total, Ordering::AcqRel);
        let ready = self.shared.queue.push_batch(
            staged
                .drain(..)
                // Safety: staged records live in the arena.
                .filter(|job| unsafe { job.0.as_ref() }.is_ready()),
        );
        drop(staged);
        debug!(total, ready, "kicked job graph");
    }

    /// Blocks until `job` has finished.
    ///
    /// Wakes on the scheduler-wide completion broadcast and re-checks the
    /// flag. Also returns if the scheduler stops, since a queued job may be
    /// discarded at stop and would then never finish.
    pub fn wait(&self, job: JobRef<'_>) {
        if job.is_finished() {
            return;
        }
        let mut guard = self.shared.done_lock.lock();
        while !job.is_finished() {
            if !self.shared.queue.is_running() {
                return;
            }
            self.shared.done.wait(&mut guard);
        }
    }

    /// Blocks until `counter` observes zero.
    ///
    /// Equivalent to [`Counter::wait_zero`]; provided so cycle code can stay
    /// on the scheduler surface.
    pub fn wait_counter(&self, counter: &Counter) {
        counter.wait_zero();
    }

    /// Gates worker progress. While paused, in-flight jobs run to
    /// completion but no new job is handed out.
    pub fn set_paused(&self, paused: bool) {
        debug!(paused, "scheduler pause toggled");
        self.shared.queue.set_paused(paused);
    }

    /// `false` requests an orderly drain: in-flight jobs complete, queued
    /// but unstarted jobs are discarded, and workers exit their loop.
    ///
    /// A stopped scheduler cannot be restarted; passing `true` is a no-op
    /// kept for symmetric call sites.
    pub fn set_running(&self, running: bool) {
        if running {
            debug_assert!(
                self.shared.queue.is_running(),
                "a stopped scheduler cannot be restarted"
            );
            return;
        }
        if !self.shared.queue.is_running() {
            return;
        }
        let discarded = self.shared.queue.stop();
        if discarded > 0 {
            self.shared.outstanding.fetch_sub(discarded, Ordering::AcqRel);
        }
        // Unblock waiters parked on jobs that will never finish.
        self.shared.broadcast_done();
        info!(discarded, "scheduler stopping; in-flight jobs drain");
    }

    /// Puts the calling thread to sleep for `ms` milliseconds.
    pub fn sleep(&self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }

    /// Creates one job per element of `items`, kicks them, and blocks until
    /// all have run. Each job receives the address of its element directly;
    /// nothing is copied.
    ///
    /// Because the call blocks until every element has been processed,
    /// borrowed data and capturing closures are sound here: the jobs cannot
    /// outlive the borrow.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ScratchExhausted`] if the arena cannot hold
    /// the per-element slots, or [`SchedulerError::Stopped`] after
    /// `set_running(false)`.
    pub fn parallel_for<T, F>(&self, items: &mut [T], func: F) -> Result<(), SchedulerError>
    where
        T: Send,
        F: Fn(&mut T) + Sync,
    {
        if items.is_empty() {
            return Ok(());
        }
        let counter = Counter::new();
        let func_ptr: *const F = &func;
        for item in items.iter_mut() {
            let slot = self.arena.alloc(ForSlot {
                item: ptr::from_mut(item),
                func: func_ptr,
                _marker: PhantomData,
            })?;
            self.create_job(
                invoke_for_slot::<T, F>,
                ptr::from_mut(slot).cast::<()>(),
                Some(&counter),
            )?;
        }
        self.kick();
        counter.wait_zero();
        Ok(())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.set_running(false);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("worker thread panicked during shutdown");
            }
        }
        debug!("scheduler shut down; all workers joined");
    }
}

/// Per-element dispatch record for [`Scheduler::parallel_for`]. Both
/// pointers reference stack or slice memory that the blocking call keeps
/// alive until every job has completed.
struct ForSlot<T, F> {
    item: *mut T,
    func: *const F,
    _marker: PhantomData<fn(&mut T)>,
}

fn invoke_for_slot<T, F: Fn(&mut T)>(data: *mut ()) {
    // Safety: `data` is a ForSlot created by the parallel_for call that is
    // still blocked waiting for this job; slot, element, and closure are all
    // alive, and each element is visited by exactly one job.
    unsafe {
        let slot = &*data.cast::<ForSlot<T, F>>();
        (*slot.func)(&mut *slot.item);
    }
}

fn spawn_worker(worker_id: usize, shared: Arc<Shared>, stack_size: usize) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("jobgraph-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id, "worker thread started");
            loop {
                let job = match shared.queue.pop() {
                    Popped::Job(job) => job,
                    Popped::Stopped => break,
                };
                // Safety: job records live in the scheduler arena, which is
                // neither rewound nor freed while jobs are outstanding - the
                // façade joins workers in Drop before the arena goes away.
                let job = unsafe { job.0.as_ref() };
                run_job(worker_id, job, &shared);
            }
            debug!(worker_id, "worker thread exiting");
        })
        .expect("failed to spawn worker thread")
}

/// Executes one job and performs its completion protocol: mark finished,
/// release dependents whose prerequisite count reaches zero, retire the
/// bound counter, and broadcast the completion signal.
fn run_job(worker_id: usize, job: &Job, shared: &Shared) {
    if let Some(func) = job.func() {
        let body = AssertUnwindSafe(|| func(job.data()));
        if panic::catch_unwind(body).is_err() {
            error!(worker_id, "job body panicked; marking finished anyway");
        }
    }

    // The release store pairs with acquire loads in waiters and dependents:
    // every write made by the job body is visible to whoever observes the
    // flag, and to every dependent released below.
    job.mark_finished();

    for waiter in job.dependents() {
        // Safety: dependent records live in the same arena.
        let waiter_job = unsafe { waiter.as_ref() };
        if waiter_job.complete_prerequisite() {
            shared.queue.push(JobPtr(waiter));
        }
    }

    let counter = job.counter();
    if !counter.is_null() {
        // Safety: the job holds one strong reference, taken at bind time in
        // create_record; this is its exactly-once release.
        unsafe {
            (*counter).release_one();
            drop(Arc::from_raw(counter));
        }
    }

    // Retired only after the record walk above: `reset` waits for this count
    // to reach zero before rewinding the arena under the workers.
    shared.outstanding.fetch_sub(1, Ordering::AcqRel);
    shared.broadcast_done();
}
