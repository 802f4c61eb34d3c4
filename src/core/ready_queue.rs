//! Ready queue: the FIFO of jobs whose prerequisites have all resolved.
//!
//! One mutex guards the FIFO together with the pause and running flags, so a
//! popping worker observes a consistent view of all three. A single condvar
//! wakes workers on push, unpause, and stop.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use super::job::JobPtr;

/// Outcome of a blocking pop.
pub(crate) enum Popped {
    /// A job to execute.
    Job(JobPtr),
    /// The scheduler stopped; the worker should exit its loop.
    Stopped,
}

struct QueueState {
    jobs: VecDeque<JobPtr>,
    paused: bool,
    running: bool,
}

pub(crate) struct ReadyQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl ReadyQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                paused: false,
                running: true,
            }),
            ready: Condvar::new(),
        }
    }

    /// Enqueues one job and wakes one idle worker.
    pub(crate) fn push(&self, job: JobPtr) {
        let mut state = self.state.lock();
        state.jobs.push_back(job);
        drop(state);
        self.ready.notify_one();
    }

    /// Enqueues a batch of jobs and wakes every idle worker. Returns the
    /// number enqueued.
    pub(crate) fn push_batch(&self, jobs: impl Iterator<Item = JobPtr>) -> usize {
        let mut state = self.state.lock();
        let before = state.jobs.len();
        state.jobs.extend(jobs);
        let pushed = state.jobs.len() - before;
        drop(state);
        if pushed > 0 {
            self.ready.notify_all();
        }
        pushed
    }

    /// Blocks until a job is available while unpaused, or the queue stops.
    pub(crate) fn pop(&self) -> Popped {
        let mut state = self.state.lock();
        loop {
            if !state.running {
                return Popped::Stopped;
            }
            if !state.paused {
                if let Some(job) = state.jobs.pop_front() {
                    return Popped::Job(job);
                }
            }
            self.ready.wait(&mut state);
        }
    }

    /// Gates job hand-out. Unpausing wakes every worker so queued jobs drain.
    pub(crate) fn set_paused(&self, paused: bool) {
        let mut state = self.state.lock();
        state.paused = paused;
        drop(state);
        if !paused {
            self.ready.notify_all();
        }
    }

    /// Stops the queue, discarding queued jobs. Returns how many were
    /// discarded. Idempotent.
    pub(crate) fn stop(&self) -> usize {
        let mut state = self.state.lock();
        state.running = false;
        let discarded = state.jobs.len();
        state.jobs.clear();
        drop(state);
        self.ready.notify_all();
        discarded
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.state.lock().jobs.is_empty()
    }
}
