//! # jobgraph
//!
//! A lightweight, embeddable job scheduler for frame-driven hosts.
//!
//! `jobgraph` executes many short-lived jobs across a fixed pool of worker
//! threads. Jobs may declare explicit dependencies on one another, forming an
//! arbitrary DAG; a job becomes runnable once every prerequisite has finished.
//! Job records and caller payloads live in a bump-allocated scratch arena that
//! is rewound between cycles, so steady-state operation performs no per-job
//! heap allocation.
//!
//! ## Modules
//!
//! - [`arena`] - Scratch arena: bump allocation rewound between cycles
//! - [`counter`] - Atomic counter with wait-for-zero semantics
//! - [`config`] - Scheduler configuration
//! - [`core`](crate::core) - Job records, the ready queue, and the [`Scheduler`] façade
//! - [`util`] - Telemetry helpers
//!
//! ## Examples
//!
//! ### Fan out over a slice
//!
//! ```
//! use jobgraph::{Scheduler, SchedulerConfig};
//!
//! let sch = Scheduler::new(SchedulerConfig::new().with_worker_count(2))?;
//!
//! let mut values = [1u32, 2, 3, 4];
//! sch.parallel_for(&mut values, |v| *v *= 10)?;
//! assert_eq!(values, [10, 20, 30, 40]);
//! # Ok::<(), jobgraph::SchedulerError>(())
//! ```
//!
//! ### Bulk completion through a counter
//!
//! ```
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use jobgraph::{Counter, Scheduler, SchedulerConfig};
//!
//! fn bump(data: *mut ()) {
//!     let total = unsafe { &*data.cast::<AtomicU32>() };
//!     total.fetch_add(1, Ordering::Relaxed);
//! }
//!
//! let sch = Scheduler::new(SchedulerConfig::new().with_worker_count(2))?;
//!
//! let total = AtomicU32::new(0);
//! let counter = Counter::new();
//! for _ in 0..8 {
//!     sch.create_job(bump, &total as *const _ as *mut (), Some(&counter))?;
//! }
//! sch.kick();
//! sch.wait_counter(&counter);
//! assert_eq!(total.load(Ordering::Relaxed), 8);
//! # Ok::<(), jobgraph::SchedulerError>(())
//! ```
//!
//! ### Dependencies and groups
//!
//! ```
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use jobgraph::{Scheduler, SchedulerConfig};
//!
//! fn stamp(data: *mut ()) {
//!     let order = unsafe { &*data.cast::<AtomicU32>() };
//!     order.fetch_add(1, Ordering::SeqCst);
//! }
//!
//! let sch = Scheduler::new(SchedulerConfig::new().with_worker_count(2))?;
//!
//! let calls = AtomicU32::new(0);
//! let data = &calls as *const _ as *mut ();
//!
//! // `last` runs only after both leaves have finished.
//! let last = sch.create_job(stamp, data, None)?;
//! for _ in 0..2 {
//!     let leaf = sch.create_job(stamp, data, None)?;
//!     sch.depend(last, leaf)?;
//! }
//! sch.kick();
//! sch.wait(last);
//! assert_eq!(calls.load(Ordering::SeqCst), 3);
//! # Ok::<(), jobgraph::SchedulerError>(())
//! ```
//!
//! ## Lifecycle
//!
//! A scheduler cycles through build and execute phases: [`Scheduler::reset`]
//! rewinds the arena, the host wires jobs and edges, [`Scheduler::kick`] seeds
//! the ready queue, workers drain it, and the host blocks in
//! [`Scheduler::wait`] or [`Scheduler::wait_counter`]. Dropping the scheduler
//! stops and joins every worker thread.

#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod arena;
pub mod config;
pub mod core;
pub mod counter;
pub mod util;

// Re-export main types for convenience
pub use arena::ScratchArena;
pub use config::SchedulerConfig;
pub use counter::Counter;
pub use crate::core::{JobFn, JobRef, Scheduler, SchedulerError};
