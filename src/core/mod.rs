//! Core scheduling machinery: job records, the ready queue, and the façade.

pub mod error;
pub mod job;
pub mod scheduler;

mod ready_queue;

pub use error::SchedulerError;
pub use job::{JobFn, JobRef};
pub use scheduler::Scheduler;
