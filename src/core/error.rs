//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scratch arena cannot satisfy an allocation. Fatal for the current
    /// cycle; the host must size the arena for its largest graph.
    #[error("scratch arena exhausted: requested {requested} bytes, {remaining} remaining")]
    ScratchExhausted {
        /// Bytes requested by the failed allocation.
        requested: usize,
        /// Bytes left in the arena before the request.
        remaining: usize,
    },
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Graph construction was attempted after the scheduler stopped.
    #[error("scheduler is stopped")]
    Stopped,
}
