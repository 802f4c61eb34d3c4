//! Scheduler configuration structure.

use serde::{Deserialize, Serialize};

/// Default number of worker threads: one per CPU.
fn default_worker_count() -> usize {
    num_cpus::get()
}

/// Default scratch arena size: 4MB.
fn default_scratch_capacity() -> usize {
    4 * 1024 * 1024
}

/// Default thread stack size: 2MB.
fn default_thread_stack_size() -> usize {
    2 * 1024 * 1024
}

/// Configuration for a [`Scheduler`](crate::Scheduler).
///
/// The worker pool size and scratch capacity are fixed for the lifetime of
/// the scheduler; there is no dynamic resizing.
///
/// # Example
///
/// ```rust
/// use jobgraph::SchedulerConfig;
///
/// let config = SchedulerConfig::new()
///     .with_worker_count(4)
///     .with_scratch_capacity(1024 * 1024);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker threads to spawn.
    ///
    /// Default: `num_cpus::get()`.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Size of the scratch arena in bytes.
    ///
    /// Job records, dependency edges, and caller payloads all live here; the
    /// host must size it for the largest cycle it intends to build.
    /// Default: 4MB.
    #[serde(default = "default_scratch_capacity")]
    pub scratch_capacity: usize,

    /// Stack size per worker thread in bytes.
    ///
    /// Default: 2MB.
    #[serde(default = "default_thread_stack_size")]
    pub thread_stack_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            scratch_capacity: default_scratch_capacity(),
            thread_stack_size: default_thread_stack_size(),
        }
    }
}

impl SchedulerConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads.
    #[must_use]
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the scratch arena size in bytes.
    #[must_use]
    pub fn with_scratch_capacity(mut self, bytes: usize) -> Self {
        self.scratch_capacity = bytes;
        self
    }

    /// Set the worker thread stack size in bytes.
    #[must_use]
    pub fn with_thread_stack_size(mut self, size: usize) -> Self {
        self.thread_stack_size = size;
        self
    }

    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.scratch_capacity == 0 {
            return Err("scratch_capacity must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64KB".into());
        }
        Ok(())
    }

    /// Parse a configuration from a JSON string and validate it.
    ///
    /// # Errors
    ///
    /// Returns a message describing the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
