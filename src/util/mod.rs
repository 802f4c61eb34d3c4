//! Helpers shared across the crate.

pub mod telemetry;

pub use telemetry::*;
