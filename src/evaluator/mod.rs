//! Evaluation session coordination.
//!
//! Tracks the named jobs in flight against the evaluation engine, drives
//! the recurring message pump, and fans engine events out to subscribers.

pub mod client;
pub mod signal;

pub use client::{EvaluatorClient, Job};
pub use signal::{Signal, Subscription};
