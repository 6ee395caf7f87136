//! Evaluation engine interface.
//!
//! Covers the wire protocol types for the engine's HTTP endpoints and the
//! transport used to reach them. The [`EvaluationEngine`] trait decouples
//! the session coordinator from the concrete HTTP client so tests can
//! substitute a scripted engine.

pub mod protocol;
pub mod transport;

pub use transport::{EvaluationEngine, HttpEngine};
