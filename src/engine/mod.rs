//! # engine
//!
//! The alert-to-order pipeline. Each stage is a plain struct with its
//! collaborators injected; [`ExecutionEngine`] wires them together.

pub mod clock;
pub mod dedup;
pub mod executor;
pub mod normalizer;
pub mod placer;
pub mod reconciler;
pub mod risk;

pub use executor::ExecutionEngine;
