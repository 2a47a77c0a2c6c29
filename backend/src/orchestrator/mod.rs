//! Orchestrator - arbitration rounds and the loop that drives them.
//!
//! - `engine`: synchronous single-round [`Arbiter`], config and errors
//! - `runner`: worker thread, lifecycle and UI marshaling
//! - `snapshot`: read-only state handed to the UI

pub mod engine;
pub mod runner;
pub mod snapshot;

#[cfg(test)]
mod tests;

// Re-export main types for convenience
pub use engine::{Arbiter, EngineConfig, RoundResult, SimulationError};
pub use runner::{ArbitrationLoop, LoopState, ModeCell};
pub use snapshot::EngineSnapshot;
