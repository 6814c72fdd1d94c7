//! Generation orchestration.
//!
//! [`GenerationOrchestrator`] owns the pipeline state and the single
//! active stream; [`RunHandle`] tracks one streaming phase.

pub mod generation;
pub mod run;

pub use generation::GenerationOrchestrator;
pub use run::{RunHandle, RunOutcome};
