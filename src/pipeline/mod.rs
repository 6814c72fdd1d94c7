//! Pipeline view model: state machine, output summaries and post assembly.

pub mod merge;
pub mod state;
pub mod summary;
