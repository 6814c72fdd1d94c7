#![forbid(unsafe_code)]

//! Streaming client for a multi-agent post generation pipeline.
//!
//! Submits an idea, consumes the server's event stream, tracks per-agent
//! progress, collects clarifying questions, submits answers and assembles
//! the final post.

pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod router;
pub mod stream;

pub use config::ClientConfig;
pub use errors::{AppError, Result};
pub use orchestrator::{GenerationOrchestrator, RunHandle, RunOutcome};
