//! Taskflow: plan, execute and stream multi-step tasks.

pub mod api;
pub mod config;
pub mod error;
pub mod handlers;
pub mod orchestrator;
pub mod task;

pub use error::{Error, Result};
pub use orchestrator::TaskOrchestrator;
