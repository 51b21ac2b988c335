//! HTTP transport for the orchestrator.

pub mod dto;
pub mod routes;

pub use routes::{AppState, task_routes};
