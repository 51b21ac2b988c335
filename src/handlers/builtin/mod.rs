//! Built-in simulated handlers for retrieval, analysis and report writing.

mod analyzer;
mod retriever;
mod writer;

pub use analyzer::StrategyAnalyzer;
pub use retriever::KnowledgeRetriever;
pub use writer::ReportWriter;

use std::time::Duration;

use crate::error::HandlerError;
use crate::task::Step;

/// Read a required named input from the step.
pub(crate) fn require_input<'a>(step: &'a Step, key: &str) -> Result<&'a str, HandlerError> {
    step.input(key).ok_or_else(|| HandlerError::MissingInput {
        key: key.to_string(),
    })
}

/// Stand-in for the latency of real work.
pub(crate) async fn simulate_latency(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}
