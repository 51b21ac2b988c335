//! Strategy analysis over the task text and retrieved context.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{require_input, simulate_latency};
use crate::error::HandlerError;
use crate::handlers::StepHandler;
use crate::task::{Capability, Context, Step, context_keys, truncate_chars};

#[derive(Debug, Serialize)]
struct Strategy<'a> {
    task_summary: String,
    complexity_level: &'a str,
    required_agents: [Capability; 3],
    estimated_steps: usize,
    context_used: bool,
    strategy: &'a str,
}

/// Analyze handler: emits a JSON execution strategy.
pub struct StrategyAnalyzer {
    latency: Duration,
}

impl StrategyAnalyzer {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl StepHandler for StrategyAnalyzer {
    fn capability(&self) -> Capability {
        Capability::Analyze
    }

    async fn handle(&self, step: &Step, context: &Context) -> Result<String, HandlerError> {
        let task = require_input(step, "task")?;
        let retrieved = context
            .get(context_keys::RETRIEVED_CONTEXT)
            .unwrap_or_default();
        simulate_latency(self.latency).await;

        let strategy = Strategy {
            task_summary: truncate_chars(task, 100),
            complexity_level: "medium",
            required_agents: Capability::ALL,
            estimated_steps: Capability::ALL.len(),
            context_used: !retrieved.is_empty(),
            strategy: "Sequential execution with context enrichment",
        };

        serde_json::to_string_pretty(&strategy).map_err(|e| HandlerError::Failed(e.to_string()))
    }
}
