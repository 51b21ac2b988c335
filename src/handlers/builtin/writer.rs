//! Markdown report generation.

use std::time::Duration;

use async_trait::async_trait;

use super::{require_input, simulate_latency};
use crate::error::HandlerError;
use crate::handlers::StepHandler;
use crate::task::{Capability, Context, Step, context_keys};

/// Generate handler: renders the final report from analysis and context.
pub struct ReportWriter {
    latency: Duration,
}

impl ReportWriter {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    fn render(task: &str, context: &str, analysis: &str) -> String {
        format!(
            r#"
# Task Execution Report

## Original Task
{task}

## Retrieved Context
{context}

## Analysis
{analysis}

## Final Output
The task has been analyzed and executed through a multi-step pipeline:

1. **Retrieval Phase**: Relevant context was gathered from the knowledge base
2. **Analysis Phase**: The task was decomposed into structured steps
3. **Generation Phase**: This report was generated

## Execution Summary
- Total steps executed: {steps}
- Status: Completed successfully
- Output generated with full context awareness
"#,
            steps = Capability::ALL.len(),
        )
    }
}

#[async_trait]
impl StepHandler for ReportWriter {
    fn capability(&self) -> Capability {
        Capability::Generate
    }

    async fn handle(&self, step: &Step, context: &Context) -> Result<String, HandlerError> {
        let task = require_input(step, "task")?;
        let analysis = context
            .get(context_keys::EXECUTION_STRATEGY)
            .unwrap_or_default();
        let retrieved = context
            .get(context_keys::RETRIEVED_CONTEXT)
            .unwrap_or_default();
        simulate_latency(self.latency).await;

        Ok(Self::render(task, retrieved, analysis))
    }
}
