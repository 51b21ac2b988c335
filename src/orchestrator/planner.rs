//! Planner: turns task text into an ordered execution plan.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::PlanError;
use crate::task::{Capability, ExecutionPlan, Step, context_keys};

/// Produces the execution plan for a task.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, input: &str, task_id: &str) -> Result<ExecutionPlan, PlanError>;
}

/// Hands out `step_NNN` identifiers in plan order.
#[derive(Debug, Default)]
struct StepIds(u32);

impl StepIds {
    fn next(&mut self) -> String {
        self.0 += 1;
        format!("step_{:03}", self.0)
    }
}

/// Fixed Retrieve → Analyze → Generate plan.
pub struct StaticPlanner {
    latency: Duration,
    max_retries: u32,
}

impl StaticPlanner {
    pub fn new(latency: Duration, max_retries: u32) -> Self {
        Self {
            latency,
            max_retries,
        }
    }
}

#[async_trait]
impl Planner for StaticPlanner {
    async fn plan(&self, input: &str, task_id: &str) -> Result<ExecutionPlan, PlanError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut ids = StepIds::default();
        let steps = vec![
            Step::new(
                ids.next(),
                Capability::Retrieve,
                "Retrieve relevant context for the task",
            )
            .with_input("query", input),
            Step::new(
                ids.next(),
                Capability::Analyze,
                "Create detailed execution strategy",
            )
            .with_input("task", input)
            .with_input("context_key", context_keys::RETRIEVED_CONTEXT)
            .consuming(context_keys::RETRIEVED_CONTEXT),
            Step::new(
                ids.next(),
                Capability::Generate,
                "Generate final output based on analysis",
            )
            .with_input("task", input)
            .with_input("analysis_key", context_keys::EXECUTION_STRATEGY)
            .consuming(context_keys::EXECUTION_STRATEGY)
            .consuming(context_keys::RETRIEVED_CONTEXT),
        ]
        .into_iter()
        .map(|step| step.with_max_retries(self.max_retries))
        .collect();

        tracing::debug!(task_id = %task_id, "Built static three-step plan");
        Ok(ExecutionPlan::new(task_id, steps))
    }
}
