//! Task and step state machines.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TaskError, TransitionError};

/// Default attempt bound for a step.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Lifecycle of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not yet executed.
    Pending,
    /// Planner is building the execution plan.
    Analyzing,
    /// Plan steps are running.
    Executing,
    /// Every step succeeded.
    Completed,
    /// A step exhausted its retries or orchestration itself failed.
    Failed,
}

impl TaskStatus {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;

        matches!(
            (self, target),
            (Pending, Analyzing)
                | (Analyzing, Executing)
                | (Analyzing, Failed)
                | (Executing, Completed)
                | (Executing, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// An execution attempt currently owns the task.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Analyzing | Self::Executing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    /// An attempt is in flight.
    Running,
    /// Last attempt failed; waiting out the backoff before the next one.
    Retrying,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn can_transition_to(&self, target: StepStatus) -> bool {
        use StepStatus::*;

        matches!(
            (self, target),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Completed)
                | (Running, Retrying)
                | (Running, Failed)
                | (Retrying, Running)
                | (Retrying, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of work a step performs. Selects the handler that runs it.
///
/// On the wire capabilities keep the agent names existing consumers expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "retriever")]
    Retrieve,
    #[serde(rename = "analyzer")]
    Analyze,
    #[serde(rename = "writer")]
    Generate,
}

impl Capability {
    pub const ALL: [Capability; 3] = [Self::Retrieve, Self::Analyze, Self::Generate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retrieve => "retriever",
            Self::Analyze => "analyzer",
            Self::Generate => "writer",
        }
    }

    /// Context key a successful step of this capability writes to.
    pub fn context_key(&self) -> &'static str {
        match self {
            Self::Retrieve => context_keys::RETRIEVED_CONTEXT,
            Self::Analyze => context_keys::EXECUTION_STRATEGY,
            Self::Generate => context_keys::FINAL_OUTPUT,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symbolic keys of the inter-step context.
pub mod context_keys {
    pub const RETRIEVED_CONTEXT: &str = "retrieved_context";
    pub const EXECUTION_STRATEGY: &str = "execution_strategy";
    pub const FINAL_OUTPUT: &str = "final_output";
}

/// A recorded state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition<S> {
    pub from: S,
    pub to: S,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outputs of completed steps, keyed by [`context_keys`]. Scoped to one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context(BTreeMap<String, String>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One unit of an execution plan, bound to a single capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// `step_NNN`, unique within the plan.
    pub step_id: String,
    #[serde(rename = "agent_type")]
    pub capability: Capability,
    pub description: String,
    /// Named inputs the handler reads.
    pub input: BTreeMap<String, String>,
    /// Context keys this step reads from earlier steps.
    pub consumes: Vec<String>,
    pub status: StepStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub transitions: Vec<Transition<StepStatus>>,
}

impl Step {
    pub fn new(
        step_id: impl Into<String>,
        capability: Capability,
        description: impl Into<String>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            capability,
            description: description.into(),
            input: BTreeMap::new(),
            consumes: Vec::new(),
            status: StepStatus::Pending,
            output: None,
            error: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            transitions: Vec::new(),
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.input.insert(key.into(), value.into());
        self
    }

    pub fn consuming(mut self, key: impl Into<String>) -> Self {
        self.consumes.push(key.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Look up a named input.
    pub fn input(&self, key: &str) -> Option<&str> {
        self.input.get(key).map(String::as_str)
    }

    /// Move to `target`, rejecting anything the step lifecycle forbids.
    pub fn transition_to(&mut self, target: StepStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(target) {
            return Err(TransitionError {
                subject: format!("step {}", self.step_id),
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.transitions.push(Transition {
            from: self.status,
            to: target,
            timestamp: Utc::now(),
            reason: None,
        });
        self.status = target;
        Ok(())
    }

    /// Whether the step ever waited for a retry.
    pub fn was_retried(&self) -> bool {
        self.transitions.iter().any(|t| t.to == StepStatus::Retrying)
    }
}

/// Ordered steps for one task. Order is execution order and never changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    task_id: String,
    steps: Vec<Step>,
    created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    pub fn new(task_id: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            task_id: task_id.into(),
            steps,
            created_at: Utc::now(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn steps_mut(&mut self) -> std::slice::IterMut<'_, Step> {
        self.steps.iter_mut()
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Task text accepted for creation: non-empty after trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInput(String);

impl TaskInput {
    pub fn parse(raw: impl Into<String>) -> Result<Self, TaskError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(TaskError::InvalidInput {
                reason: "Task description cannot be empty".to_string(),
            });
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// A user-submitted unit of work tracked through its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub user_input: String,
    pub status: TaskStatus,
    pub execution_plan: Option<ExecutionPlan>,
    pub current_step_index: usize,
    pub final_output: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub transitions: Vec<Transition<TaskStatus>>,
}

impl Task {
    pub fn new(input: TaskInput) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4().to_string(),
            user_input: input.into_inner(),
            status: TaskStatus::Pending,
            execution_plan: None,
            current_step_index: 0,
            final_output: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            transitions: Vec::new(),
        }
    }

    /// Transition to a new state.
    pub fn transition_to(
        &mut self,
        target: TaskStatus,
        reason: Option<String>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(target) {
            return Err(TransitionError {
                subject: format!("task {}", self.task_id),
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.transitions.push(Transition {
            from: self.status,
            to: target,
            timestamp: Utc::now(),
            reason,
        });
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Start a fresh execution attempt.
    ///
    /// Prior plan, output, error and history are discarded and the task moves
    /// to ANALYZING. The single recorded transition starts from whatever
    /// status the previous attempt left behind. Rejected while another
    /// attempt is active.
    pub fn begin_execution(&mut self) -> Result<(), TaskError> {
        if self.status.is_active() {
            return Err(TaskError::AlreadyRunning {
                id: self.task_id.clone(),
            });
        }
        let from = self.status;
        self.execution_plan = None;
        self.current_step_index = 0;
        self.final_output = None;
        self.error_message = None;
        self.transitions.clear();
        self.transitions.push(Transition {
            from,
            to: TaskStatus::Analyzing,
            timestamp: Utc::now(),
            reason: None,
        });
        self.status = TaskStatus::Analyzing;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the task failed with `message`.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        let message = message.into();
        self.transition_to(TaskStatus::Failed, Some(message.clone()))?;
        self.error_message = Some(message);
        Ok(())
    }

    /// Mark the task completed with its untruncated final output.
    pub fn complete(&mut self, final_output: String) -> Result<(), TransitionError> {
        self.transition_to(TaskStatus::Completed, None)?;
        self.final_output = Some(final_output);
        Ok(())
    }

    /// Overwrite the stored copy of the step at `index` with `step`.
    pub fn record_step(&mut self, index: usize, step: Step) {
        if let Some(slot) = self
            .execution_plan
            .as_mut()
            .and_then(|plan| plan.steps.get_mut(index))
        {
            *slot = step;
            self.updated_at = Utc::now();
        }
    }

    pub fn summary(&self, input_chars: usize) -> TaskSummary {
        TaskSummary {
            task_id: self.task_id.clone(),
            status: self.status,
            user_input: truncate_chars(&self.user_input, input_chars),
            created_at: self.created_at,
        }
    }
}

/// Listing view of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub status: TaskStatus,
    pub user_input: String,
    pub created_at: DateTime<Utc>,
}

/// First `max` characters of `s` (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
