//! Progress events streamed while a task executes.
//!
//! Serialized shape (one JSON object per line on the wire):
//! `{"event_type": ..., "task_id": ..., "timestamp": <ISO-8601>, "data": {...}}`.
//! Field names are a compatibility contract with existing consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Capability, Step, StepStatus, TaskStatus, truncate_chars};

/// Kind of a stream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StepStarted,
    PartialOutput,
    StepCompleted,
    TaskCompleted,
    Error,
}

/// Kind-specific payload, serialized as the `data` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventData {
    StepStarted {
        step_id: String,
        /// 1-based position in the plan.
        step_number: usize,
        total_steps: usize,
        description: String,
        agent_type: Capability,
    },
    /// A step exhausted its retries.
    StepFailed {
        step_id: String,
        error: String,
        retry_count: u32,
    },
    TaskCompleted {
        status: TaskStatus,
        final_output: String,
        total_steps: usize,
    },
    PartialOutput {
        step_id: String,
        output: String,
    },
    StepCompleted {
        step_id: String,
        status: StepStatus,
    },
    /// Failure not attributable to a single step.
    Failed {
        error: String,
    },
}

impl EventData {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::StepStarted { .. } => EventType::StepStarted,
            Self::PartialOutput { .. } => EventType::PartialOutput,
            Self::StepCompleted { .. } => EventType::StepCompleted,
            Self::TaskCompleted { .. } => EventType::TaskCompleted,
            Self::StepFailed { .. } | Self::Failed { .. } => EventType::Error,
        }
    }

    /// Step this payload refers to, if any.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            Self::StepStarted { step_id, .. }
            | Self::StepFailed { step_id, .. }
            | Self::PartialOutput { step_id, .. }
            | Self::StepCompleted { step_id, .. } => Some(step_id),
            Self::TaskCompleted { .. } | Self::Failed { .. } => None,
        }
    }
}

/// One timestamped progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub event_type: EventType,
    pub task_id: String,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

impl StreamEvent {
    pub fn new(task_id: impl Into<String>, data: EventData) -> Self {
        Self {
            event_type: data.event_type(),
            task_id: task_id.into(),
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn step_started(task_id: &str, step: &Step, step_number: usize, total_steps: usize) -> Self {
        Self::new(
            task_id,
            EventData::StepStarted {
                step_id: step.step_id.clone(),
                step_number,
                total_steps,
                description: step.description.clone(),
                agent_type: step.capability,
            },
        )
    }

    pub fn partial_output(task_id: &str, step: &Step, max_chars: usize) -> Self {
        Self::new(
            task_id,
            EventData::PartialOutput {
                step_id: step.step_id.clone(),
                output: truncate_chars(step.output.as_deref().unwrap_or_default(), max_chars),
            },
        )
    }

    pub fn step_completed(task_id: &str, step: &Step) -> Self {
        Self::new(
            task_id,
            EventData::StepCompleted {
                step_id: step.step_id.clone(),
                status: StepStatus::Completed,
            },
        )
    }

    pub fn step_failed(task_id: &str, step: &Step) -> Self {
        Self::new(
            task_id,
            EventData::StepFailed {
                step_id: step.step_id.clone(),
                error: step.error.clone().unwrap_or_default(),
                retry_count: step.retry_count,
            },
        )
    }

    pub fn task_completed(
        task_id: &str,
        final_output: &str,
        max_chars: usize,
        total_steps: usize,
    ) -> Self {
        Self::new(
            task_id,
            EventData::TaskCompleted {
                status: TaskStatus::Completed,
                final_output: truncate_chars(final_output, max_chars),
                total_steps,
            },
        )
    }

    pub fn error(task_id: &str, error: impl Into<String>) -> Self {
        Self::new(task_id, EventData::Failed { error: error.into() })
    }

    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self.event_type, EventType::TaskCompleted | EventType::Error)
    }

    /// Serialize as a single newline-terminated JSON record.
    pub fn to_ndjson(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
