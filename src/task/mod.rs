//! Task data model, progress events and the task registry.
//!
//! - `model`: Task / Step state machines, execution plan, inter-step context
//! - `event`: `StreamEvent` records streamed during execution
//! - `registry`: process-wide task storage

pub mod event;
pub mod model;
pub mod registry;

pub use event::{EventData, EventType, StreamEvent};
pub use model::{
    Capability, Context, ExecutionPlan, Step, StepStatus, Task, TaskInput, TaskStatus,
    TaskSummary, Transition, context_keys, truncate_chars,
};
pub use registry::{InMemoryTaskRegistry, TaskRegistry, TaskUpdate};
