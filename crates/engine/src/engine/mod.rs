//! Workflow execution engine.
//!
//! - **Evaluator**: evaluates transition conditions against instance data
//! - **Assignee**: resolves who a new task is assigned to
//! - **Manager**: the instance state machine (start, complete, advance)
//! - **Tasks**: task record access bounded by the persistence timeout
//! - **State**: instance and task records

pub mod assignee;
pub mod evaluator;
pub mod manager;
pub mod state;
pub mod tasks;

pub use assignee::{AssigneeResolver, Assignment};
pub use evaluator::ConditionEvaluator;
pub use manager::InstanceManager;
pub use state::{Instance, InstanceData, InstanceStatus, InstanceStatusView, Task, TaskStatus};
pub use tasks::TaskStore;
