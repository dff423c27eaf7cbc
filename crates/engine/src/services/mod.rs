//! Service layer.
//!
//! The workflow engine facade coordinates the instance manager, the
//! persistence store and the notifier.

pub mod locks;
pub mod workflow;

pub use locks::InstanceLocks;
pub use workflow::{TaskCompletion, WorkflowEngine};
