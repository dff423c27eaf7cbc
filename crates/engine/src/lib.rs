//! Taskflow Engine Library
//!
//! A human-centric workflow engine: process definitions made of steps and
//! conditional transitions, running instances that carry an open data map,
//! and tasks assigned to principals who complete them.
//!
//! - **Definitions**: parse YAML/JSON definitions and validate their structure
//! - **Engine**: evaluate transitions, resolve assignees, advance instances
//! - **Services**: the [`WorkflowEngine`] facade with per-instance locking
//! - **Store**: persistence behind the [`store::WorkflowStore`] trait, in
//!   memory or in PostgreSQL
//! - **Directory** and **Notify**: role lookups and assignment notifications
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use taskflow_engine::{
//!     config::EngineConfig, definition::parse_definition_yaml, directory::StaticDirectory,
//!     notify::LogNotifier, store::InMemoryStore, WorkflowEngine,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = WorkflowEngine::new(
//!         Arc::new(InMemoryStore::new()),
//!         Arc::new(StaticDirectory::new().with_role("reviewer", ["rita"])),
//!         Arc::new(LogNotifier),
//!         &EngineConfig::default(),
//!     );
//!     let id = engine.define_workflow(parse_definition_yaml(YAML)?).await?;
//!     engine.activate_workflow(id).await?;
//!     let instance = engine.start_instance(id, Default::default(), "alice").await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod definition;
pub mod directory;
pub mod engine;
pub mod error;
pub mod notify;
pub mod result_ext;
pub mod services;
pub mod store;

pub use error::{EngineError, EngineResult};
pub use result_ext::ResultExt;
pub use services::WorkflowEngine;
