//! Process definitions.
//!
//! This module provides the declarative side of the engine:
//! - Type definitions for definitions, steps, transitions and conditions
//! - YAML/JSON parsing
//! - Structural validation

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{load_definition_file, parse_definition, parse_definition_json, parse_definition_yaml};
pub use types::{
    AssignmentRule, Condition, Definition, DefinitionStatus, Operator, Step, StepKind,
    TaskPriority, Transition,
};
pub use validator::{validate, ValidationIssue, ValidationReport};
