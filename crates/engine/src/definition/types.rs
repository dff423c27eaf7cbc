//! Process definition types.
//!
//! A definition is an ordered set of named steps connected by transitions:
//! - steps carry a kind, an optional assignment rule and task settings
//! - transitions point at a target step and may be guarded by a condition
//! - `otherwise` transitions fire only when no sibling transition fired

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionStatus {
    /// Editable, cannot start instances.
    #[default]
    Draft,
    /// Frozen, instances may be started.
    Active,
}

impl DefinitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for DefinitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DefinitionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            other => Err(format!("unknown definition status '{}'", other)),
        }
    }
}

/// Kind of a step.
///
/// Unknown names are kept as [`StepKind::Other`] so that the validator can
/// report them instead of failing the whole document parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    Start,
    Task,
    Approval,
    Gateway,
    Timer,
    End,
    Subprocess,
    Script,
    Other(String),
}

impl StepKind {
    pub fn as_str(&self) -> &str {
        match self {
            StepKind::Start => "start",
            StepKind::Task => "task",
            StepKind::Approval => "approval",
            StepKind::Gateway => "gateway",
            StepKind::Timer => "timer",
            StepKind::End => "end",
            StepKind::Subprocess => "subprocess",
            StepKind::Script => "script",
            StepKind::Other(name) => name.as_str(),
        }
    }

    /// Whether this is one of the recognized kinds.
    pub fn is_recognized(&self) -> bool {
        !matches!(self, StepKind::Other(_))
    }

    /// Whether entering a step of this kind creates a pending task.
    ///
    /// End steps terminate a branch and gateways only route.
    pub fn creates_task(&self) -> bool {
        !matches!(self, StepKind::End | StepKind::Gateway)
    }
}

impl From<String> for StepKind {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "start" => StepKind::Start,
            "task" => StepKind::Task,
            "approval" => StepKind::Approval,
            "gateway" => StepKind::Gateway,
            "timer" => StepKind::Timer,
            "end" => StepKind::End,
            "subprocess" => StepKind::Subprocess,
            "script" => StepKind::Script,
            _ => StepKind::Other(s),
        }
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority, copied from the step onto every task it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(format!("unknown task priority '{}'", other)),
        }
    }
}

/// Who owns the tasks created for a step.
///
/// Any subset of the fields may be set; resolution tries them in the order
/// principal, field, role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRule {
    /// Fixed principal ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,

    /// Instance data field holding a principal ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// Role name resolved through the directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl AssignmentRule {
    pub fn principal(principal: &str) -> Self {
        Self {
            principal: Some(principal.to_string()),
            ..Default::default()
        }
    }

    pub fn field(field: &str) -> Self {
        Self {
            field: Some(field.to_string()),
            ..Default::default()
        }
    }

    pub fn role(role: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            ..Default::default()
        }
    }
}

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "equals", alias = "==", alias = "eq")]
    Equals,
    #[serde(rename = "not_equals", alias = "!=", alias = "ne")]
    NotEquals,
    #[serde(rename = "greater_than", alias = ">", alias = "gt")]
    GreaterThan,
    #[serde(rename = "less_than", alias = "<", alias = "lt")]
    LessThan,
    #[serde(rename = "contains")]
    Contains,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Equals => "==",
            Operator::NotEquals => "!=",
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
            Operator::Contains => "contains",
        };
        f.write_str(s)
    }
}

/// Branch predicate over instance data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Instance data key to read.
    pub field: String,

    /// Comparison operator.
    pub op: Operator,

    /// Value to compare against.
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Condition {
    pub fn new(field: &str, op: Operator, value: serde_json::Value) -> Self {
        Self {
            field: field.to_string(),
            op,
            value,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.op, self.value)
    }
}

/// Outgoing edge of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Target step identifier.
    pub to: String,

    /// Guard; absent means always satisfied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Condition>,

    /// Fires only when no other transition of the same step fired.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub otherwise: bool,
}

impl Transition {
    pub fn to(target: &str) -> Self {
        Self {
            to: target.to_string(),
            when: None,
            otherwise: false,
        }
    }

    pub fn when(target: &str, condition: Condition) -> Self {
        Self {
            to: target.to_string(),
            when: Some(condition),
            otherwise: false,
        }
    }

    pub fn otherwise(target: &str) -> Self {
        Self {
            to: target.to_string(),
            when: None,
            otherwise: true,
        }
    }
}

/// A named step of a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Identifier, unique within the definition.
    pub id: String,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Step kind.
    pub kind: StepKind,

    /// Assignment rule for tasks of this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign: Option<AssignmentRule>,

    /// Due time of created tasks, relative to creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_in_seconds: Option<u64>,

    /// Priority of created tasks.
    #[serde(default)]
    pub priority: TaskPriority,

    /// Outgoing transitions, evaluated in declared order.
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl Step {
    pub fn new(id: &str, kind: StepKind) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            kind,
            assign: None,
            due_in_seconds: None,
            priority: TaskPriority::default(),
            transitions: Vec::new(),
        }
    }

    pub fn with_assign(mut self, rule: AssignmentRule) -> Self {
        self.assign = Some(rule);
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_due_in(mut self, seconds: u64) -> Self {
        self.due_in_seconds = Some(seconds);
        self
    }

    /// Display name, falling back to the identifier.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// A versioned process definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    /// Unique ID of this definition version.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    /// Semantic version label.
    pub version: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Identifier of the designated start step.
    pub start: String,

    pub steps: Vec<Step>,

    #[serde(default)]
    pub status: DefinitionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Definition {
    /// Create a draft definition with a fresh ID.
    pub fn new(name: &str, version: &str, start: &str, steps: Vec<Step>) -> Self {
        Self {
            id: Uuid::new_v4(),
            version: version.to_string(),
            name: name.to_string(),
            description: None,
            start: start.to_string(),
            steps,
            status: DefinitionStatus::Draft,
            created_at: None,
        }
    }

    /// Look up a step by identifier.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// The designated start step, if it exists.
    pub fn start_step(&self) -> Option<&Step> {
        self.step(&self.start)
    }

    pub fn is_active(&self) -> bool {
        self.status == DefinitionStatus::Active
    }
}
