//! Structural validation of process definitions.
//!
//! Validation is a pure function over the definition. Errors block
//! activation; warnings are reported but never block, so definitions that
//! loop or carry dead steps can still run.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::{Definition, StepKind};

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Step the finding is about, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(step: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            step: step.map(str::to_string),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step {
            Some(step) => write!(f, "step '{}': {}", step, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Outcome of validating a definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// True when there are no errors. Warnings do not count.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, step: Option<&str>, message: impl Into<String>) {
        self.errors.push(ValidationIssue::new(step, message));
    }

    fn warn(&mut self, step: Option<&str>, message: impl Into<String>) {
        self.warnings.push(ValidationIssue::new(step, message));
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        f.write_str(&messages.join("; "))
    }
}

/// Validate a definition.
pub fn validate(definition: &Definition) -> ValidationReport {
    let mut report = ValidationReport::default();

    if definition.name.trim().is_empty() {
        report.error(None, "definition name is required");
    }

    if definition.version.trim().is_empty() {
        report.error(None, "definition version is required");
    }

    if definition.steps.is_empty() {
        report.error(None, "definition must have at least one step");
        return report;
    }

    let mut step_ids: HashSet<&str> = HashSet::new();
    for step in &definition.steps {
        if step.id.trim().is_empty() {
            report.error(None, "step identifier must not be empty");
        } else if !step_ids.insert(step.id.as_str()) {
            report.error(Some(&step.id), "duplicate step identifier");
        }
    }

    match definition.start_step() {
        None => report.error(
            None,
            format!("start step '{}' does not exist", definition.start),
        ),
        Some(start) if !start.kind.creates_task() => report.error(
            Some(&start.id),
            format!("start step cannot be of kind '{}'", start.kind),
        ),
        Some(_) => {}
    }

    let start_kinds = definition
        .steps
        .iter()
        .filter(|s| s.kind == StepKind::Start)
        .count();
    if start_kinds > 1 {
        report.error(
            None,
            format!("exactly one start step is allowed, found {}", start_kinds),
        );
    }

    for step in &definition.steps {
        if !step.kind.is_recognized() {
            report.error(
                Some(&step.id),
                format!("unrecognized step kind '{}'", step.kind),
            );
        }

        if step.kind == StepKind::End && !step.transitions.is_empty() {
            report.warn(Some(&step.id), "transitions on an end step are ignored");
        }

        let mut otherwise_count = 0;
        for transition in &step.transitions {
            if !step_ids.contains(transition.to.as_str()) {
                report.error(
                    Some(&step.id),
                    format!("transition targets unknown step '{}'", transition.to),
                );
            }

            if let Some(condition) = &transition.when {
                if condition.field.trim().is_empty() {
                    report.error(
                        Some(&step.id),
                        format!("condition on transition to '{}' has no field", transition.to),
                    );
                }
                if transition.otherwise {
                    report.error(
                        Some(&step.id),
                        format!(
                            "transition to '{}' cannot be both conditional and 'otherwise'",
                            transition.to
                        ),
                    );
                }
            }

            if transition.otherwise {
                otherwise_count += 1;
            }

            if transition.to == step.id && transition.when.is_none() && !transition.otherwise {
                report.warn(
                    Some(&step.id),
                    "unconditional transition to itself loops forever",
                );
            }
        }

        if otherwise_count > 1 {
            report.warn(
                Some(&step.id),
                format!("{} 'otherwise' transitions; all of them fire together", otherwise_count),
            );
        }
    }

    for unreachable in unreachable_steps(definition) {
        report.warn(Some(unreachable), "step is unreachable from the start step");
    }

    report
}

/// Steps that no path from the start step reaches, in declared order.
fn unreachable_steps(definition: &Definition) -> Vec<&str> {
    let edges: HashMap<&str, Vec<&str>> = definition
        .steps
        .iter()
        .map(|s| {
            (
                s.id.as_str(),
                s.transitions.iter().map(|t| t.to.as_str()).collect(),
            )
        })
        .collect();

    if !edges.contains_key(definition.start.as_str()) {
        return Vec::new();
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    seen.insert(definition.start.as_str());
    queue.push_back(definition.start.as_str());

    while let Some(current) = queue.pop_front() {
        for next in edges.get(current).into_iter().flatten() {
            if edges.contains_key(next) && seen.insert(next) {
                queue.push_back(next);
            }
        }
    }

    definition
        .steps
        .iter()
        .map(|s| s.id.as_str())
        .filter(|id| !seen.contains(id))
        .collect()
}
