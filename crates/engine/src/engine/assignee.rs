//! Assignee resolution.
//!
//! Decides who owns a newly created task. Resolution order, first match wins:
//! 1. fixed principal on the step
//! 2. instance data field holding a principal ID
//! 3. role, via the directory (smallest candidate ID)
//! 4. the principal triggering the action

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::definition::AssignmentRule;
use crate::directory::Directory;
use crate::error::EngineResult;

use super::state::InstanceData;

/// Outcome of resolving an assignment rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Owning principal; `None` leaves the task unassigned.
    pub principal: Option<String>,
    /// Role the task was assigned through, if any.
    pub role: Option<String>,
}

/// Resolves assignment rules to principals.
#[derive(Clone)]
pub struct AssigneeResolver {
    directory: Arc<dyn Directory>,
    timeout: Duration,
}

impl AssigneeResolver {
    pub fn new(directory: Arc<dyn Directory>, timeout: Duration) -> Self {
        Self { directory, timeout }
    }

    /// Resolve `rule` for a task created on behalf of `current_principal`.
    pub async fn resolve(
        &self,
        rule: Option<&AssignmentRule>,
        data: &InstanceData,
        current_principal: &str,
    ) -> EngineResult<Assignment> {
        let fallback = Assignment {
            principal: Some(current_principal.to_string()),
            role: None,
        };

        let rule = match rule {
            Some(rule) => rule,
            None => return Ok(fallback),
        };

        if let Some(principal) = rule.principal.as_deref().filter(|p| !p.is_empty()) {
            return Ok(Assignment {
                principal: Some(principal.to_string()),
                role: None,
            });
        }

        if let Some(field) = &rule.field {
            if let Some(principal) = data.get(field).and_then(principal_from_value) {
                return Ok(Assignment {
                    principal: Some(principal),
                    role: None,
                });
            }
            debug!(field = %field, "Assignment field missing from instance data");
        }

        if let Some(role) = rule.role.as_deref().filter(|r| !r.is_empty()) {
            let mut candidates = tokio::time::timeout(
                self.timeout,
                self.directory.find_principals_by_role(role),
            )
            .await??;
            candidates.sort();

            let principal = candidates.into_iter().next();
            if principal.is_none() {
                debug!(role = %role, "No directory candidate for role, task stays unassigned");
            }
            return Ok(Assignment {
                principal,
                role: Some(role.to_string()),
            });
        }

        Ok(fallback)
    }
}

fn principal_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
