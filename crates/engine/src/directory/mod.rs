//! Role and identity resolution.
//!
//! The engine never authenticates anyone; it only asks the directory which
//! principals hold a role.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{EngineError, EngineResult};

/// Directory collaborator.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Principals holding `role`.
    async fn find_principals_by_role(&self, role: &str) -> EngineResult<Vec<String>>;

    /// Whether `principal` holds `role`.
    async fn principal_has_role(&self, principal: &str, role: &str) -> EngineResult<bool>;
}

/// YAML layout accepted by [`StaticDirectory::from_yaml`].
#[derive(Debug, Default, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    roles: HashMap<String, Vec<String>>,
}

/// In-process directory backed by a role table.
///
/// Candidates are returned in lexicographic order, so role assignment
/// always picks the smallest principal ID.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    roles: HashMap<String, BTreeSet<String>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every principal in `principals` to `role`.
    pub fn with_role<I, S>(mut self, role: &str, principals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let members = self.roles.entry(role.to_string()).or_default();
        members.extend(principals.into_iter().map(Into::into));
        self
    }

    pub fn grant(&mut self, role: &str, principal: &str) {
        self.roles
            .entry(role.to_string())
            .or_default()
            .insert(principal.to_string());
    }

    /// Parse a `roles: { role: [principal, ...] }` document.
    pub fn from_yaml(content: &str) -> EngineResult<Self> {
        let file: DirectoryFile =
            serde_yaml::from_str(content).map_err(|e| EngineError::Parse(e.to_string()))?;

        let roles = file
            .roles
            .into_iter()
            .map(|(role, members)| (role, members.into_iter().collect()))
            .collect();

        Ok(Self { roles })
    }

    /// Load a directory file.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// Roles held by `principal`, sorted.
    pub fn roles_of(&self, principal: &str) -> Vec<&str> {
        let mut roles: Vec<&str> = self
            .roles
            .iter()
            .filter(|(_, members)| members.contains(principal))
            .map(|(role, _)| role.as_str())
            .collect();
        roles.sort_unstable();
        roles
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn find_principals_by_role(&self, role: &str) -> EngineResult<Vec<String>> {
        Ok(self
            .roles
            .get(role)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn principal_has_role(&self, principal: &str, role: &str) -> EngineResult<bool> {
        Ok(self
            .roles
            .get(role)
            .is_some_and(|members| members.contains(principal)))
    }
}
