//! Definition document parser.
//!
//! Parses YAML or JSON documents into [`Definition`] structures. Parsing only
//! checks shape; structural rules live in the validator.

use std::path::Path;

use crate::error::{EngineError, EngineResult};

use super::types::Definition;

/// Parse a YAML document into a Definition.
pub fn parse_definition_yaml(content: &str) -> EngineResult<Definition> {
    serde_yaml::from_str(content).map_err(|e| EngineError::Parse(e.to_string()))
}

/// Parse a JSON document into a Definition.
pub fn parse_definition_json(content: &str) -> EngineResult<Definition> {
    serde_json::from_str(content).map_err(|e| EngineError::Parse(e.to_string()))
}

/// Parse a document, picking the format from its first significant character.
pub fn parse_definition(content: &str) -> EngineResult<Definition> {
    if content.trim_start().starts_with('{') {
        parse_definition_json(content)
    } else {
        parse_definition_yaml(content)
    }
}

/// Read and parse a definition file.
pub fn load_definition_file(path: &Path) -> EngineResult<Definition> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Parse(format!("{}: {}", path.display(), e)))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_definition_json(&content),
        Some("yaml") | Some("yml") => parse_definition_yaml(&content),
        _ => parse_definition(&content),
    }
}
