//! Per-project populate instructions.
//!
//! An instruction file maps project ids to instructions. Each instruction
//! gives, per field, either a literal value or a directive naming the
//! source that should supply it, plus the configuration of every source
//! the project uses:
//!
//! ```json
//! {
//!   "tool": {
//!     "name": "_github",
//!     "description": "A literal description",
//!     "_sources": { "github": { "owner": "acme", "repo": "tool" } }
//!   }
//! }
//! ```

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ValidationError;
use crate::models::{FieldName, FieldValue};
use crate::traits::SourceRegistry;

/// Key holding the per-source configuration map.
pub const SOURCES_KEY: &str = "_sources";

/// What an instruction says about one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEntry {
    /// Use this value as-is.
    Literal(FieldValue),
    /// Ask the named source for the value.
    Directive(String),
}

/// Configuration for one source, opaque outside that source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub name: String,
    pub config: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Instruction {
    fields: BTreeMap<FieldName, FieldEntry>,
    sources: Vec<SourceConfig>,
}

impl Instruction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn literal(mut self, value: FieldValue) -> Self {
        self.fields
            .insert(value.field_name(), FieldEntry::Literal(value));
        self
    }

    pub fn directive(mut self, field: FieldName, source: impl Into<String>) -> Self {
        self.fields
            .insert(field, FieldEntry::Directive(source.into()));
        self
    }

    /// Configure a source. Sources are consulted in the order they are added.
    pub fn source(mut self, name: impl Into<String>, config: Value) -> Self {
        let name = name.into();
        self.sources.retain(|source| source.name != name);
        self.sources.push(SourceConfig { name, config });
        self
    }

    pub fn entry(&self, field: FieldName) -> Option<&FieldEntry> {
        self.fields.get(&field)
    }

    pub fn entries(&self) -> impl Iterator<Item = (FieldName, &FieldEntry)> {
        self.fields.iter().map(|(field, entry)| (*field, entry))
    }

    /// Configured sources, in configuration order.
    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    pub fn source_config(&self, name: &str) -> Option<&Value> {
        self.sources
            .iter()
            .find(|source| source.name == name)
            .map(|source| &source.config)
    }

    pub fn is_configured(&self, name: &str) -> bool {
        self.source_config(name).is_some()
    }

    /// Decode one project's instruction from its JSON form.
    pub fn from_json(
        id: &str,
        value: &Value,
        registry: &SourceRegistry,
    ) -> Result<Self, ValidationError> {
        let object = value
            .as_object()
            .ok_or_else(|| ValidationError::malformed(id, "instruction must be a JSON object"))?;

        let mut instruction = Self::new();
        for (key, value) in object {
            if key == SOURCES_KEY {
                instruction.sources = parse_sources(id, value, registry)?;
                continue;
            }

            let field = FieldName::parse(key)
                .ok_or_else(|| ValidationError::malformed(id, format!("unknown field '{}'", key)))?;
            if value.is_null() {
                continue;
            }

            let entry = match value
                .as_str()
                .and_then(|text| registry.find_by_directive(text))
            {
                Some(source) => FieldEntry::Directive(source.name().to_string()),
                None => FieldValue::from_json(field, value.clone())
                    .map(FieldEntry::Literal)
                    .map_err(|e| {
                        ValidationError::malformed(id, format!("field '{}': {}", field, e))
                    })?,
            };
            instruction.fields.insert(field, entry);
        }

        Ok(instruction)
    }
}

fn parse_sources(
    id: &str,
    value: &Value,
    registry: &SourceRegistry,
) -> Result<Vec<SourceConfig>, ValidationError> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    let object = value.as_object().ok_or_else(|| {
        ValidationError::malformed(id, format!("'{}' must be a JSON object", SOURCES_KEY))
    })?;

    object
        .iter()
        .map(|(name, config)| {
            let source = registry
                .get(name)
                .ok_or_else(|| ValidationError::UnknownSource {
                    id: id.to_string(),
                    source_name: name.clone(),
                })?;
            source.check_config(config).map_err(|reason| {
                ValidationError::malformed(
                    id,
                    format!("invalid {} configuration: {}", source.fancy_name(), reason),
                )
            })?;
            Ok(SourceConfig {
                name: name.clone(),
                config: config.clone(),
            })
        })
        .collect()
}

/// Read an instruction file, keeping projects in file order.
pub fn load_instructions(path: &Path) -> Result<Vec<(String, Value)>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read instructions file: {}", path.display()))?;
    let document: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse instructions file: {}", path.display()))?;

    match document {
        Value::Object(projects) => Ok(projects.into_iter().collect()),
        _ => anyhow::bail!(
            "Instructions file must contain a JSON object keyed by project id: {}",
            path.display()
        ),
    }
}
