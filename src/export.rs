//! JSON dumps written by `pop populate`.
//!
//! `--dump` writes the assembled records keyed by project id, the same
//! shape the store receives. `--network-dump` writes the raw payload of
//! every source, keyed by project id and then source name, which is the
//! first thing to look at when a parser disagrees with upstream data.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;

use crate::models::{AssembledProject, SourceResponses};

/// Write assembled records as a pretty JSON object keyed by project id.
pub fn write_dump(path: &Path, projects: &[AssembledProject]) -> Result<()> {
    let mut document = Map::new();
    for project in projects {
        document.insert(project.id.clone(), serde_json::to_value(project)?);
    }
    write_json(path, &Value::Object(document))?;
    eprintln!("Dumped {} project(s) to {}", projects.len(), path.display());
    Ok(())
}

/// Write raw source payloads keyed by project id, then source name.
pub fn write_network_dump(path: &Path, responses: &[(&str, &SourceResponses)]) -> Result<()> {
    let mut document = Map::new();
    for (id, responses) in responses {
        document.insert(id.to_string(), serde_json::to_value(responses)?);
    }
    write_json(path, &Value::Object(document))?;
    eprintln!(
        "Dumped network responses of {} project(s) to {}",
        responses.len(),
        path.display()
    );
    Ok(())
}

/// Pretty-print `value` to `path`, or to stdout when `path` is `-`.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;

    if path == Path::new("-") {
        println!("{}", json);
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
