//! Batch driver behind `pop populate` and `pop validate`.
//!
//! Every project in the instruction file is parsed, validated and
//! assembled independently, with a bounded number in flight at once. If
//! any project fails the whole batch is aborted before anything reaches
//! the store, so a partially populated collection never happens.

use anyhow::{bail, Context, Result};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{error, info};

use crate::assemble::{Assembler, Clock, SystemClock};
use crate::config::Config;
use crate::error::AssemblyError;
use crate::export;
use crate::instruction::{load_instructions, Instruction};
use crate::models::{AssembledProject, SourceResponses};
use crate::store::{ProjectStore, PutOutcome, SqliteProjectStore};
use crate::traits::SourceRegistry;
use crate::validate::InstructionValidator;

#[derive(Debug, Clone, Default)]
pub struct PopulateOptions {
    /// Instruction file; falls back to `populate.instructions` from the config.
    pub instructions: Option<PathBuf>,
    /// Restrict the batch to these project ids.
    pub only: Vec<String>,
    pub dry_run: bool,
    pub dump: Option<PathBuf>,
    pub network_dump: Option<PathBuf>,
}

/// A successfully assembled project and the responses it was built from.
#[derive(Debug)]
pub struct Assembled {
    pub project: AssembledProject,
    pub responses: SourceResponses,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub assembled: Vec<Assembled>,
    pub failures: Vec<AssemblyError>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.assembled.len() + self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Parse, validate and assemble one project.
pub async fn populate_project(
    id: &str,
    value: &Value,
    registry: &SourceRegistry,
    clock: &dyn Clock,
) -> Result<Assembled, AssemblyError> {
    let instruction = Instruction::from_json(id, value, registry)?;
    InstructionValidator::new(registry).validate(id, &instruction)?;

    let assembler = Assembler::new(registry, clock);
    let responses = assembler.fetch_all(id, &instruction).await?;
    let project = assembler.assemble_with_responses(id, &instruction, &responses)?;

    info!(
        "[{}] assembled \"{}\" from {} source(s)",
        id,
        project.core.name,
        responses.len()
    );
    Ok(Assembled { project, responses })
}

/// Assemble every project, at most `concurrency` at a time, keeping input order.
pub async fn populate_projects(
    entries: &[(String, Value)],
    registry: &SourceRegistry,
    clock: &dyn Clock,
    concurrency: usize,
) -> BatchReport {
    let results: Vec<Result<Assembled, AssemblyError>> = stream::iter(entries)
        .map(|(id, value)| populate_project(id, value, registry, clock))
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut report = BatchReport::default();
    for result in results {
        match result {
            Ok(assembled) => report.assembled.push(assembled),
            Err(err) => {
                error!("{}", err);
                report.failures.push(err);
            }
        }
    }
    report
}

/// Hand every project to the store.
pub async fn write_projects(
    store: &dyn ProjectStore,
    collection: &str,
    projects: &[AssembledProject],
) -> Result<WriteSummary> {
    let mut summary = WriteSummary::default();
    for project in projects {
        let outcome = store
            .put(collection, project)
            .await
            .with_context(|| format!("Failed to store project '{}'", project.id))?;
        match outcome {
            PutOutcome::Created => summary.created += 1,
            PutOutcome::Updated => summary.updated += 1,
            PutOutcome::Unchanged => summary.unchanged += 1,
        }
    }
    Ok(summary)
}

fn instructions_path(config: &Config, explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit.or_else(|| config.populate.instructions.clone()) {
        Some(path) => Ok(path),
        None => bail!("No instructions file given: pass --instructions or set populate.instructions"),
    }
}

fn select(entries: Vec<(String, Value)>, only: &[String]) -> Result<Vec<(String, Value)>> {
    if only.is_empty() {
        return Ok(entries);
    }
    if let Some(missing) = only.iter().find(|id| !entries.iter().any(|(e, _)| e == *id)) {
        bail!("project not found in instructions: {}", missing);
    }
    Ok(entries
        .into_iter()
        .filter(|(id, _)| only.contains(id))
        .collect())
}

pub async fn run_populate(config: &Config, options: PopulateOptions) -> Result<()> {
    let path = instructions_path(config, options.instructions.clone())?;
    let entries = select(load_instructions(&path)?, &options.only)?;
    let registry = SourceRegistry::from_config(config)?;

    let report = populate_projects(
        &entries,
        &registry,
        &SystemClock,
        config.populate.concurrency,
    )
    .await;

    if let Some(network_dump) = &options.network_dump {
        let responses: Vec<(&str, &SourceResponses)> = report
            .assembled
            .iter()
            .map(|a| (a.project.id.as_str(), &a.responses))
            .collect();
        export::write_network_dump(network_dump, &responses)?;
    }

    if !report.is_success() {
        bail!(
            "{} of {} projects failed to assemble. Batch aborted.",
            report.failures.len(),
            report.total()
        );
    }

    let projects: Vec<AssembledProject> =
        report.assembled.into_iter().map(|a| a.project).collect();

    if let Some(dump) = &options.dump {
        export::write_dump(dump, &projects)?;
    }

    if options.dry_run {
        println!("populate {} (dry-run)", config.store.collection);
        println!("  projects assembled: {}", projects.len());
        println!("ok");
        return Ok(());
    }

    let store = SqliteProjectStore::open(config).await?;
    let summary = write_projects(&store, &config.store.collection, &projects).await;
    store.close().await;
    let summary = summary?;

    println!("populate {}", config.store.collection);
    println!("  projects assembled: {}", projects.len());
    println!("  created: {}", summary.created);
    println!("  updated: {}", summary.updated);
    println!("  unchanged: {}", summary.unchanged);
    println!("ok");

    Ok(())
}

/// Parse and validate every instruction without contacting any source.
pub async fn run_validate(
    config: &Config,
    instructions: Option<PathBuf>,
    only: &[String],
) -> Result<()> {
    let path = instructions_path(config, instructions)?;
    let entries = select(load_instructions(&path)?, only)?;
    let registry = SourceRegistry::from_config(config)?;
    let validator = InstructionValidator::new(&registry);

    let mut failures = 0;
    for (id, value) in &entries {
        let result = Instruction::from_json(id, value, &registry)
            .and_then(|instruction| validator.validate(id, &instruction).map(|_| ()));
        if let Err(err) = result {
            error!("{}", err);
            failures += 1;
        }
    }

    if failures > 0 {
        bail!(
            "{} of {} instructions are invalid",
            failures,
            entries.len()
        );
    }

    println!("validate {}", path.display());
    println!("  instructions: {}", entries.len());
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_keeps_order_and_rejects_unknown_ids() {
        let entries = vec![
            ("a".to_string(), json!({})),
            ("b".to_string(), json!({})),
            ("c".to_string(), json!({})),
        ];

        let all = select(entries.clone(), &[]).unwrap();
        assert_eq!(all.len(), 3);

        let picked = select(entries.clone(), &["c".to_string(), "a".to_string()]).unwrap();
        let ids: Vec<&str> = picked.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        assert!(select(entries, &["z".to_string()]).is_err());
    }

    #[test]
    fn test_instructions_path_falls_back_to_config() {
        let mut config = Config::minimal("pop.sqlite");
        assert!(instructions_path(&config, None).is_err());

        config.populate.instructions = Some(PathBuf::from("from-config.json"));
        assert_eq!(
            instructions_path(&config, None).unwrap(),
            PathBuf::from("from-config.json")
        );
        assert_eq!(
            instructions_path(&config, Some(PathBuf::from("cli.json"))).unwrap(),
            PathBuf::from("cli.json")
        );
    }
}
