//! Project assembly: fetch every configured source once, resolve every
//! field, and stamp the record with its metadata.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::debug;

use crate::error::{AssemblyError, FetchError, ResolveError};
use crate::instruction::Instruction;
use crate::models::{
    AssembledProject, Download, FieldName, FieldValue, Lifespan, Link, PageContents, ProjectCore,
    ProvenanceMap, RawResponse, Release, SourceMetadata, SourceResponses, SourcesMetadata,
};
use crate::resolve::FieldResolver;
use crate::traits::SourceRegistry;

/// Source of the current time for metadata stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub struct Assembler<'a> {
    registry: &'a SourceRegistry,
    clock: &'a dyn Clock,
}

impl<'a> Assembler<'a> {
    pub fn new(registry: &'a SourceRegistry, clock: &'a dyn Clock) -> Self {
        Self { registry, clock }
    }

    /// Assemble one project. The instruction is expected to have passed
    /// validation already.
    pub async fn assemble(
        &self,
        id: &str,
        instruction: &Instruction,
    ) -> Result<AssembledProject, AssemblyError> {
        let responses = self.fetch_all(id, instruction).await?;
        self.assemble_with_responses(id, instruction, &responses)
    }

    /// Fetch every configured source concurrently, once each.
    ///
    /// The first failure fails the whole project.
    pub async fn fetch_all(
        &self,
        id: &str,
        instruction: &Instruction,
    ) -> Result<SourceResponses, FetchError> {
        let sources = instruction.sources();
        let fetches = stream::iter(sources).map(|config| async move {
            let source = self.registry.get(&config.name).ok_or_else(|| {
                FetchError::config(id, &config.name, "source is not registered")
            })?;
            let response = source.fetch(id, &config.config).await?;
            if tracing::enabled!(tracing::Level::DEBUG) {
                debug!(
                    "[{}] {} payload: {}",
                    id,
                    source.fancy_name(),
                    serde_json::to_string(&response).unwrap_or_default()
                );
            }
            Ok::<_, FetchError>((config.name.clone(), response))
        });

        let responses: Vec<(String, RawResponse)> =
            fetches.buffered(sources.len().max(1)).try_collect().await?;
        Ok(responses.into_iter().collect())
    }

    /// Resolve every field from already fetched responses and attach metadata.
    pub fn assemble_with_responses(
        &self,
        id: &str,
        instruction: &Instruction,
        responses: &SourceResponses,
    ) -> Result<AssembledProject, AssemblyError> {
        let (core, source_map) = self.resolve(id, instruction, responses)?;

        let now = self.clock.now();
        let sources = instruction
            .sources()
            .iter()
            .map(|config| SourceMetadata {
                name: config.name.clone(),
                config: config.config.clone(),
                refreshed_at: now,
            })
            .collect();

        Ok(AssembledProject {
            id: id.to_string(),
            core,
            modified_at: now,
            sources: SourcesMetadata {
                self_modified_at: now,
                sources,
            },
            source_map,
        })
    }

    /// Resolve every field in [`FieldName::ALL`] order.
    pub fn resolve(
        &self,
        id: &str,
        instruction: &Instruction,
        responses: &SourceResponses,
    ) -> Result<(ProjectCore, ProvenanceMap), ResolveError> {
        let resolver = FieldResolver::new(id, instruction, responses, self.registry);
        let mut source_map = ProvenanceMap::seeded();
        let mut slots = CoreSlots::default();

        for field in FieldName::ALL {
            if let Some(value) = resolver.resolve(field, &mut source_map)? {
                slots.fill(value);
            }
        }

        Ok((slots.finish(id)?, source_map))
    }
}

#[derive(Default)]
struct CoreSlots {
    name: Option<String>,
    description: Option<String>,
    lifespan: Option<Lifespan>,
    latest_release: Option<Release>,
    links: Option<Vec<Link>>,
    page_contents: Option<PageContents>,
    downloads: Option<Vec<Download>>,
}

impl CoreSlots {
    fn fill(&mut self, value: FieldValue) {
        match value {
            FieldValue::Name(v) => self.name = Some(v),
            FieldValue::Description(v) => self.description = Some(v),
            FieldValue::Lifespan(v) => self.lifespan = Some(v),
            FieldValue::LatestRelease(v) => self.latest_release = Some(v),
            FieldValue::Links(v) => self.links = Some(v),
            FieldValue::PageContents(v) => self.page_contents = Some(v),
            FieldValue::Downloads(v) => self.downloads = Some(v),
        }
    }

    fn finish(self, id: &str) -> Result<ProjectCore, ResolveError> {
        let missing = |field| ResolveError::RequiredFieldUnresolvable {
            id: id.to_string(),
            field,
        };
        Ok(ProjectCore {
            name: self.name.ok_or_else(|| missing(FieldName::Name))?,
            description: self
                .description
                .ok_or_else(|| missing(FieldName::Description))?,
            lifespan: self.lifespan.ok_or_else(|| missing(FieldName::Lifespan))?,
            latest_release: self.latest_release,
            links: self.links,
            page_contents: self.page_contents,
            downloads: self.downloads,
        })
    }
}
