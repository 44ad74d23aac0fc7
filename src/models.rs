//! Core data models used throughout the populate pipeline.
//!
//! These types describe the fields of a project record, the typed values
//! that fill them, where each value came from, and the assembled record
//! that is handed to the project store.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::source_github::GitHubResponse;
use crate::source_npm::NpmResponse;

/// One of the fixed set of fields a project record carries.
///
/// The declaration order is the resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldName {
    Name,
    Description,
    Lifespan,
    LatestRelease,
    Links,
    PageContents,
    Downloads,
}

impl FieldName {
    /// Every field, in resolution order.
    pub const ALL: [FieldName; 7] = [
        FieldName::Name,
        FieldName::Description,
        FieldName::Lifespan,
        FieldName::LatestRelease,
        FieldName::Links,
        FieldName::PageContents,
        FieldName::Downloads,
    ];

    /// Fields that must resolve to a value or the whole project fails.
    pub const REQUIRED: [FieldName; 3] =
        [FieldName::Name, FieldName::Description, FieldName::Lifespan];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldName::Name => "name",
            FieldName::Description => "description",
            FieldName::Lifespan => "lifespan",
            FieldName::LatestRelease => "latestRelease",
            FieldName::Links => "links",
            FieldName::PageContents => "pageContents",
            FieldName::Downloads => "downloads",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == name)
    }

    pub fn is_required(self) -> bool {
        Self::REQUIRED.contains(&self)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a project was started and, unless it is still ongoing, when it ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Lifespan {
    pub begun: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended: Option<DateTime<Utc>>,
}

/// The most recently published release of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Release {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_prerelease: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Github,
    Npm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Link {
    #[serde(rename = "type")]
    pub kind: LinkKind,
    pub url: String,
}

/// Body of the project page: Markdown text or pre-rendered markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageContents {
    Markdown(String),
    Rich {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        html: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        css: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadKind {
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Macos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Download {
    #[serde(rename = "type")]
    pub kind: DownloadKind,
    pub platform: Platform,
    pub url: String,
}

/// A typed value for exactly one [`FieldName`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Name(String),
    Description(String),
    Lifespan(Lifespan),
    LatestRelease(Release),
    Links(Vec<Link>),
    PageContents(PageContents),
    Downloads(Vec<Download>),
}

impl FieldValue {
    /// The field this value belongs to.
    pub fn field_name(&self) -> FieldName {
        match self {
            FieldValue::Name(_) => FieldName::Name,
            FieldValue::Description(_) => FieldName::Description,
            FieldValue::Lifespan(_) => FieldName::Lifespan,
            FieldValue::LatestRelease(_) => FieldName::LatestRelease,
            FieldValue::Links(_) => FieldName::Links,
            FieldValue::PageContents(_) => FieldName::PageContents,
            FieldValue::Downloads(_) => FieldName::Downloads,
        }
    }

    /// Decode a literal JSON value into the shape required by `field`.
    pub fn from_json(
        field: FieldName,
        value: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        Ok(match field {
            FieldName::Name => FieldValue::Name(serde_json::from_value(value)?),
            FieldName::Description => FieldValue::Description(serde_json::from_value(value)?),
            FieldName::Lifespan => FieldValue::Lifespan(serde_json::from_value(value)?),
            FieldName::LatestRelease => FieldValue::LatestRelease(serde_json::from_value(value)?),
            FieldName::Links => FieldValue::Links(serde_json::from_value(value)?),
            FieldName::PageContents => FieldValue::PageContents(serde_json::from_value(value)?),
            FieldName::Downloads => FieldValue::Downloads(serde_json::from_value(value)?),
        })
    }
}

/// Where the final value of a field came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    /// The instruction supplied the value literally.
    Literal,
    /// A configured source supplied the value.
    Source(String),
}

impl Provenance {
    pub const LITERAL_LABEL: &'static str = "self";

    pub fn source(name: impl Into<String>) -> Self {
        Provenance::Source(name.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Provenance::Literal => Self::LITERAL_LABEL,
            Provenance::Source(name) => name,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Provenance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Per-project map of field name to the source of its final value.
///
/// Fields that never resolved to a value may be missing from the map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ProvenanceMap(BTreeMap<FieldName, Provenance>);

impl ProvenanceMap {
    /// A map with the required fields attributed to the instruction itself.
    pub fn seeded() -> Self {
        Self(
            FieldName::REQUIRED
                .into_iter()
                .map(|field| (field, Provenance::Literal))
                .collect(),
        )
    }

    pub fn record(&mut self, field: FieldName, provenance: Provenance) {
        self.0.insert(field, provenance);
    }

    pub fn get(&self, field: FieldName) -> Option<&Provenance> {
        self.0.get(&field)
    }

    pub fn contains(&self, field: FieldName) -> bool {
        self.0.contains_key(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldName, &Provenance)> {
        self.0.iter().map(|(field, provenance)| (*field, provenance))
    }
}

/// Decoded payload of one fetch call against one source.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RawResponse {
    GitHub(GitHubResponse),
    Npm(NpmResponse),
    /// Payload of a source without a dedicated response type.
    Json(serde_json::Value),
}

/// Responses of every configured source of one project, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct SourceResponses {
    entries: Vec<(String, RawResponse)>,
}

impl SourceResponses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: impl Into<String>, response: RawResponse) {
        let source = source.into();
        match self.entries.iter_mut().find(|(name, _)| *name == source) {
            Some(entry) => entry.1 = response,
            None => self.entries.push((source, response)),
        }
    }

    pub fn get(&self, source: &str) -> Option<&RawResponse> {
        self.entries
            .iter()
            .find(|(name, _)| name == source)
            .map(|(_, response)| response)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawResponse)> {
        self.entries
            .iter()
            .map(|(name, response)| (name.as_str(), response))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, RawResponse)> for SourceResponses {
    fn from_iter<I: IntoIterator<Item = (String, RawResponse)>>(iter: I) -> Self {
        let mut responses = Self::new();
        for (name, response) in iter {
            responses.insert(name, response);
        }
        responses
    }
}

impl Serialize for SourceResponses {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, response) in &self.entries {
            map.serialize_entry(name, response)?;
        }
        map.end()
    }
}

/// The resolved fields of a project.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCore {
    pub name: String,
    pub description: String,
    pub lifespan: Lifespan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_release: Option<Release>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<Link>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_contents: Option<PageContents>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads: Option<Vec<Download>>,
}

/// A configured source together with the moment its data was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMetadata {
    pub name: String,
    pub config: serde_json::Value,
    pub refreshed_at: DateTime<Utc>,
}

/// The `_sources` block of an assembled record.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcesMetadata {
    pub self_modified_at: DateTime<Utc>,
    pub sources: Vec<SourceMetadata>,
}

impl Serialize for SourcesMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sources.len() + 1))?;
        let mut own = BTreeMap::new();
        own.insert("modifiedAt", self.self_modified_at);
        map.serialize_entry(Provenance::LITERAL_LABEL, &own)?;
        for source in &self.sources {
            let mut entry = match &source.config {
                serde_json::Value::Object(fields) => fields.clone(),
                other => {
                    let mut fields = serde_json::Map::new();
                    fields.insert("config".to_string(), other.clone());
                    fields
                }
            };
            entry.insert(
                "refreshedAt".to_string(),
                serde_json::to_value(source.refreshed_at).map_err(serde::ser::Error::custom)?,
            );
            map.serialize_entry(&source.name, &entry)?;
        }
        map.end()
    }
}

/// Output of one successful assembly. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledProject {
    #[serde(skip)]
    pub id: String,
    #[serde(flatten)]
    pub core: ProjectCore,
    #[serde(rename = "_modifiedAt")]
    pub modified_at: DateTime<Utc>,
    #[serde(rename = "_sources")]
    pub sources: SourcesMetadata,
    #[serde(rename = "_sourceMap")]
    pub source_map: ProvenanceMap,
}
