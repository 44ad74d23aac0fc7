//! The source adapter trait and the registry that holds the known sources.
//!
//! A source is an external system that can be asked once per project for
//! a raw response, and then asked to derive typed field values from that
//! response. Built-in sources cover a code host ([`GitHubSource`]) and a
//! package registry ([`NpmSource`]); custom sources can be added through
//! [`SourceRegistry::register`].
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │            SourceRegistry            │
//! │  ┌─────────┐ ┌─────────┐ ┌────────┐  │
//! │  │ github  │ │   npm   │ │ custom │  │
//! │  └─────────┘ └─────────┘ └────────┘  │
//! └──────────────┬───────────────────────┘
//!                ▼
//!     validate → fetch → resolve → assemble
//! ```
//!
//! [`GitHubSource`]: crate::source_github::GitHubSource
//! [`NpmSource`]: crate::source_npm::NpmSource

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::Config;
use crate::error::{FetchError, ParseError};
use crate::models::{FieldName, FieldValue, RawResponse};

/// Prefix that turns a source name into a field directive (`"_github"`).
pub const DIRECTIVE_PREFIX: char = '_';

/// An external system that can supply project fields.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use project_populate::error::{FetchError, ParseError};
/// use project_populate::models::{FieldName, FieldValue, RawResponse};
/// use project_populate::traits::Source;
/// use serde_json::Value;
///
/// pub struct StaticSource;
///
/// #[async_trait]
/// impl Source for StaticSource {
///     fn name(&self) -> &str { "static" }
///     fn fancy_name(&self) -> &str { "Static" }
///     fn supported_fields(&self) -> &[FieldName] { &[FieldName::Description] }
///
///     async fn fetch(&self, _id: &str, config: &Value) -> Result<RawResponse, FetchError> {
///         Ok(RawResponse::Json(config.clone()))
///     }
///
///     fn parse(&self, field: FieldName, id: &str, response: &RawResponse)
///         -> Result<FieldValue, ParseError>
///     {
///         match (field, response) {
///             (FieldName::Description, RawResponse::Json(value)) => value["text"]
///                 .as_str()
///                 .map(|text| FieldValue::Description(text.to_string()))
///                 .ok_or_else(|| ParseError::failed(id, field, self.name(), "no text")),
///             _ => Err(ParseError::unsupported(id, field, self.name())),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Source: Send + Sync {
    /// Identifier used as the key under `_sources` and in provenance.
    fn name(&self) -> &str;

    /// Human readable name for log lines and listings.
    fn fancy_name(&self) -> &str;

    /// The string an instruction uses to direct a field to this source.
    fn directive(&self) -> String {
        format!("{}{}", DIRECTIVE_PREFIX, self.name())
    }

    /// The fields [`parse`](Source::parse) can produce.
    fn supported_fields(&self) -> &[FieldName];

    fn supports_field(&self, field: FieldName) -> bool {
        self.supported_fields().contains(&field)
    }

    /// Check a per-project configuration without touching the network.
    fn check_config(&self, _config: &Value) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Retrieve the raw response for one project.
    ///
    /// Called at most once per project per assembly.
    async fn fetch(&self, id: &str, config: &Value) -> std::result::Result<RawResponse, FetchError>;

    /// Derive one field value from a previously fetched response.
    ///
    /// Pure: no network access, and the same response always yields the
    /// same result.
    fn parse(
        &self,
        field: FieldName,
        id: &str,
        response: &RawResponse,
    ) -> std::result::Result<FieldValue, ParseError>;
}

/// A parser for one field of a response type `R`.
pub type FieldParser<R> = fn(&str, &R) -> std::result::Result<FieldValue, ParseError>;

/// Static table mapping each supported field to its parser.
pub type ParserTable<R> = &'static [(FieldName, FieldParser<R>)];

/// Look up and run the parser for `field`.
pub fn dispatch<R>(
    table: ParserTable<R>,
    source_name: &str,
    field: FieldName,
    id: &str,
    response: &R,
) -> std::result::Result<FieldValue, ParseError> {
    let parser = table
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, parser)| parser)
        .ok_or_else(|| ParseError::unsupported(id, field, source_name))?;
    parser(id, response)
}

/// Registry of the sources available to instructions.
///
/// Use [`SourceRegistry::from_config`] for the built-in sources, then
/// optionally call [`register`](SourceRegistry::register) to add custom ones.
pub struct SourceRegistry {
    sources: Vec<Box<dyn Source>>,
}

impl SourceRegistry {
    /// Create an empty source registry.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Create a registry pre-loaded with the built-in sources.
    pub fn from_config(config: &Config) -> Result<Self> {
        use crate::source_github::GitHubSource;
        use crate::source_npm::NpmSource;

        let mut registry = Self::new();
        registry.register(Box::new(GitHubSource::from_config(
            http_client(config.sources.github.timeout_secs)?,
            &config.sources.github,
        )?));
        registry.register(Box::new(NpmSource::from_config(
            http_client(config.sources.npm.timeout_secs)?,
            &config.sources.npm,
        )?));

        Ok(registry)
    }

    /// Register a source. A later source with the same name replaces the earlier one.
    pub fn register(&mut self, source: Box<dyn Source>) {
        self.sources.retain(|existing| existing.name() != source.name());
        self.sources.push(source);
    }

    /// Get all registered sources.
    pub fn sources(&self) -> &[Box<dyn Source>] {
        &self.sources
    }

    /// Find a source by name.
    pub fn get(&self, name: &str) -> Option<&dyn Source> {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    /// Find the source a directive string points at.
    pub fn find_by_directive(&self, directive: &str) -> Option<&dyn Source> {
        self.sources
            .iter()
            .find(|s| s.directive() == directive)
            .map(|s| s.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("pop/", env!("CARGO_PKG_VERSION")))
        .build()?)
}
