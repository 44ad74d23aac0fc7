//! Error taxonomy for the populate pipeline.
//!
//! Every error names the project it concerns, and the field it concerns
//! where one applies, so a batch report can point at the exact entry that
//! went wrong.

use thiserror::Error;

use crate::models::FieldName;

fn join_fields(fields: &[FieldName]) -> String {
    fields
        .iter()
        .map(|field| field.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// An instruction was rejected before any network activity.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("[{id}] required field(s) cannot be resolved: {}", join_fields(.fields))]
    UnresolvableRequiredFields { id: String, fields: Vec<FieldName> },

    #[error("[{id}] field '{field}' is directed to source '{source_name}', which is not configured for this project")]
    MissingSourceConfiguration {
        id: String,
        field: FieldName,
        source_name: String,
    },

    #[error("[{id}] source '{source_name}' does not support field '{field}'")]
    UnsupportedSourceDirective {
        id: String,
        field: FieldName,
        source_name: String,
    },

    #[error("[{id}] unknown source '{source_name}'")]
    UnknownSource { id: String, source_name: String },

    #[error("[{id}] malformed instruction: {reason}")]
    Malformed { id: String, reason: String },
}

impl ValidationError {
    pub fn malformed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::UnresolvableRequiredFields { id, .. }
            | Self::MissingSourceConfiguration { id, .. }
            | Self::UnsupportedSourceDirective { id, .. }
            | Self::UnknownSource { id, .. }
            | Self::Malformed { id, .. } => id,
        }
    }
}

/// A source could not deliver its raw response.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("[{id}] request to {source_name} failed: {error}")]
    Request {
        id: String,
        source_name: String,
        #[source]
        error: reqwest::Error,
    },

    #[error("[{id}] {source_name} answered with HTTP {status}")]
    Status {
        id: String,
        source_name: String,
        status: u16,
    },

    #[error("[{id}] {source_name} returned an unusable response: {reason}")]
    Decode {
        id: String,
        source_name: String,
        reason: String,
    },

    #[error("[{id}] invalid {source_name} configuration: {reason}")]
    Config {
        id: String,
        source_name: String,
        reason: String,
    },
}

impl FetchError {
    pub fn request(id: &str, source_name: &str, error: reqwest::Error) -> Self {
        Self::Request {
            id: id.to_string(),
            source_name: source_name.to_string(),
            error,
        }
    }

    pub fn decode(id: &str, source_name: &str, reason: impl Into<String>) -> Self {
        Self::Decode {
            id: id.to_string(),
            source_name: source_name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn config(id: &str, source_name: &str, reason: impl Into<String>) -> Self {
        Self::Config {
            id: id.to_string(),
            source_name: source_name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Request { id, .. }
            | Self::Status { id, .. }
            | Self::Decode { id, .. }
            | Self::Config { id, .. } => id,
        }
    }

    pub fn source_name(&self) -> &str {
        match self {
            Self::Request { source_name, .. }
            | Self::Status { source_name, .. }
            | Self::Decode { source_name, .. }
            | Self::Config { source_name, .. } => source_name,
        }
    }
}

/// A source could not produce a value for a field from its response.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("[{id}] failed to acquire '{field}' from {source_name}: {reason}")]
    FailedAcquisition {
        id: String,
        field: FieldName,
        source_name: String,
        reason: String,
    },

    #[error("[{id}] {source_name} cannot provide '{field}'")]
    UnsupportedField {
        id: String,
        field: FieldName,
        source_name: String,
    },

    #[error("[{id}] {source_name} was handed a response it did not produce while parsing '{field}'")]
    UnexpectedResponse {
        id: String,
        field: FieldName,
        source_name: String,
    },
}

impl ParseError {
    pub fn failed(
        id: &str,
        field: FieldName,
        source_name: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self::FailedAcquisition {
            id: id.to_string(),
            field,
            source_name: source_name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(id: &str, field: FieldName, source_name: &str) -> Self {
        Self::UnsupportedField {
            id: id.to_string(),
            field,
            source_name: source_name.to_string(),
        }
    }

    pub fn unexpected_response(id: &str, field: FieldName, source_name: &str) -> Self {
        Self::UnexpectedResponse {
            id: id.to_string(),
            field,
            source_name: source_name.to_string(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::FailedAcquisition { id, .. }
            | Self::UnsupportedField { id, .. }
            | Self::UnexpectedResponse { id, .. } => id,
        }
    }

    pub fn field(&self) -> FieldName {
        match self {
            Self::FailedAcquisition { field, .. }
            | Self::UnsupportedField { field, .. }
            | Self::UnexpectedResponse { field, .. } => *field,
        }
    }
}

/// Resolution of a single field failed.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("[{id}] required field '{field}' could not be resolved from any source")]
    RequiredFieldUnresolvable { id: String, field: FieldName },

    #[error("[{id}] no response from '{source_name}' is available to resolve '{field}'")]
    ResponseUnavailable {
        id: String,
        field: FieldName,
        source_name: String,
    },

    #[error("[{id}] field '{field}' is directed to unknown source '{source_name}'")]
    UnknownSource {
        id: String,
        field: FieldName,
        source_name: String,
    },

    #[error("[{id}] source '{source_name}' does not support field '{field}'")]
    UnsupportedDirective {
        id: String,
        field: FieldName,
        source_name: String,
    },
}

impl ResolveError {
    pub fn id(&self) -> &str {
        match self {
            Self::Parse(error) => error.id(),
            Self::RequiredFieldUnresolvable { id, .. }
            | Self::ResponseUnavailable { id, .. }
            | Self::UnknownSource { id, .. }
            | Self::UnsupportedDirective { id, .. } => id,
        }
    }

    pub fn field(&self) -> FieldName {
        match self {
            Self::Parse(error) => error.field(),
            Self::RequiredFieldUnresolvable { field, .. }
            | Self::ResponseUnavailable { field, .. }
            | Self::UnknownSource { field, .. }
            | Self::UnsupportedDirective { field, .. } => *field,
        }
    }
}

/// Assembling a project failed at some stage of the pipeline.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl From<ParseError> for AssemblyError {
    fn from(error: ParseError) -> Self {
        Self::Resolve(ResolveError::Parse(error))
    }
}

impl AssemblyError {
    /// Id of the project whose assembly failed.
    pub fn id(&self) -> &str {
        match self {
            Self::Validation(error) => error.id(),
            Self::Fetch(error) => error.id(),
            Self::Resolve(error) => error.id(),
        }
    }
}
