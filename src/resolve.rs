//! Field resolution: deciding which value each field of a project gets.
//!
//! For every field the resolver looks at the instruction first:
//!
//! - a literal is returned as-is with provenance `self`;
//! - a directive asks the named source, and on a parse failure falls back
//!   to the single other configured source that supports the field (when
//!   there is exactly one);
//! - no entry at all tries every configured source that supports the
//!   field, in configuration order, until one succeeds.
//!
//! Required fields that end up without a value fail the project; optional
//! fields are left absent and get no provenance entry.

use tracing::warn;

use crate::error::{ParseError, ResolveError};
use crate::instruction::{FieldEntry, Instruction};
use crate::models::{FieldName, FieldValue, Provenance, ProvenanceMap, RawResponse, SourceResponses};
use crate::traits::{Source, SourceRegistry};

pub struct FieldResolver<'a> {
    id: &'a str,
    instruction: &'a Instruction,
    responses: &'a SourceResponses,
    registry: &'a SourceRegistry,
}

impl<'a> FieldResolver<'a> {
    pub fn new(
        id: &'a str,
        instruction: &'a Instruction,
        responses: &'a SourceResponses,
        registry: &'a SourceRegistry,
    ) -> Self {
        Self {
            id,
            instruction,
            responses,
            registry,
        }
    }

    /// Resolve one field, recording where its value came from.
    ///
    /// `Ok(None)` means an optional field has no value anywhere.
    pub fn resolve(
        &self,
        field: FieldName,
        provenance: &mut ProvenanceMap,
    ) -> Result<Option<FieldValue>, ResolveError> {
        match self.instruction.entry(field) {
            Some(FieldEntry::Literal(value)) => {
                provenance.record(field, Provenance::Literal);
                Ok(Some(value.clone()))
            }
            Some(FieldEntry::Directive(source_name)) => self
                .resolve_directive(field, source_name, provenance)
                .map(Some),
            None => self.resolve_from_sources(field, provenance),
        }
    }

    fn resolve_directive(
        &self,
        field: FieldName,
        source_name: &str,
        provenance: &mut ProvenanceMap,
    ) -> Result<FieldValue, ResolveError> {
        let source = self
            .registry
            .get(source_name)
            .ok_or_else(|| ResolveError::UnknownSource {
                id: self.id.to_string(),
                field,
                source_name: source_name.to_string(),
            })?;
        if !source.supports_field(field) {
            return Err(ResolveError::UnsupportedDirective {
                id: self.id.to_string(),
                field,
                source_name: source_name.to_string(),
            });
        }
        let response =
            self.responses
                .get(source_name)
                .ok_or_else(|| ResolveError::ResponseUnavailable {
                    id: self.id.to_string(),
                    field,
                    source_name: source_name.to_string(),
                })?;

        let error = match self.parse(source, field, response) {
            Ok(value) => {
                provenance.record(field, Provenance::source(source_name));
                return Ok(value);
            }
            Err(error) => error,
        };

        let alternates: Vec<(&dyn Source, &RawResponse)> = self
            .candidates(field)
            .into_iter()
            .filter(|(candidate, _)| candidate.name() != source_name)
            .collect();
        if alternates.len() != 1 {
            return Err(error.into());
        }
        let (fallback, fallback_response) = alternates[0];

        warn!(
            "{}; falling back to {} for '{}'",
            error,
            fallback.fancy_name(),
            field
        );
        let value = self.parse(fallback, field, fallback_response)?;
        provenance.record(field, Provenance::source(fallback.name()));
        Ok(value)
    }

    fn resolve_from_sources(
        &self,
        field: FieldName,
        provenance: &mut ProvenanceMap,
    ) -> Result<Option<FieldValue>, ResolveError> {
        for (source, response) in self.candidates(field) {
            match self.parse(source, field, response) {
                Ok(value) => {
                    provenance.record(field, Provenance::source(source.name()));
                    return Ok(Some(value));
                }
                Err(error) => warn!("{}", error),
            }
        }

        if field.is_required() {
            return Err(ResolveError::RequiredFieldUnresolvable {
                id: self.id.to_string(),
                field,
            });
        }

        warn!("[{}] no value for optional field '{}'", self.id, field);
        Ok(None)
    }

    /// Configured sources able to supply `field` whose response is at hand,
    /// in configuration order.
    fn candidates(&self, field: FieldName) -> Vec<(&'a dyn Source, &'a RawResponse)> {
        self.instruction
            .sources()
            .iter()
            .filter_map(|config| {
                let source = self.registry.get(&config.name)?;
                let response = self.responses.get(&config.name)?;
                source.supports_field(field).then_some((source, response))
            })
            .collect()
    }

    fn parse(
        &self,
        source: &dyn Source,
        field: FieldName,
        response: &RawResponse,
    ) -> Result<FieldValue, ParseError> {
        let value = source.parse(field, self.id, response)?;
        if value.field_name() != field {
            return Err(ParseError::failed(
                self.id,
                field,
                source.name(),
                format!("parser produced a value for '{}'", value.field_name()),
            ));
        }
        Ok(value)
    }
}
