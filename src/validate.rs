//! Pre-flight checks run on an instruction before any source is contacted.

use crate::error::ValidationError;
use crate::instruction::{FieldEntry, Instruction};
use crate::models::FieldName;
use crate::traits::SourceRegistry;

pub struct InstructionValidator<'a> {
    registry: &'a SourceRegistry,
}

impl<'a> InstructionValidator<'a> {
    pub fn new(registry: &'a SourceRegistry) -> Self {
        Self { registry }
    }

    /// Check that every required field can be resolved and that every
    /// directive points at a configured source able to supply the field.
    ///
    /// Rules are applied in order and the first violation is returned:
    ///
    /// 1. With no source configured, every required field needs a literal.
    /// 2. A required field needs a literal, a directive to a source that
    ///    supports it, or (with no entry) a configured source that does.
    /// 3. A directive needs its source in the configuration.
    /// 4. A directive needs a source that supports the field.
    pub fn validate<'i>(
        &self,
        id: &str,
        instruction: &'i Instruction,
    ) -> Result<&'i Instruction, ValidationError> {
        let unresolvable: Vec<FieldName> = FieldName::REQUIRED
            .into_iter()
            .filter(|field| !self.required_field_resolvable(instruction, *field))
            .collect();
        if !unresolvable.is_empty() {
            return Err(ValidationError::UnresolvableRequiredFields {
                id: id.to_string(),
                fields: unresolvable,
            });
        }

        let directives: Vec<(FieldName, &str)> = instruction
            .entries()
            .filter_map(|(field, entry)| match entry {
                FieldEntry::Directive(source) => Some((field, source.as_str())),
                FieldEntry::Literal(_) => None,
            })
            .collect();

        if let Some((field, source)) = directives
            .iter()
            .find(|(_, source)| !instruction.is_configured(source))
        {
            return Err(ValidationError::MissingSourceConfiguration {
                id: id.to_string(),
                field: *field,
                source_name: source.to_string(),
            });
        }

        for (field, source_name) in directives {
            let supported = self
                .registry
                .get(source_name)
                .is_some_and(|source| source.supports_field(field));
            if !supported {
                return Err(ValidationError::UnsupportedSourceDirective {
                    id: id.to_string(),
                    field,
                    source_name: source_name.to_string(),
                });
            }
        }

        Ok(instruction)
    }

    fn required_field_resolvable(&self, instruction: &Instruction, field: FieldName) -> bool {
        if instruction.sources().is_empty() {
            return matches!(instruction.entry(field), Some(FieldEntry::Literal(_)));
        }
        match instruction.entry(field) {
            Some(FieldEntry::Literal(_)) => true,
            Some(FieldEntry::Directive(source_name)) => self.supplies(source_name, field),
            None => instruction
                .sources()
                .iter()
                .any(|config| self.supplies(&config.name, field)),
        }
    }

    fn supplies(&self, source_name: &str, field: FieldName) -> bool {
        self.registry
            .get(source_name)
            .is_some_and(|source| source.supports_field(field))
    }
}
