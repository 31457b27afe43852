//! Validator: structural schema check for generated content.
//!
//! Strict by construction: a candidate either satisfies every rule or is
//! rejected. Nothing is trimmed, padded, or repaired here. Tolerance for
//! half-streamed output comes from the caller invoking `parse` repeatedly
//! and ignoring failures, not from a lenient validator.

use thiserror::Error;

use crate::models::{ContentType, StructuredContent};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Candidate is not a valid payload: {0}")]
    Malformed(String),

    #[error("Content has no sections")]
    NoSections,

    #[error("Section {index} has an empty type")]
    MissingSectionType { index: usize },

    #[error("Section {index} has an empty title")]
    MissingSectionTitle { index: usize },

    #[error("Narrative section '{title}' has no text")]
    EmptyNarrative { title: String },

    #[error("List section '{title}' has no items")]
    EmptyList { title: String },

    #[error("Expected at least {required} {field}, found {found}")]
    TooFewItems {
        field: &'static str,
        required: usize,
        found: usize,
    },

    #[error("{field}[{index}] is blank")]
    BlankItem { field: &'static str, index: usize },
}

/// Content-type specific validator.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    content_type: ContentType,
}

impl Validator {
    pub fn for_type(content_type: ContentType) -> Self {
        Self { content_type }
    }

    pub fn is_valid(&self, content: &StructuredContent) -> bool {
        self.check(content).is_ok()
    }

    /// Full schema check with the first violation found.
    pub fn check(&self, content: &StructuredContent) -> Result<(), ValidationError> {
        if content.sections.is_empty() {
            return Err(ValidationError::NoSections);
        }

        let narrative_types = self.content_type.narrative_section_types();

        for (index, section) in content.sections.iter().enumerate() {
            if section.kind.trim().is_empty() {
                return Err(ValidationError::MissingSectionType { index });
            }
            if section.title.trim().is_empty() {
                return Err(ValidationError::MissingSectionTitle { index });
            }

            if narrative_types.contains(&section.kind.as_str()) {
                let has_text = section
                    .content
                    .as_deref()
                    .map(|t| !t.trim().is_empty())
                    .unwrap_or(false);
                if !has_text {
                    return Err(ValidationError::EmptyNarrative {
                        title: section.title.clone(),
                    });
                }
            } else {
                let has_items = section
                    .items
                    .as_ref()
                    .map(|items| !items.is_empty())
                    .unwrap_or(false);
                if !has_items {
                    return Err(ValidationError::EmptyList {
                        title: section.title.clone(),
                    });
                }
            }
        }

        let field = self.content_type.items_field();
        let required = self.content_type.min_items();

        if let Some(index) = content.items.iter().position(|i| i.trim().is_empty()) {
            return Err(ValidationError::BlankItem { field, index });
        }
        if content.items.len() < required {
            return Err(ValidationError::TooFewItems {
                field,
                required,
                found: content.items.len(),
            });
        }

        Ok(())
    }

    /// Decodes an extracted candidate payload and checks it.
    pub fn parse(&self, candidate: &str) -> Result<StructuredContent, ValidationError> {
        let content: StructuredContent = serde_json::from_str(candidate)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        self.check(&content)?;
        Ok(content)
    }
}
