//! Error taxonomy for a translation run.
//!
//! Two kinds end the whole run: [`TranslationError::UnreadableInput`] and
//! [`TranslationError::NoTranslatableObjects`]. Every other kind is caught at
//! the object boundary by the run loop and recorded as a skip or a diagnostic.
//! Crate-specific errors (`PatternError`, `ConfigError`) convert into this
//! taxonomy in their own crates.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while translating a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationError {
    /// The input could not be parsed as a bundle at all.
    #[error("The STIX file could not be read: {0}")]
    UnreadableInput(String),

    /// The input parsed but nothing in it could be translated.
    #[error("There is no valid STIX object to import")]
    NoTranslatableObjects,

    /// Pattern mixes AND/OR, or has a composite arity no group declares.
    #[error("Unsupported pattern shape: {0}")]
    UnsupportedPatternShape(String),

    /// Pattern text does not follow the comparison grammar.
    #[error("Invalid pattern syntax: {0}")]
    PatternSyntax(String),

    /// A `*_ref`/`*_refs` field names a local id absent from the graph.
    #[error("Field '{field}' references missing sub-object '{reference}'")]
    MissingReferencedSubObject { field: String, reference: String },

    /// A reference points at a sub-object with no representative scalar.
    #[error("Field '{field}' references sub-object '{reference}' which has no representative value")]
    UnresolvableReference { field: String, reference: String },

    /// A field key matched no table and no custom-field convention.
    #[error("Unmapped field: {0}")]
    UnmappedField(String),

    /// One half of a value/data attachment pair is missing.
    #[error("Attachment '{relation}' is missing its {missing} fragment")]
    PartialAttachment {
        relation: String,
        missing: &'static str,
    },

    /// The classification hint does not follow the two-label convention.
    #[error("Malformed classification hint: {0}")]
    MalformedHint(String),

    /// The object kind has no translation.
    #[error("Unsupported object: {0}")]
    UnsupportedObject(String),

    /// Mapping produced nothing to emit.
    #[error("Nothing to emit: {0}")]
    EmptyObject(String),
}

impl TranslationError {
    /// Whether this error aborts the whole run rather than a single object.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::UnreadableInput(_) | Self::NoTranslatableObjects)
    }

    /// Classification used for run-report aggregation.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnreadableInput(_) => ErrorKind::UnreadableInput,
            Self::NoTranslatableObjects => ErrorKind::NoTranslatableObjects,
            Self::UnsupportedPatternShape(_) => ErrorKind::UnsupportedPatternShape,
            Self::PatternSyntax(_) => ErrorKind::PatternSyntax,
            Self::MissingReferencedSubObject { .. } => ErrorKind::MissingReferencedSubObject,
            Self::UnresolvableReference { .. } => ErrorKind::UnresolvableReference,
            Self::UnmappedField(_) => ErrorKind::UnmappedField,
            Self::PartialAttachment { .. } => ErrorKind::PartialAttachment,
            Self::MalformedHint(_) => ErrorKind::MalformedHint,
            Self::UnsupportedObject(_) => ErrorKind::UnsupportedObject,
            Self::EmptyObject(_) => ErrorKind::EmptyObject,
        }
    }
}

/// Flat discriminant of [`TranslationError`], serialized in run reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnreadableInput,
    NoTranslatableObjects,
    UnsupportedPatternShape,
    PatternSyntax,
    MissingReferencedSubObject,
    UnresolvableReference,
    UnmappedField,
    PartialAttachment,
    MalformedHint,
    UnsupportedObject,
    EmptyObject,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnreadableInput => "unreadable_input",
            Self::NoTranslatableObjects => "no_translatable_objects",
            Self::UnsupportedPatternShape => "unsupported_pattern_shape",
            Self::PatternSyntax => "pattern_syntax",
            Self::MissingReferencedSubObject => "missing_referenced_sub_object",
            Self::UnresolvableReference => "unresolvable_reference",
            Self::UnmappedField => "unmapped_field",
            Self::PartialAttachment => "partial_attachment",
            Self::MalformedHint => "malformed_hint",
            Self::UnsupportedObject => "unsupported_object",
            Self::EmptyObject => "empty_object",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
