//! Pattern error types.

use stm_core::errors::TranslationError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    /// The text does not match the grammar. Carries the rendered nom trace.
    #[error("{0}")]
    Syntax(String),

    #[error("pattern mixes AND and OR between clauses")]
    MixedOperators,

    /// `OR` alternatives where a single value was expected.
    #[error("pattern offers {0} alternatives where one value was expected")]
    Alternatives(usize),

    #[error("{clauses} clauses match no composite group")]
    NoCompositeGroup { clauses: usize },

    #[error("'{0}' is not a composite attribute type")]
    UnknownComposite(String),

    #[error("value '{value}' does not split into the parts of {attribute_type}")]
    MalformedComposite {
        attribute_type: String,
        value: String,
    },
}

impl From<PatternError> for TranslationError {
    fn from(err: PatternError) -> Self {
        match err {
            PatternError::Syntax(message) => Self::PatternSyntax(message),
            other => Self::UnsupportedPatternShape(other.to_string()),
        }
    }
}
