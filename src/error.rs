//! Error types for KyroKG.
//!
//! All errors are strongly typed using thiserror. The taxonomy follows the
//! consolidation pipeline: bad input or configuration is a validation error,
//! unusable extraction output is an extraction error, and backend failures are
//! storage errors. Schema mismatches and dangling relation endpoints are not
//! errors at all; they are counted in stage reports.

use thiserror::Error;

pub use crate::storage::StorageError;

/// Validation errors that occur while checking configuration or input.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A mention name is blank.
    #[error("Mention name cannot be empty")]
    EmptyMentionName,

    /// A label is blank.
    #[error("Label cannot be empty")]
    EmptyLabel,

    /// A required input field is absent.
    #[error("Required field '{field}' is missing")]
    MissingField {
        /// Name of the field.
        field: String,
    },

    /// A relation type is not an upper snake case token.
    #[error("Invalid relation type '{value}': expected upper-case token like WORKS_FOR")]
    InvalidRelationType {
        /// The rejected token.
        value: String,
    },

    /// The schema lists a triple more than once.
    #[error("Schema triple {source_label}-{relation}->{target_label} is listed twice")]
    DuplicateSchemaTriple {
        /// Source label of the triple.
        source_label: String,
        /// Relation type of the triple.
        relation: String,
        /// Target label of the triple.
        target_label: String,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong.
        reason: String,
    },

    /// A page id is not in the corpus.
    #[error("Page '{page_id}' is unknown")]
    UnknownPage {
        /// The missing page id.
        page_id: String,
    },
}

/// Errors raised while turning raw extractor output into mentions.
///
/// Pages that fail with one of these are flagged and retried; they never
/// abort a batch.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The output does not parse as JSON.
    #[error("Extractor output is not valid JSON: {message}")]
    InvalidJson {
        /// Parser message.
        message: String,
    },

    /// A top-level key is absent.
    #[error("Extractor output is missing the '{key}' key")]
    MissingKey {
        /// `entities` or `relations`.
        key: &'static str,
    },

    /// A value has the wrong JSON type.
    #[error("Extractor output has an unexpected shape at '{path}': {reason}")]
    UnexpectedShape {
        /// Location in the payload, e.g. `$.entities.Person[2]`.
        path: String,
        /// What was expected.
        reason: String,
    },

    /// The extractor produced no output.
    #[error("Extractor call failed: {message}")]
    CallFailed {
        /// Collaborator message.
        message: String,
        /// Whether a second call may succeed.
        retryable: bool,
    },
}

impl ExtractionError {
    /// Returns true if re-running the extractor on the same page may succeed.
    ///
    /// Format errors are retryable because the upstream model is not
    /// deterministic; a second call with the same text often conforms.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidJson { .. } | Self::MissingKey { .. } | Self::UnexpectedShape { .. } => {
                true
            }
            Self::CallFailed { retryable, .. } => *retryable,
        }
    }
}

/// Top-level error type for KyroKG.
#[derive(Debug, Error)]
pub enum KgError {
    /// Invalid input or configuration.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Unusable extractor output.
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Store failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A state that should be impossible.
    #[error("Internal error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },
}

impl KgError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an extraction error.
    #[must_use]
    pub const fn is_extraction(&self) -> bool {
        matches!(self, Self::Extraction(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this error is retryable.
    ///
    /// Every stage can be re-derived from the mention store, so store
    /// connectivity failures are safe to retry from scratch.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Internal { .. } => false,
            Self::Extraction(e) => e.is_retryable(),
            Self::Storage(e) => matches!(
                e,
                StorageError::ConnectionError(_) | StorageError::Locked(_)
            ),
        }
    }
}

/// Result type alias for KyroKG operations.
pub type KgResult<T> = Result<T, KgError>;
