//! Error types.
//!
//! Submission failures ([`SubmitError`]) are kept apart from the crate-level
//! [`Error`] used for configuration and export. A classifier rejection is not
//! an error at all; it is reported as
//! [`SubmissionOutcome::Rejected`](crate::SubmissionOutcome::Rejected).

use thiserror::Error;

/// The classifier collaborator could not produce a response.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClassifierError {
    /// Transport failure, non-success status, or a response body of the wrong shape.
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

/// The classifier answered, but its answer could not be decoded into a candidate.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("classifier returned an empty response")]
    Empty,

    #[error("expected 3 '|'-separated fields, found {found}")]
    MissingFields { found: usize },

    #[error("field '{0}' is empty")]
    EmptyField(&'static str),

    #[error("keyword has {len} characters (max: {max})")]
    KeywordTooLong { len: usize, max: usize },

    #[error("unrecognized stance: {0:?}")]
    InvalidStance(String),
}

/// Why a submission did not reach the store.
///
/// The store is unchanged whenever one of these is returned, so the same text
/// can be submitted again.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SubmitError {
    #[error(transparent)]
    Classification(#[from] ClassifierError),

    #[error("could not decode classifier response: {0}")]
    Parse(#[from] ParseError),
}

impl SubmitError {
    /// Every submission failure leaves the store untouched, so all of them can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubmitError::Classification(_) | SubmitError::Parse(_))
    }
}

/// Crate-level error for configuration, seeding and export.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid config: {0}")]
    Config(String),

    /// A seed opinion was refused; nothing from its batch was planted.
    #[error("invalid seed #{index}: {reason}")]
    Seed { index: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
