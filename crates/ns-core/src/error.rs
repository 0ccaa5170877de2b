//! Error types for NextStat renormalisation

use thiserror::Error;

/// NextStat error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialisation error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be read or is structurally invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Semantically invalid input (bad filter name, inconsistent settings)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Dataset read or evaluation failure
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Failure attributed to one flavour of a run
    #[error("flavour '{flavour}': {source}")]
    Flavour {
        /// Flavour whose computation failed.
        flavour: String,
        /// Underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attach the flavour name to an error raised while processing it.
    pub fn in_flavour(self, flavour: impl Into<String>) -> Self {
        Error::Flavour { flavour: flavour.into(), source: Box::new(self) }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
