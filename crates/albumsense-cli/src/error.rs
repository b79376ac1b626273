//! Error types for the command line front end.

use albumsense::{Modality, RetrievalError};

/// All errors that can occur in the CLI service layer.
#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Retrieval(#[from] RetrievalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No {0} index found; run `albumsense build --modality {0}` first")]
    MissingIndex(Modality),

    #[error("Background rebuild failed: {0}")]
    Rebuild(String),
}

pub type CliResult<T> = Result<T, CliError>;
