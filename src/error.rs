use std::io;
use thiserror::Error;

/// Errors raised by the triage pipeline.
///
/// Only `Setup` is fatal to a run. Per-file I/O errors transition that file
/// to the `Errored` disposition and the run continues.
#[derive(Debug, Error)]
pub enum TriageError {
    #[error("setup failure: {0}")]
    Setup(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("manifest entry is not valid JSON: {0}")]
    ManifestDecode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TriageError>;
