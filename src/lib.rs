//! Triage for carved files: identify by content, deduplicate, date, check
//! integrity, and file each survivor into a deterministic bin layout under a
//! destination root. Every discovered file is accounted for in the run
//! manifest; nothing is deleted.

pub mod date;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod identify;
pub mod layout;
pub mod manifest;
pub mod pipeline;
pub mod rename;
pub mod report;
pub mod types;
pub mod validate;

pub use error::{Result, TriageError};
pub use pipeline::{run, PipelineConfig, RunOutcome};
pub use types::{Confidence, Disposition, FileKind, FileRecord};
pub use validate::{DamageKind, Verdict};
