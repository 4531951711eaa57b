use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;
use crate::types::{Disposition, FileRecord};

pub const MANIFEST_NAME: &str = "manifest.jsonl";

/// Append-only JSON-lines log of every discovered file and its terminal
/// disposition. One object per line; the durable output of a run and the
/// sole input to report generation.
///
/// Each entry is flushed as written so an interrupted run leaves a readable
/// prefix; the loader tolerates a torn final line.
pub struct ManifestWriter {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl ManifestWriter {
    /// Open for appending, creating the file (and destination root) if absent.
    pub fn open(dest_root: &Path) -> Result<Self> {
        std::fs::create_dir_all(dest_root)?;
        let path = dest_root.join(MANIFEST_NAME);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { writer: BufWriter::new(file), path })
    }

    pub fn append(&mut self, record: &FileRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Load records from a previous (possibly interrupted) run. Every loaded
/// record carries a terminal disposition, so the returned map is exactly the
/// set of source paths a resumed run must skip.
pub fn load_previous(dest_root: &Path) -> Result<HashMap<PathBuf, FileRecord>> {
    let path = dest_root.join(MANIFEST_NAME);
    let file = match File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e.into()),
    };

    let mut out = HashMap::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        // A torn final line from an interrupted run is expected; a corrupt
        // line elsewhere must not discard the valid entries after it.
        match serde_json::from_str::<FileRecord>(&line) {
            Ok(record) => {
                out.insert(record.source.clone(), record);
            }
            Err(e) => warn!(line = lineno + 1, "skipping undecodable manifest entry: {e}"),
        }
    }
    Ok(out)
}

/// Per-disposition counters for the end-of-run summary. Every discovered
/// file lands in exactly one bucket, so the totals must reconcile with the
/// discovery count.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub binned: usize,
    pub quarantined: usize,
    pub duplicates: usize,
    pub errored: usize,
    pub skipped_resumed: usize,
}

impl Summary {
    pub fn add(&mut self, disposition: &Disposition) {
        match disposition {
            Disposition::Binned => self.binned += 1,
            Disposition::Quarantined => self.quarantined += 1,
            Disposition::Duplicate { .. } => self.duplicates += 1,
            Disposition::Errored { .. } => self.errored += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.binned + self.quarantined + self.duplicates + self.errored
    }
}
