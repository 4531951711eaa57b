use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use filetime::FileTime;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::date::{self, CandidateDate, DateWindow, ResolvedDate};
use crate::dedup::{self, DedupDecision, FingerprintRegistry};
use crate::error::{Result, TriageError};
use crate::extract;
use crate::identify::{self, Probe};
use crate::layout;
use crate::manifest::{self, ManifestWriter, Summary};
use crate::rename::{self, RenamePolicy};
use crate::types::{Confidence, Disposition, FileKind, FileRecord};
use crate::validate::{self, Verdict};

/// Days of slack before "now" beyond which a carved file's mtime is assumed
/// to be the carve time rather than original content time.
const MTIME_TRUST_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub dry_run: bool,
    pub rename: RenamePolicy,
    pub workers: usize,
    pub earliest_year: i32,
    pub progress: bool,
}

impl PipelineConfig {
    pub fn new(source: PathBuf, dest: PathBuf) -> Self {
        Self {
            source,
            dest,
            dry_run: false,
            rename: RenamePolicy::Carved,
            workers: 0,
            earliest_year: DateWindow::DEFAULT_EARLIEST_YEAR,
            progress: false,
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub summary: Summary,
    pub records: Vec<FileRecord>,
    pub manifest_path: PathBuf,
}

/// Everything the parallel analysis phase learns about one file. Dedup and
/// placement decisions are taken later, in stable discovery order.
struct Analysis {
    fingerprint: String,
    kind: FileKind,
    confidence: Confidence,
    candidates: Vec<CandidateDate>,
    resolved: ResolvedDate,
    verdict: Verdict,
    title: Option<String>,
}

struct Analyzed {
    source: PathBuf,
    len: u64,
    outcome: std::result::Result<Analysis, String>,
}

/// Run the triage pipeline end to end. Per-file failures never abort the
/// run; only setup failures do.
pub fn run(config: &PipelineConfig) -> Result<RunOutcome> {
    // Fail fast on an unusable setup, before touching anything.
    fs::read_dir(&config.source)
        .map_err(|e| TriageError::Setup(format!("source {:?} unreadable: {e}", config.source)))?;
    fs::create_dir_all(&config.dest)
        .map_err(|e| TriageError::Setup(format!("cannot create dest {:?}: {e}", config.dest)))?;

    let previous = manifest::load_previous(&config.dest)?;
    if !previous.is_empty() {
        info!(entries = previous.len(), "resuming against existing manifest");
    }

    let paths = discover(&config.source, &config.dest);
    info!(files = paths.len(), "discovery complete");

    let window = DateWindow::from_earliest_year(config.earliest_year);
    let fs_cutoff = Utc::now().naive_utc() - Duration::days(MTIME_TRUST_DAYS);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .build()
        .map_err(|e| TriageError::Setup(format!("worker pool: {e}")))?;

    let bar = if config.progress {
        let pb = ProgressBar::new(paths.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40}] {pos}/{len} analyzing")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Some(pb)
    } else {
        None
    };

    let analyzed: Vec<Analyzed> = pool.install(|| {
        paths
            .par_iter()
            .map(|path| {
                let a = catch_analysis(path, std::panic::AssertUnwindSafe(|| {
                    analyze_one(path, config.rename, &window, fs_cutoff)
                }));
                if let Some(pb) = &bar {
                    pb.inc(1);
                }
                a
            })
            .collect()
    });
    if let Some(pb) = &bar {
        pb.finish_and_clear();
    }

    // Dedup + placement decisions, sequential in discovery order so the
    // canonical choice and collision suffixes are stable across runs.
    let registry = FingerprintRegistry::new();
    let mut canonical_sources: Vec<PathBuf> = Vec::new();
    let mut used_paths: HashSet<PathBuf> = HashSet::new();
    let mut summary = Summary::default();

    for prev in previous.values() {
        if prev.disposition.is_placed() && !prev.fingerprint.is_empty() {
            registry.register(&prev.fingerprint, canonical_sources.len());
            canonical_sources.push(prev.source.clone());
        }
        if let Some(dest) = &prev.dest {
            used_paths.insert(dest.clone());
        }
    }

    let mut records: Vec<FileRecord> = Vec::with_capacity(analyzed.len());

    for item in analyzed {
        if previous.contains_key(&item.source) {
            summary.skipped_resumed += 1;
            continue;
        }
        let record = decide(item, &registry, &mut canonical_sources, &mut used_paths);
        records.push(record);
    }

    if !config.dry_run {
        place_all(&pool, &config.dest, &mut records);
    }

    let mut writer = ManifestWriter::open(&config.dest)?;
    for record in &records {
        summary.add(&record.disposition);
        writer.append(record)?;
    }
    let manifest_path = writer.path().to_path_buf();

    info!(
        binned = summary.binned,
        quarantined = summary.quarantined,
        duplicates = summary.duplicates,
        errored = summary.errored,
        resumed = summary.skipped_resumed,
        "run complete"
    );

    Ok(RunOutcome { summary, records, manifest_path })
}

/// Stable discovery order: walk the tree, keep regular files, sort
/// lexicographically. The destination subtree is excluded in case it nests
/// inside the source.
fn discover(source: &Path, dest: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(source)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) if e.file_type().is_file() => Some(e.into_path()),
            Ok(_) => None,
            Err(e) => {
                warn!("walk error: {e}");
                None
            }
        })
        .filter(|p| !p.starts_with(dest))
        .collect();
    paths.sort();
    paths
}

/// Contain a panic from the analysis of one file. Third-party parsers fed
/// adversarial carved bytes may panic; that file becomes an Errored record
/// and the run continues, the same as a plain read failure.
fn catch_analysis<F>(path: &Path, analysis: F) -> Analyzed
where
    F: FnOnce() -> Analyzed + std::panic::UnwindSafe,
{
    match std::panic::catch_unwind(analysis) {
        Ok(a) => a,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(?path, "analysis panicked: {msg}");
            Analyzed {
                source: path.to_path_buf(),
                len: fs::metadata(path).map(|m| m.len()).unwrap_or(0),
                outcome: Err(format!("panic: {msg}")),
            }
        }
    }
}

/// Per-file analysis: identify → fingerprint → extract → resolve → validate.
/// Pure with respect to shared state; any I/O failure maps to a recorded
/// cause, never a run abort.
fn analyze_one(
    path: &Path,
    policy: RenamePolicy,
    window: &DateWindow,
    fs_cutoff: chrono::NaiveDateTime,
) -> Analyzed {
    let len = fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    let probe = match Probe::from_path(path) {
        Ok(p) => p,
        Err(e) => {
            warn!(?path, "unreadable: {e}");
            return Analyzed { source: path.to_path_buf(), len, outcome: Err(format!("probe: {e}")) };
        }
    };

    let (mut kind, mut confidence) = identify::identify(&probe);
    if kind == FileKind::Zip {
        (kind, confidence) = identify::refine_zip(path);
    }

    let fingerprint = match dedup::fingerprint(path) {
        Ok(f) => f,
        Err(e) => {
            warn!(?path, "fingerprint failed: {e}");
            return Analyzed {
                source: path.to_path_buf(),
                len,
                outcome: Err(format!("fingerprint: {e}")),
            };
        }
    };

    let extracted = extract::extract(path, &probe, kind, fs_cutoff);
    let resolved = date::resolve(&extracted.candidates, window);
    let verdict = validate::validate(&probe, kind);

    debug!(?path, %kind, ?verdict, "analyzed");

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let title = if policy.applies_to(stem) { extracted.title } else { None };

    Analyzed {
        source: path.to_path_buf(),
        len,
        outcome: Ok(Analysis {
            fingerprint,
            kind,
            confidence,
            candidates: extracted.candidates,
            resolved,
            verdict,
            title,
        }),
    }
}

/// Fold one analysis into a terminal disposition. Exactly one of
/// Binned / Quarantined / Duplicate / Errored, per the no-data-loss
/// invariant.
fn decide(
    item: Analyzed,
    registry: &FingerprintRegistry,
    canonical_sources: &mut Vec<PathBuf>,
    used_paths: &mut HashSet<PathBuf>,
) -> FileRecord {
    let analysis = match item.outcome {
        Ok(a) => a,
        Err(cause) => {
            return FileRecord {
                source: item.source,
                len: item.len,
                fingerprint: String::new(),
                kind: FileKind::Unknown,
                confidence: Confidence::None,
                candidates: Vec::new(),
                resolved: ResolvedDate::Unknown,
                verdict: Verdict::Unsupported,
                title_hint: None,
                disposition: Disposition::Errored { cause },
                dest: None,
            };
        }
    };

    match registry.register(&analysis.fingerprint, canonical_sources.len()) {
        DedupDecision::DuplicateOf(idx) => {
            return FileRecord {
                source: item.source,
                len: item.len,
                fingerprint: analysis.fingerprint,
                kind: analysis.kind,
                confidence: analysis.confidence,
                candidates: analysis.candidates,
                resolved: analysis.resolved,
                verdict: analysis.verdict,
                title_hint: None,
                disposition: Disposition::Duplicate { of: canonical_sources[idx].clone() },
                dest: None,
            };
        }
        DedupDecision::Canonical => {
            canonical_sources.push(item.source.clone());
        }
    }

    let new_stem = analysis
        .title
        .as_deref()
        .and_then(|t| {
            let stem = item.source.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
            rename::renamed_stem(stem, t)
        });

    let dir = layout::bin_dir(analysis.kind, &analysis.resolved, &analysis.verdict);
    let name = layout::dest_filename(&item.source, analysis.kind, new_stem.as_deref());
    let mut dest = dir.join(name);
    if used_paths.contains(&dest) {
        dest = layout::disambiguate(&dest, &analysis.fingerprint);
    }
    used_paths.insert(dest.clone());

    let disposition = if analysis.verdict.is_damaged() {
        Disposition::Quarantined
    } else {
        Disposition::Binned
    };

    FileRecord {
        source: item.source,
        len: item.len,
        fingerprint: analysis.fingerprint,
        kind: analysis.kind,
        confidence: analysis.confidence,
        candidates: analysis.candidates,
        resolved: analysis.resolved,
        verdict: analysis.verdict,
        title_hint: analysis.title,
        disposition,
        dest: Some(dest),
    }
}

/// Copy every placed record to its destination in parallel. A placement
/// failure demotes that record to Errored; the rest proceed.
fn place_all(pool: &rayon::ThreadPool, dest_root: &Path, records: &mut [FileRecord]) {
    let failures: Vec<(usize, String)> = pool.install(|| {
        records
            .par_iter()
            .enumerate()
            .filter(|(_, r)| r.disposition.is_placed())
            .filter_map(|(i, r)| {
                let rel = r.dest.as_ref()?;
                match place_one(&r.source, &dest_root.join(rel), r.resolved.value()) {
                    Ok(()) => None,
                    Err(e) => {
                        warn!(source = ?r.source, "placement failed: {e}");
                        Some((i, format!("placement: {e}")))
                    }
                }
            })
            .collect()
    });

    for (i, cause) in failures {
        records[i].disposition = Disposition::Errored { cause };
        records[i].dest = None;
    }
}

/// Atomic placement: copy to a `.part` sibling, then rename into place, so
/// no partial file is ever visible at the destination. An already-present
/// destination is left alone; names embed the fingerprint on collision, so
/// an existing file with this name is this content.
fn place_one(
    source: &Path,
    dest_abs: &Path,
    mtime: Option<chrono::NaiveDateTime>,
) -> io::Result<()> {
    if dest_abs.exists() {
        return Ok(());
    }
    if let Some(parent) = dest_abs.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut part = dest_abs.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    fs::copy(source, &part)?;
    fs::rename(&part, dest_abs)?;

    if let Some(dt) = mtime {
        let ft = FileTime::from_unix_time(dt.and_utc().timestamp(), 0);
        let _ = filetime::set_file_mtime(dest_abs, ft);
    }
    Ok(())
}
