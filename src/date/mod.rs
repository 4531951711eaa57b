pub mod exif;

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a candidate timestamp came from. The variant order is the fixed
/// resolution priority: earlier variants win conflicts.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DateSource {
    Exif,
    QuickTime,
    Xmp,
    Iptc,
    OfficeMeta,
    PdfMeta,
    FilesystemFallback,
}

impl DateSource {
    /// Lower rank wins. Derived from the declaration order above.
    pub fn rank(&self) -> u8 {
        *self as u8
    }
}

/// One timestamp extracted from one metadata source, not yet reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDate {
    pub value: NaiveDateTime,
    pub source: DateSource,
}

impl CandidateDate {
    pub fn new(value: NaiveDateTime, source: DateSource) -> Self {
        Self { value, source }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfidenceTier {
    /// Only a filesystem-fallback candidate survived.
    Low,
    /// Conflicting candidates, settled by source priority.
    Medium,
    /// All surviving candidates agree.
    High,
}

/// The single date chosen to represent a file, or `Unknown` when no candidate
/// survived filtering. Always recomputable from the candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolvedDate {
    Known {
        value: NaiveDateTime,
        provenance: DateSource,
        tier: ConfidenceTier,
        ambiguous: bool,
    },
    Unknown,
}

impl ResolvedDate {
    pub fn value(&self) -> Option<NaiveDateTime> {
        match self {
            ResolvedDate::Known { value, .. } => Some(*value),
            ResolvedDate::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, ResolvedDate::Known { .. })
    }
}

/// Sanity window for candidate timestamps. Dates outside it are extractor
/// noise, not real content.
#[derive(Debug, Clone, Copy)]
pub struct DateWindow {
    pub earliest: NaiveDateTime,
    pub latest: NaiveDateTime,
}

impl DateWindow {
    pub const DEFAULT_EARLIEST_YEAR: i32 = 1995;

    /// Window from Jan 1 of `earliest_year` to one day past now. The slack
    /// absorbs camera clocks that run slightly ahead.
    pub fn from_earliest_year(earliest_year: i32) -> Self {
        let earliest = NaiveDate::from_ymd_opt(earliest_year, 1, 1)
            .unwrap_or(NaiveDate::MIN)
            .and_hms_opt(0, 0, 0)
            .unwrap_or(NaiveDateTime::MIN);
        let latest = Utc::now().naive_utc() + Duration::days(1);
        Self { earliest, latest }
    }

    pub fn contains(&self, value: NaiveDateTime) -> bool {
        value >= self.earliest && value <= self.latest
    }
}

impl Default for DateWindow {
    fn default() -> Self {
        Self::from_earliest_year(Self::DEFAULT_EARLIEST_YEAR)
    }
}

/// Reconcile an unordered candidate set into one resolved date.
///
/// Pure function of the candidate values and the window; candidate order
/// never influences the result. Never fabricates a date.
pub fn resolve(candidates: &[CandidateDate], window: &DateWindow) -> ResolvedDate {
    let mut surviving: Vec<CandidateDate> = candidates
        .iter()
        .copied()
        .filter(|c| window.contains(c.value))
        .collect();

    if surviving.is_empty() {
        return ResolvedDate::Unknown;
    }

    // Order-independence: settle on a canonical ordering before deciding.
    surviving.sort_by(|a, b| {
        a.source
            .rank()
            .cmp(&b.source.rank())
            .then_with(|| a.value.cmp(&b.value))
    });

    let best = surviving[0];
    let unanimous = surviving.iter().all(|c| c.value == best.value);

    let tier = if surviving.len() == 1 && best.source == DateSource::FilesystemFallback {
        ConfidenceTier::Low
    } else if unanimous {
        ConfidenceTier::High
    } else {
        ConfidenceTier::Medium
    };

    ResolvedDate::Known {
        value: best.value,
        provenance: best.source,
        tier,
        ambiguous: !unanimous,
    }
}
