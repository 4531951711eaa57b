use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::date::{CandidateDate, ResolvedDate};
use crate::validate::Verdict;

pub const KB: u64 = 1024;
pub const MB: u64 = KB * 1024;

/// Window of bytes read from the head of a file for identification.
pub const PROBE_HEAD_LEN: usize = 64 * KB as usize;
/// Window of bytes read from the tail for trailer checks (PDF %%EOF, ZIP
/// EOCD). The EOCD record can sit up to 65,557 bytes from EOF when the
/// archive carries a maximum-length comment, so the window must exceed that.
pub const PROBE_TAIL_LEN: usize = 68 * KB as usize;
/// Chunk size for streaming fingerprint computation.
pub const HASH_BUF_LEN: usize = MB as usize;

/// Identified file format, derived from content signature only.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    Jpeg,
    Png,
    Gif,
    Tiff,
    WebP,
    Bmp,
    Heic,
    Mp4,
    QuickTime,
    Avi,
    Mp3,
    Wav,
    Flac,
    Pdf,
    Docx,
    Xlsx,
    Pptx,
    OleOffice,
    Rtf,
    Zip,
    Gzip,
    SevenZip,
    Rar,
    Sqlite,
    Unknown,
}

impl FileKind {
    pub fn extension(&self) -> &'static str {
        match self {
            FileKind::Jpeg => "jpg",
            FileKind::Png => "png",
            FileKind::Gif => "gif",
            FileKind::Tiff => "tiff",
            FileKind::WebP => "webp",
            FileKind::Bmp => "bmp",
            FileKind::Heic => "heic",
            FileKind::Mp4 => "mp4",
            FileKind::QuickTime => "mov",
            FileKind::Avi => "avi",
            FileKind::Mp3 => "mp3",
            FileKind::Wav => "wav",
            FileKind::Flac => "flac",
            FileKind::Pdf => "pdf",
            FileKind::Docx => "docx",
            FileKind::Xlsx => "xlsx",
            FileKind::Pptx => "pptx",
            FileKind::OleOffice => "doc",
            FileKind::Rtf => "rtf",
            FileKind::Zip => "zip",
            FileKind::Gzip => "gz",
            FileKind::SevenZip => "7z",
            FileKind::Rar => "rar",
            FileKind::Sqlite => "sqlite",
            FileKind::Unknown => "bin",
        }
    }

    /// Top-level destination partition for this kind.
    pub fn family(&self) -> &'static str {
        match self {
            FileKind::Jpeg
            | FileKind::Png
            | FileKind::Gif
            | FileKind::Tiff
            | FileKind::WebP
            | FileKind::Bmp
            | FileKind::Heic => "Images",
            FileKind::Mp4 | FileKind::QuickTime | FileKind::Avi => "Video",
            FileKind::Mp3 | FileKind::Wav | FileKind::Flac => "Audio",
            FileKind::Pdf => "PDFs",
            FileKind::Docx
            | FileKind::Xlsx
            | FileKind::Pptx
            | FileKind::OleOffice
            | FileKind::Rtf => "Office",
            FileKind::Zip | FileKind::Gzip | FileKind::SevenZip | FileKind::Rar => "Archives",
            FileKind::Sqlite => "Other",
            FileKind::Unknown => "unsorted",
        }
    }

    /// Subdirectory label under the family partition.
    pub fn label(&self) -> &'static str {
        match self {
            FileKind::Jpeg => "JPEG",
            FileKind::Png => "PNG",
            FileKind::Gif => "GIF",
            FileKind::Tiff => "TIFF",
            FileKind::WebP => "WebP",
            FileKind::Bmp => "BMP",
            FileKind::Heic => "HEIC",
            FileKind::Mp4 => "MP4",
            FileKind::QuickTime => "MOV",
            FileKind::Avi => "AVI",
            FileKind::Mp3 => "MP3",
            FileKind::Wav => "WAV",
            FileKind::Flac => "FLAC",
            FileKind::Pdf => "PDF",
            FileKind::Docx => "Word",
            FileKind::Xlsx => "Excel",
            FileKind::Pptx => "PowerPoint",
            FileKind::OleOffice => "Legacy-Office",
            FileKind::Rtf => "RTF",
            FileKind::Zip => "ZIP",
            FileKind::Gzip => "GZIP",
            FileKind::SevenZip => "7z",
            FileKind::Rar => "RAR",
            FileKind::Sqlite => "SQLite",
            FileKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// How certain the identifier is about a `FileKind`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    /// No signature matched.
    None,
    /// Signature matched but refinement was inconclusive (e.g. a ZIP whose
    /// container type could not be probed).
    Probable,
    /// Unambiguous signature match.
    Certain,
}

/// Terminal outcome for one discovered file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Disposition {
    /// Placed in a normal type/date bin.
    Binned,
    /// Structurally damaged, segregated under quarantine/.
    Quarantined,
    /// Byte-identical to an earlier canonical file; not placed.
    Duplicate { of: PathBuf },
    /// This file failed processing; the run continued without it.
    Errored { cause: String },
}

impl Disposition {
    pub fn is_placed(&self) -> bool {
        matches!(self, Disposition::Binned | Disposition::Quarantined)
    }
}

/// Immutable per-input-file record. Built once by the pipeline, then owned by
/// the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub source: PathBuf,
    pub len: u64,
    pub fingerprint: String,
    pub kind: FileKind,
    pub confidence: Confidence,
    pub candidates: Vec<CandidateDate>,
    pub resolved: ResolvedDate,
    pub verdict: Verdict,
    /// Title recovered from internal metadata, if renaming requested it.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title_hint: Option<String>,
    pub disposition: Disposition,
    /// Destination relative to the destination root. Absent for duplicates
    /// and errored files.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub dest: Option<PathBuf>,
}
