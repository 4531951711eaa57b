use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::types::{Confidence, FileKind, PROBE_HEAD_LEN, PROBE_TAIL_LEN};

/// Bounded view of a file used for identification and structural checks.
/// Large media is never pulled into memory whole; `head` and `tail` are
/// fixed windows (and coincide with the full content for small files).
#[derive(Debug)]
pub struct Probe {
    pub len: u64,
    pub head: Vec<u8>,
    pub tail: Vec<u8>,
}

impl Probe {
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();

        let head_len = (len as usize).min(PROBE_HEAD_LEN);
        let mut head = vec![0u8; head_len];
        file.read_exact(&mut head)?;

        let tail = if len as usize <= PROBE_HEAD_LEN {
            head.clone()
        } else {
            let tail_len = (len as usize).min(PROBE_TAIL_LEN);
            let mut buf = vec![0u8; tail_len];
            file.seek(SeekFrom::End(-(tail_len as i64)))?;
            file.read_exact(&mut buf)?;
            buf
        };

        Ok(Self { len, head, tail })
    }
}

struct FileSignature {
    kind: FileKind,
    magic: &'static [u8],
    offset: usize,
}

const SIGNATURES: &[FileSignature] = &[
    FileSignature { kind: FileKind::Jpeg, magic: &[0xFF, 0xD8, 0xFF], offset: 0 },
    FileSignature { kind: FileKind::Png, magic: &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A], offset: 0 },
    FileSignature { kind: FileKind::Gif, magic: b"GIF87a", offset: 0 },
    FileSignature { kind: FileKind::Gif, magic: b"GIF89a", offset: 0 },
    FileSignature { kind: FileKind::Tiff, magic: &[0x49, 0x49, 0x2A, 0x00], offset: 0 },
    FileSignature { kind: FileKind::Tiff, magic: &[0x4D, 0x4D, 0x00, 0x2A], offset: 0 },
    FileSignature { kind: FileKind::Pdf, magic: b"%PDF-", offset: 0 },
    FileSignature { kind: FileKind::Zip, magic: &[0x50, 0x4B, 0x03, 0x04], offset: 0 },
    FileSignature { kind: FileKind::Gzip, magic: &[0x1F, 0x8B], offset: 0 },
    FileSignature { kind: FileKind::SevenZip, magic: &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C], offset: 0 },
    FileSignature { kind: FileKind::Rar, magic: b"Rar!\x1A\x07", offset: 0 },
    FileSignature { kind: FileKind::OleOffice, magic: &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1], offset: 0 },
    FileSignature { kind: FileKind::Rtf, magic: b"{\\rtf", offset: 0 },
    FileSignature { kind: FileKind::Sqlite, magic: b"SQLite format 3\x00", offset: 0 },
    FileSignature { kind: FileKind::Flac, magic: b"fLaC", offset: 0 },
    FileSignature { kind: FileKind::Mp3, magic: b"ID3", offset: 0 },
];

/// Identify a file's true format from its content signature.
///
/// Filenames and extensions are never consulted; carved input makes both
/// untrustworthy. Unrecognized content is `Unknown` with `Confidence::None`,
/// a valid terminal classification rather than an error.
pub fn identify(probe: &Probe) -> (FileKind, Confidence) {
    let head = probe.head.as_slice();

    for sig in SIGNATURES {
        let end = sig.offset + sig.magic.len();
        if head.len() >= end && &head[sig.offset..end] == sig.magic {
            return (sig.kind, Confidence::Certain);
        }
    }

    // "BM" alone is two bytes of English prose; require the rest of the
    // file header to hold up. Reserved bytes must be zero and the pixel
    // data offset must land inside the file, past the 14-byte header.
    if head.len() >= 14 && &head[0..2] == b"BM" && head[6..10] == [0, 0, 0, 0] {
        let data_offset = u32::from_le_bytes([head[10], head[11], head[12], head[13]]) as u64;
        if data_offset >= 14 && data_offset < probe.len {
            return (FileKind::Bmp, Confidence::Certain);
        }
    }

    // RIFF containers carry their real format tag at offset 8.
    if head.len() >= 12 && &head[0..4] == b"RIFF" {
        return match &head[8..12] {
            b"WEBP" => (FileKind::WebP, Confidence::Certain),
            b"WAVE" => (FileKind::Wav, Confidence::Certain),
            b"AVI " => (FileKind::Avi, Confidence::Certain),
            _ => (FileKind::Unknown, Confidence::None),
        };
    }

    // ISO base media: box size then "ftyp" then major brand.
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        let brand = &head[8..12];
        let kind = match brand {
            b"qt  " => FileKind::QuickTime,
            b"heic" | b"heix" | b"mif1" | b"msf1" => FileKind::Heic,
            _ => FileKind::Mp4,
        };
        return (kind, Confidence::Certain);
    }

    // Bare MPEG audio frame sync, no ID3 header. Weak signal.
    if head.len() >= 2 && head[0] == 0xFF && (head[1] & 0xE0) == 0xE0 && (head[1] & 0x06) != 0 {
        return (FileKind::Mp3, Confidence::Probable);
    }

    (FileKind::Unknown, Confidence::None)
}

/// Refine a generic ZIP signature into its container type by probing member
/// names. Unreadable archives stay `Zip` at `Probable`; refinement failure
/// is not evidence of anything.
pub fn refine_zip(path: &Path) -> (FileKind, Confidence) {
    let Ok(file) = File::open(path) else {
        return (FileKind::Zip, Confidence::Probable);
    };
    let Ok(archive) = zip::ZipArchive::new(file) else {
        return (FileKind::Zip, Confidence::Probable);
    };

    let mut has_content_types = false;
    let mut ooxml_root: Option<FileKind> = None;

    for name in archive.file_names() {
        if name == "[Content_Types].xml" {
            has_content_types = true;
        } else if name.starts_with("word/") {
            ooxml_root = Some(FileKind::Docx);
        } else if name.starts_with("xl/") {
            ooxml_root = Some(FileKind::Xlsx);
        } else if name.starts_with("ppt/") {
            ooxml_root = Some(FileKind::Pptx);
        }
    }

    match (has_content_types, ooxml_root) {
        (true, Some(kind)) => (kind, Confidence::Certain),
        _ => (FileKind::Zip, Confidence::Certain),
    }
}
