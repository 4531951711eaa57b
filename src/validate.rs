use serde::{Deserialize, Serialize};

use crate::identify::Probe;
use crate::types::FileKind;

/// Sub-classification of a damaged file. Truncation is common in carved
/// data (a file cut off mid-stream) and is kept distinct from other
/// corruption where the check can tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageKind {
    Truncated,
    Corrupt,
}

/// Structural integrity verdict for an identified file.
///
/// `Unsupported` means no checker exists for the kind; that is not evidence
/// of corruption and never routes a file to quarantine. A `Damaged` verdict
/// segregates the file; it is never escalated to deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Valid,
    Damaged { kind: DamageKind, reason: String },
    Unsupported,
}

impl Verdict {
    pub fn truncated(reason: impl Into<String>) -> Self {
        Verdict::Damaged { kind: DamageKind::Truncated, reason: reason.into() }
    }

    pub fn corrupt(reason: impl Into<String>) -> Self {
        Verdict::Damaged { kind: DamageKind::Corrupt, reason: reason.into() }
    }

    pub fn is_damaged(&self) -> bool {
        matches!(self, Verdict::Damaged { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::Damaged { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Dispatch the structural check for `kind`. Works on the probe's bounded
/// head/tail windows so large media never has to fit in memory.
pub fn validate(probe: &Probe, kind: FileKind) -> Verdict {
    match kind {
        FileKind::Jpeg => validate_jpeg(probe),
        FileKind::Png => validate_png(probe),
        FileKind::Gif => validate_gif(probe),
        FileKind::Pdf => validate_pdf(probe),
        FileKind::Zip | FileKind::Docx | FileKind::Xlsx | FileKind::Pptx => validate_zip(probe),
        FileKind::Mp4 | FileKind::QuickTime | FileKind::Heic => validate_isobmff(probe),
        FileKind::Wav | FileKind::Avi | FileKind::WebP => validate_riff(probe),
        _ => Verdict::Unsupported,
    }
}

const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];
const PNG_IEND: &[u8] = b"IEND\xAE\x42\x60\x82";
const ZIP_EOCD: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];

/// Marker walk through the head window: SOI, sane segment lengths, a start
/// of scan, then an EOI trailer somewhere near the end of the tail.
fn validate_jpeg(probe: &Probe) -> Verdict {
    let data = &probe.head;
    if data.len() < 4 || data[0..2] != [0xFF, 0xD8] {
        return Verdict::corrupt("missing SOI marker");
    }

    let mut pos = 2usize;
    let mut has_sos = false;

    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return Verdict::corrupt(format!("expected marker at offset {pos}"));
        }
        // Fill bytes before a marker are legal.
        while pos < data.len() && data[pos] == 0xFF && data.get(pos + 1) == Some(&0xFF) {
            pos += 1;
        }
        let Some(&marker) = data.get(pos + 1) else { break };
        match marker {
            0xD8 => return Verdict::corrupt(format!("unexpected SOI at offset {pos}")),
            // TEM and restart markers are standalone.
            0x01 | 0xD0..=0xD7 => pos += 2,
            0xDA => {
                has_sos = true;
                break;
            }
            _ => {
                if pos + 4 > data.len() {
                    break;
                }
                let seg_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
                if seg_len < 2 {
                    return Verdict::corrupt(format!("invalid segment length at offset {pos}"));
                }
                pos += 2 + seg_len;
            }
        }
    }

    // SOS may lie beyond the head window for files with huge metadata
    // segments; only fail when the whole file fit in the window.
    if !has_sos && probe.len as usize <= data.len() {
        return Verdict::truncated("no start-of-scan marker");
    }

    if find_in_last(&probe.tail, &JPEG_EOI, 4096).is_none() {
        return Verdict::truncated("missing EOI trailer");
    }

    Verdict::Valid
}

/// Chunk walk with CRC verification (for chunks fully inside the head
/// window), then an IEND trailer check.
fn validate_png(probe: &Probe) -> Verdict {
    let data = &probe.head;
    if data.len() < 8 {
        return Verdict::truncated("shorter than the PNG signature");
    }

    let mut pos = 8usize;
    let mut first = true;

    while pos + 8 <= data.len() {
        let chunk_len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let chunk_type = &data[pos + 4..pos + 8];

        if first {
            if chunk_type != b"IHDR" {
                return Verdict::corrupt("first chunk is not IHDR");
            }
            if chunk_len != 13 {
                return Verdict::corrupt("IHDR has wrong length");
            }
            first = false;
        }

        if chunk_len > 0x7FFF_FFFF {
            return Verdict::corrupt(format!("chunk length out of range at offset {pos}"));
        }

        let chunk_end = pos + 8 + chunk_len + 4;
        if chunk_end > data.len() {
            // Chunk extends past the window; trailer check below decides.
            break;
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&data[pos + 4..pos + 8 + chunk_len]);
        let expected = u32::from_be_bytes([
            data[pos + 8 + chunk_len],
            data[pos + 8 + chunk_len + 1],
            data[pos + 8 + chunk_len + 2],
            data[pos + 8 + chunk_len + 3],
        ]);
        if hasher.finalize() != expected {
            return Verdict::corrupt(format!("chunk CRC mismatch at offset {pos}"));
        }

        if chunk_type == b"IEND" {
            return Verdict::Valid;
        }
        pos = chunk_end;
    }

    if first {
        return Verdict::truncated("no complete chunk");
    }

    if find_in_last(&probe.tail, PNG_IEND, 4096).is_none() {
        return Verdict::truncated("missing IEND trailer");
    }

    Verdict::Valid
}

fn validate_gif(probe: &Probe) -> Verdict {
    match probe.tail.last() {
        Some(0x3B) => Verdict::Valid,
        Some(_) => Verdict::truncated("missing GIF trailer"),
        None => Verdict::truncated("empty file"),
    }
}

fn validate_pdf(probe: &Probe) -> Verdict {
    if memchr::memmem::find(&probe.tail, b"%%EOF").is_none() {
        return Verdict::truncated("no %%EOF in the final window");
    }
    Verdict::Valid
}

/// The end-of-central-directory record lives near the tail of every intact
/// ZIP. Its absence is the classic signature of a carved archive cut short.
fn validate_zip(probe: &Probe) -> Verdict {
    if memchr::memmem::rfind(&probe.tail, &ZIP_EOCD).is_none() {
        return Verdict::truncated("no end-of-central-directory record");
    }
    Verdict::Valid
}

/// Top-level box walk: ftyp first, then moov/mdat must show up somewhere in
/// the head or tail window. An ftyp with nothing behind it is a carved
/// header fragment.
fn validate_isobmff(probe: &Probe) -> Verdict {
    let data = &probe.head;
    if data.len() < 12 || &data[4..8] != b"ftyp" {
        return Verdict::corrupt("missing ftyp box");
    }

    let mut pos = 0usize;
    let mut seen_payload = false;

    while pos + 8 <= data.len() {
        let size = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as u64;
        let box_type = &data[pos + 4..pos + 8];
        if matches!(box_type, b"moov" | b"mdat") {
            seen_payload = true;
            break;
        }
        // size 0 = to end of file, size 1 = 64-bit size; both end the walk.
        if size < 8 {
            break;
        }
        match pos.checked_add(size as usize) {
            Some(next) if next > pos => pos = next,
            _ => break,
        }
    }

    if !seen_payload {
        seen_payload = memchr::memmem::find(&probe.tail, b"moov").is_some()
            || memchr::memmem::find(&probe.tail, b"mdat").is_some();
    }

    if !seen_payload {
        return Verdict::truncated("ftyp without moov or mdat");
    }
    Verdict::Valid
}

/// RIFF files declare their payload size at offset 4; a shorter actual file
/// was cut off mid-stream.
fn validate_riff(probe: &Probe) -> Verdict {
    let data = &probe.head;
    if data.len() < 12 {
        return Verdict::truncated("shorter than a RIFF header");
    }
    let declared = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as u64 + 8;
    if probe.len < declared {
        return Verdict::truncated(format!(
            "declared {declared} bytes, found {}",
            probe.len
        ));
    }
    Verdict::Valid
}

/// Search the last `window` bytes of `data` for `needle`.
fn find_in_last(data: &[u8], needle: &[u8], window: usize) -> Option<usize> {
    let start = data.len().saturating_sub(window);
    memchr::memmem::rfind(&data[start..], needle).map(|p| start + p)
}
