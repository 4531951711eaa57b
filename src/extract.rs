use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

use crate::date::exif::{exif_candidates, exif_make_model};
use crate::date::{CandidateDate, DateSource};
use crate::identify::Probe;
use crate::types::FileKind;

/// Raw output of metadata extraction for one file: zero or more candidate
/// dates plus an optional identity hint used for renaming.
///
/// Extractors degrade gracefully: malformed input yields an empty result,
/// never an error. A carved file with garbage metadata is the normal case,
/// not the exceptional one.
#[derive(Debug, Default)]
pub struct Extracted {
    pub candidates: Vec<CandidateDate>,
    pub title: Option<String>,
}

/// One source of recovered metadata. Extractors declare the kinds they can
/// read and must tolerate arbitrary garbage in those kinds.
pub trait MetadataExtractor: Send + Sync {
    fn supported_kinds(&self) -> &[FileKind];

    fn supports(&self, kind: FileKind) -> bool {
        self.supported_kinds().contains(&kind)
    }

    fn extract(&self, path: &Path, probe: &Probe) -> Extracted;
}

static EXTRACTORS: &[&dyn MetadataExtractor] =
    &[&ImageExtractor, &QuickTimeExtractor, &OoxmlExtractor, &PdfExtractor];

/// Run every extractor that supports `kind`, then append the filesystem
/// fallback. `fs_cutoff` gates that fallback: carved files usually carry the
/// carve time as mtime, so only an mtime older than the cutoff is worth
/// anything as evidence.
pub fn extract(path: &Path, probe: &Probe, kind: FileKind, fs_cutoff: NaiveDateTime) -> Extracted {
    let mut out = Extracted::default();
    for extractor in EXTRACTORS {
        if extractor.supports(kind) {
            let found = extractor.extract(path, probe);
            out.candidates.extend(found.candidates);
            if out.title.is_none() {
                out.title = found.title;
            }
        }
    }

    if let Some(mtime) = trusted_mtime(path, fs_cutoff) {
        out.candidates.push(CandidateDate::new(mtime, DateSource::FilesystemFallback));
    }

    out
}

/// EXIF, XMP and IPTC, all scanned from the head window.
struct ImageExtractor;

impl MetadataExtractor for ImageExtractor {
    fn supported_kinds(&self) -> &[FileKind] {
        &[FileKind::Jpeg, FileKind::Tiff, FileKind::Heic, FileKind::Png, FileKind::WebP]
    }

    fn extract(&self, _path: &Path, probe: &Probe) -> Extracted {
        let mut candidates = exif_candidates(&probe.head);
        candidates.extend(xmp_candidates(&probe.head));
        candidates.extend(iptc_candidates(&probe.head));
        Extracted { candidates, title: exif_make_model(&probe.head) }
    }
}

struct QuickTimeExtractor;

impl MetadataExtractor for QuickTimeExtractor {
    fn supported_kinds(&self) -> &[FileKind] {
        &[FileKind::Mp4, FileKind::QuickTime]
    }

    fn extract(&self, _path: &Path, probe: &Probe) -> Extracted {
        quicktime_metadata(probe)
    }
}

struct OoxmlExtractor;

impl MetadataExtractor for OoxmlExtractor {
    fn supported_kinds(&self) -> &[FileKind] {
        &[FileKind::Docx, FileKind::Xlsx, FileKind::Pptx]
    }

    fn extract(&self, path: &Path, _probe: &Probe) -> Extracted {
        ooxml_metadata(path)
    }
}

struct PdfExtractor;

impl MetadataExtractor for PdfExtractor {
    fn supported_kinds(&self) -> &[FileKind] {
        &[FileKind::Pdf]
    }

    fn extract(&self, _path: &Path, probe: &Probe) -> Extracted {
        pdf_metadata(probe)
    }
}

/// IPTC IIM record 2 dataset 55 is Date Created, eight digits YYYYMMDD
/// behind a 0x1C tag marker and a big-endian length.
fn iptc_candidates(head: &[u8]) -> Vec<CandidateDate> {
    let mut out = Vec::new();
    let mut search = head;
    let mut base = 0;
    while let Some(pos) = memchr::memmem::find(search, &[0x1C, 0x02, 0x37]) {
        let field = &head[base + pos..];
        if field.len() >= 5 + 8 {
            let len = u16::from_be_bytes([field[3], field[4]]) as usize;
            let data = &field[5..];
            if len == 8 && data.len() >= 8 && data[..8].iter().all(|b| b.is_ascii_digit()) {
                if let Ok(s) = std::str::from_utf8(&data[..8]) {
                    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y%m%d") {
                        if let Some(dt) = d.and_hms_opt(0, 0, 0) {
                            out.push(CandidateDate::new(dt, DateSource::Iptc));
                            break;
                        }
                    }
                }
            }
        }
        base += pos + 3;
        search = &head[base..];
    }
    out
}

/// XMP packets embed creation dates as `xmp:CreateDate` or
/// `photoshop:DateCreated`, in attribute or element form. A bounded text
/// scan over the head window is enough; full RDF parsing buys nothing here.
fn xmp_candidates(head: &[u8]) -> Vec<CandidateDate> {
    let mut out = Vec::new();
    for token in [&b"xmp:CreateDate"[..], &b"photoshop:DateCreated"[..]] {
        if let Some(pos) = memchr::memmem::find(head, token) {
            let rest = &head[pos + token.len()..head.len().min(pos + token.len() + 64)];
            if let Some(dt) = parse_xmp_value(rest) {
                out.push(CandidateDate::new(dt, DateSource::Xmp));
            }
        }
    }
    out
}

fn parse_xmp_value(rest: &[u8]) -> Option<NaiveDateTime> {
    // `="2008-05-01T12:00:00"` or `>2008-05-01T12:00:00<`.
    let open = rest.iter().position(|&b| b == b'"' || b == b'>')?;
    let value = &rest[open + 1..];
    let close = value.iter().position(|&b| b == b'"' || b == b'<')?;
    let s = std::str::from_utf8(&value[..close]).ok()?.trim();
    parse_iso_like(s)
}

/// The mvhd box stores creation time as seconds since 1904-01-01 UTC.
fn quicktime_metadata(probe: &Probe) -> Extracted {
    let mut candidates = Vec::new();
    for window in [&probe.head, &probe.tail] {
        if let Some(dt) = mvhd_creation_time(window) {
            candidates.push(CandidateDate::new(dt, DateSource::QuickTime));
            break;
        }
    }
    Extracted { candidates, title: None }
}

fn mvhd_creation_time(data: &[u8]) -> Option<NaiveDateTime> {
    let pos = memchr::memmem::find(data, b"mvhd")?;
    let body = &data[pos + 4..];
    if body.len() < 8 {
        return None;
    }
    let version = body[0];
    let creation = match version {
        0 => u32::from_be_bytes([body[4], body[5], body[6], body[7]]) as i64,
        1 if body.len() >= 12 => i64::from_be_bytes([
            body[4], body[5], body[6], body[7], body[8], body[9], body[10], body[11],
        ]),
        _ => return None,
    };
    if creation == 0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1904, 1, 1)?.and_hms_opt(0, 0, 0)?;
    epoch.checked_add_signed(Duration::seconds(creation))
}

/// OOXML core properties: `dcterms:created` for the date, `dc:title` for the
/// identity hint. The XML is small and rigid; a tag scan is sufficient.
fn ooxml_metadata(path: &Path) -> Extracted {
    let Some(core) = read_zip_member(path, "docProps/core.xml") else {
        return Extracted::default();
    };

    let mut candidates = Vec::new();
    if let Some(text) = xml_element_text(&core, "dcterms:created") {
        if let Some(dt) = parse_iso_like(&text) {
            candidates.push(CandidateDate::new(dt, DateSource::OfficeMeta));
        }
    }
    let title = xml_element_text(&core, "dc:title").filter(|t| !t.is_empty());

    Extracted { candidates, title }
}

fn read_zip_member(path: &Path, member: &str) -> Option<Vec<u8>> {
    let file = File::open(path).ok()?;
    let mut archive = zip::ZipArchive::new(file).ok()?;
    let mut entry = archive.by_name(member).ok()?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf).ok()?;
    Some(buf)
}

fn xml_element_text(xml: &[u8], element: &str) -> Option<String> {
    let open = format!("<{element}");
    let close = format!("</{element}>");
    let start = memchr::memmem::find(xml, open.as_bytes())?;
    let after = &xml[start..];
    let gt = memchr::memchr(b'>', after)?;
    let body = &after[gt + 1..];
    let end = memchr::memmem::find(body, close.as_bytes())?;
    String::from_utf8(body[..end].to_vec()).ok().map(|s| s.trim().to_string())
}

/// PDF info dictionary: `/CreationDate (D:YYYYMMDDHHmmSS...)`, with
/// `/ModDate` as the fallback. Both map to the PdfMeta source.
fn pdf_metadata(probe: &Probe) -> Extracted {
    let mut candidates = Vec::new();
    for key in [&b"/CreationDate"[..], &b"/ModDate"[..]] {
        for window in [&probe.head, &probe.tail] {
            if let Some(pos) = memchr::memmem::find(window, key) {
                let rest = &window[pos + key.len()..window.len().min(pos + key.len() + 40)];
                if let Some(dt) = parse_pdf_date(rest) {
                    candidates.push(CandidateDate::new(dt, DateSource::PdfMeta));
                    break;
                }
            }
        }
        if !candidates.is_empty() {
            break;
        }
    }
    Extracted { candidates, title: None }
}

fn parse_pdf_date(rest: &[u8]) -> Option<NaiveDateTime> {
    let d = memchr::memmem::find(rest, b"D:")?;
    let digits: Vec<u8> = rest[d + 2..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .copied()
        .collect();
    if digits.len() < 8 {
        return None;
    }
    let s = std::str::from_utf8(&digits).ok()?;
    let year: i32 = s[0..4].parse().ok()?;
    let month: u32 = s[4..6].parse().ok()?;
    let day: u32 = s[6..8].parse().ok()?;
    let hour: u32 = s.get(8..10).and_then(|v| v.parse().ok()).unwrap_or(0);
    let minute: u32 = s.get(10..12).and_then(|v| v.parse().ok()).unwrap_or(0);
    let second: u32 = s.get(12..14).and_then(|v| v.parse().ok()).unwrap_or(0);
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

fn trusted_mtime(path: &Path, fs_cutoff: NaiveDateTime) -> Option<NaiveDateTime> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let dt: DateTime<chrono::Utc> = modified.into();
    let naive = dt.naive_utc();
    (naive < fs_cutoff).then_some(naive)
}

fn parse_iso_like(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_creation_date_is_parsed() {
        let rest = b" (D:20080501120000+01'00')";
        let dt = parse_pdf_date(rest).unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2008-05-01 12:00:00");
    }

    #[test]
    fn pdf_date_without_time_defaults_to_midnight() {
        let dt = parse_pdf_date(b"(D:20080501)").unwrap();
        assert_eq!(dt.format("%H:%M:%S").to_string(), "00:00:00");
    }

    #[test]
    fn short_pdf_date_is_rejected() {
        assert!(parse_pdf_date(b"(D:2008)").is_none());
    }

    #[test]
    fn xmp_attribute_form_is_found() {
        let head = br#"<rdf:Description xmp:CreateDate="2012-09-14T08:30:00"/>"#;
        let cs = xmp_candidates(head);
        assert_eq!(cs.len(), 1);
        assert_eq!(cs[0].source, DateSource::Xmp);
        assert_eq!(cs[0].value.format("%Y-%m-%d").to_string(), "2012-09-14");
    }

    #[test]
    fn xmp_element_form_is_found() {
        let head = b"<xmp:CreateDate>2012-09-14T08:30:00</xmp:CreateDate>";
        assert_eq!(xmp_candidates(head).len(), 1);
    }

    #[test]
    fn iptc_date_created_is_found() {
        let mut head = b"garbage before".to_vec();
        head.extend_from_slice(&[0x1C, 0x02, 0x37, 0x00, 0x08]);
        head.extend_from_slice(b"20070322");
        let cs = iptc_candidates(&head);
        assert_eq!(cs.len(), 1);
        assert_eq!(cs[0].source, DateSource::Iptc);
        assert_eq!(cs[0].value.format("%Y-%m-%d").to_string(), "2007-03-22");
    }

    #[test]
    fn malformed_iptc_length_is_skipped() {
        let mut head = vec![0x1C, 0x02, 0x37, 0x00, 0x04];
        head.extend_from_slice(b"2007");
        assert!(iptc_candidates(&head).is_empty());
    }

    #[test]
    fn mvhd_v0_creation_time() {
        // 2010-01-01T00:00:00 UTC is 3345148800 seconds after 1904-01-01.
        let mut data = b"xxxxmvhd".to_vec();
        data.push(0);
        data.extend_from_slice(&[0, 0, 0]);
        data.extend_from_slice(&3_345_148_800u32.to_be_bytes());
        data.extend_from_slice(&[0u8; 8]);
        let dt = mvhd_creation_time(&data).unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2010-01-01");
    }

    #[test]
    fn zeroed_mvhd_yields_nothing() {
        let mut data = b"mvhd".to_vec();
        data.extend_from_slice(&[0u8; 12]);
        assert!(mvhd_creation_time(&data).is_none());
    }

    #[test]
    fn xml_element_text_extracts_trimmed_body() {
        let xml = b"<cp:coreProperties><dc:title> Quarterly Report </dc:title></cp:coreProperties>";
        assert_eq!(xml_element_text(xml, "dc:title").unwrap(), "Quarterly Report");
    }

    #[test]
    fn iso_parsing_accepts_rfc3339_and_bare_forms() {
        assert!(parse_iso_like("2012-09-14T08:30:00Z").is_some());
        assert!(parse_iso_like("2012-09-14T08:30:00").is_some());
        assert!(parse_iso_like("2012-09-14").is_some());
        assert!(parse_iso_like("yesterday").is_none());
    }
}
