use chrono::NaiveDateTime;
use exif::{In, Reader, Tag};
use std::io::Cursor;

use super::{CandidateDate, DateSource};

/// Candidate dates from EXIF fields embedded in image bytes.
///
/// EXIF datetimes carry no timezone; they are taken as-is. Malformed EXIF
/// yields an empty set, never an error.
pub fn exif_candidates(bytes: &[u8]) -> Vec<CandidateDate> {
    let Ok(reader) = Reader::new().read_from_container(&mut Cursor::new(bytes)) else {
        return Vec::new();
    };

    let tags = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];
    let mut out = Vec::new();

    for tag in &tags {
        if let Some(field) = reader.get_field(*tag, In::PRIMARY) {
            let val = field.display_value().to_string();
            if let Some(dt) = parse_exif_datetime(&val) {
                out.push(CandidateDate::new(dt, DateSource::Exif));
            }
        }
    }

    out
}

/// Camera make/model, used as an identity hint for renaming.
pub fn exif_make_model(bytes: &[u8]) -> Option<String> {
    let reader = Reader::new().read_from_container(&mut Cursor::new(bytes)).ok()?;

    let make = ascii_field(&reader, Tag::Make);
    let model = ascii_field(&reader, Tag::Model);

    match (make, model) {
        (Some(mk), Some(md)) => Some(format!("{mk} {md}")),
        (Some(mk), None) => Some(mk),
        (None, Some(md)) => Some(md),
        (None, None) => None,
    }
}

fn ascii_field(reader: &exif::Exif, tag: Tag) -> Option<String> {
    let field = reader.get_field(tag, In::PRIMARY)?;
    let s = field.display_value().to_string();
    let trimmed = s.trim_matches(|c: char| c == '"' || c.is_whitespace());
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// EXIF uses `YYYY:MM:DD HH:MM:SS`, but carved files show every separator
/// under the sun.
fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let cleaned = s
        .replace('-', ":")
        .replace('/', ":")
        .replace('\\', ":")
        .replace('.', ":");

    if let Ok(dt) = NaiveDateTime::parse_from_str(&cleaned, "%Y:%m:%d %H:%M:%S") {
        return Some(dt);
    }

    if let Ok(d) = chrono::NaiveDate::parse_from_str(cleaned.split(' ').next()?, "%Y:%m:%d") {
        return d.and_hms_opt(0, 0, 0);
    }

    None
}
