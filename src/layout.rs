use std::path::{Path, PathBuf};

use chrono::Datelike;

use crate::date::ResolvedDate;
use crate::types::FileKind;
use crate::validate::Verdict;

/// Hex digits of the fingerprint used to disambiguate name collisions.
const COLLISION_SUFFIX_LEN: usize = 8;

/// Destination directory for a (kind, resolved date, verdict) triple,
/// relative to the destination root.
///
/// Pure and total: the same triple always yields the same path. Precedence:
/// a damaged verdict overrides type/date and routes to quarantine,
/// partitioned by kind so damaged JPEGs and damaged PDFs never mix.
pub fn bin_dir(kind: FileKind, resolved: &ResolvedDate, verdict: &Verdict) -> PathBuf {
    if verdict.is_damaged() {
        return Path::new("quarantine").join(kind.family()).join(kind.label());
    }

    let mut dir = PathBuf::from(kind.family());
    if kind != FileKind::Unknown {
        dir.push(kind.label());
    }

    match resolved.value() {
        Some(value) => {
            dir.push(format!("{:04}", value.year()));
            dir.push(format!("{:02}", value.month()));
        }
        None => dir.push("date-unknown"),
    }
    dir
}

/// Filename at the destination. The identified kind supplies the extension;
/// whatever extension the carved file carried is untrustworthy. Unknown
/// kinds keep their original extension when one exists.
pub fn dest_filename(source: &Path, kind: FileKind, new_stem: Option<&str>) -> String {
    let stem = new_stem
        .or_else(|| source.file_stem().and_then(|s| s.to_str()))
        .unwrap_or("file");

    let ext = if kind == FileKind::Unknown {
        source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_else(|| kind.extension())
    } else {
        kind.extension()
    };

    format!("{stem}.{ext}")
}

/// Resolve a name collision by suffixing the filename with a fingerprint
/// prefix. Stable and reproducible: re-runs converge to the same name,
/// unlike a counter.
pub fn disambiguate(path: &Path, fingerprint: &str) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let tag = &fingerprint[..COLLISION_SUFFIX_LEN.min(fingerprint.len())];
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}~{tag}.{ext}"),
        None => format!("{stem}~{tag}"),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::{ConfidenceTier, DateSource};
    use chrono::NaiveDate;

    fn known(y: i32, m: u32) -> ResolvedDate {
        ResolvedDate::Known {
            value: NaiveDate::from_ymd_opt(y, m, 15).unwrap().and_hms_opt(9, 0, 0).unwrap(),
            provenance: DateSource::Exif,
            tier: ConfidenceTier::High,
            ambiguous: false,
        }
    }

    #[test]
    fn dated_jpeg_bins_by_year_month() {
        let dir = bin_dir(FileKind::Jpeg, &known(2009, 7), &Verdict::Valid);
        assert_eq!(dir, Path::new("Images/JPEG/2009/07"));
    }

    #[test]
    fn damaged_overrides_type_and_date() {
        let v = Verdict::corrupt("chunk CRC mismatch");
        let dir = bin_dir(FileKind::Jpeg, &known(2009, 7), &v);
        assert_eq!(dir, Path::new("quarantine/Images/JPEG"));
    }

    #[test]
    fn unknown_kind_without_date_is_unsorted() {
        let dir = bin_dir(FileKind::Unknown, &ResolvedDate::Unknown, &Verdict::Unsupported);
        assert_eq!(dir, Path::new("unsorted/date-unknown"));
    }

    #[test]
    fn unsupported_verdict_still_bins_normally() {
        let dir = bin_dir(FileKind::Sqlite, &ResolvedDate::Unknown, &Verdict::Unsupported);
        assert_eq!(dir, Path::new("Other/SQLite/date-unknown"));
    }

    #[test]
    fn assignment_is_deterministic() {
        let a = bin_dir(FileKind::Pdf, &known(2013, 2), &Verdict::Valid);
        let b = bin_dir(FileKind::Pdf, &known(2013, 2), &Verdict::Valid);
        assert_eq!(a, b);
    }

    #[test]
    fn identified_kind_supplies_the_extension() {
        let name = dest_filename(Path::new("f1234567.txt"), FileKind::Jpeg, None);
        assert_eq!(name, "f1234567.jpg");
    }

    #[test]
    fn unknown_kind_keeps_original_extension() {
        let name = dest_filename(Path::new("f1234567.dat"), FileKind::Unknown, None);
        assert_eq!(name, "f1234567.dat");
        let bare = dest_filename(Path::new("f1234567"), FileKind::Unknown, None);
        assert_eq!(bare, "f1234567.bin");
    }

    #[test]
    fn collision_suffix_is_fingerprint_derived() {
        let p = disambiguate(Path::new("Images/JPEG/2009/07/pic.jpg"), "deadbeefcafe0123");
        assert_eq!(p, Path::new("Images/JPEG/2009/07/pic~deadbeef.jpg"));
        // Same inputs, same answer.
        assert_eq!(p, disambiguate(Path::new("Images/JPEG/2009/07/pic.jpg"), "deadbeefcafe0123"));
    }
}
