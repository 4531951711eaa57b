use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use tidesort::pipeline::{self, PipelineConfig};
use tidesort::rename::RenamePolicy;
use tidesort::{Disposition, FileKind};

fn minimal_jpeg() -> Vec<u8> {
    let mut j = vec![0xFF, 0xD8];
    j.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x43, 0x00]);
    j.extend(std::iter::repeat(10u8).take(64));
    j.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
    j.extend_from_slice(&[0x12, 0x34, 0x56]);
    j.extend_from_slice(&[0xFF, 0xD9]);
    j
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, bytes).unwrap();
    path
}

fn write_docx(dir: &Path, name: &str, title: &str, created: &str) -> PathBuf {
    let path = dir.join(name);
    let file = fs::File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let opts = zip::write::SimpleFileOptions::default();

    zip.start_file("[Content_Types].xml", opts).unwrap();
    zip.write_all(b"<Types/>").unwrap();

    zip.start_file("word/document.xml", opts).unwrap();
    zip.write_all(b"<w:document/>").unwrap();

    zip.start_file("docProps/core.xml", opts).unwrap();
    write!(
        zip,
        "<cp:coreProperties><dc:title>{title}</dc:title>\
         <dcterms:created>{created}</dcterms:created></cp:coreProperties>"
    )
    .unwrap();

    zip.finish().unwrap();
    path
}

fn config(source: &Path, dest: &Path) -> PipelineConfig {
    PipelineConfig::new(source.to_path_buf(), dest.to_path_buf())
}

/// Every destination path under `root`, relative, sorted.
fn tree(root: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path().strip_prefix(root).unwrap().to_path_buf())
        .collect();
    paths.sort();
    paths
}

#[test]
fn valid_undated_jpeg_lands_in_date_unknown_bin() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let source = write_file(src.path(), "holiday.jpg", &minimal_jpeg());

    let outcome = pipeline::run(&config(src.path(), dst.path())).unwrap();

    assert_eq!(outcome.summary.binned, 1);
    let placed = dst.path().join("Images/JPEG/date-unknown/holiday.jpg");
    assert!(placed.is_file());
    assert_eq!(fs::read(&placed).unwrap(), minimal_jpeg());
    // Originals are never touched.
    assert!(source.is_file());
}

#[test]
fn identified_kind_overrides_misleading_extension() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write_file(src.path(), "f0000001.txt", &minimal_jpeg());

    pipeline::run(&config(src.path(), dst.path())).unwrap();

    assert!(dst.path().join("Images/JPEG/date-unknown/f0000001.jpg").is_file());
}

#[test]
fn duplicate_content_is_recorded_but_not_placed() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let first = write_file(src.path(), "a.jpg", &minimal_jpeg());
    write_file(src.path(), "b.jpg", &minimal_jpeg());

    let outcome = pipeline::run(&config(src.path(), dst.path())).unwrap();

    assert_eq!(outcome.summary.binned, 1);
    assert_eq!(outcome.summary.duplicates, 1);

    let dup = outcome
        .records
        .iter()
        .find(|r| r.source.ends_with("b.jpg"))
        .unwrap();
    match &dup.disposition {
        Disposition::Duplicate { of } => assert_eq!(of, &first),
        other => panic!("expected duplicate, got {other:?}"),
    }
    assert_eq!(tree(&dst.path().join("Images")).len(), 1);
}

#[test]
fn truncated_jpeg_is_quarantined_by_kind() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let mut bytes = minimal_jpeg();
    bytes.truncate(bytes.len() - 2);
    write_file(src.path(), "cut.jpg", &bytes);

    let outcome = pipeline::run(&config(src.path(), dst.path())).unwrap();

    assert_eq!(outcome.summary.quarantined, 1);
    assert!(dst.path().join("quarantine/Images/JPEG/cut.jpg").is_file());
    assert!(!dst.path().join("Images").exists());
}

#[test]
fn unidentified_bytes_go_to_unsorted_keeping_their_extension() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write_file(src.path(), "notes.txt", b"just some plain text, no signature");

    let outcome = pipeline::run(&config(src.path(), dst.path())).unwrap();

    // Unknown is not damage; the file is kept, not quarantined.
    assert_eq!(outcome.summary.binned, 1);
    assert_eq!(outcome.records[0].kind, FileKind::Unknown);
    assert!(dst.path().join("unsorted/date-unknown/notes.txt").is_file());
}

#[test]
fn docx_is_dated_from_core_properties_and_renamed_from_title() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write_docx(src.path(), "f1234567.docx", "Quarterly Report", "2021-03-05T10:00:00Z");

    let outcome = pipeline::run(&config(src.path(), dst.path())).unwrap();

    assert_eq!(outcome.summary.binned, 1);
    let placed = dst
        .path()
        .join("Office/Word/2021/03/f1234567-Quarterly-Report.docx");
    assert!(placed.is_file(), "tree: {:?}", tree(dst.path()));
}

#[test]
fn rename_none_keeps_carved_stems() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write_docx(src.path(), "f1234567.docx", "Quarterly Report", "2021-03-05T10:00:00Z");

    let mut cfg = config(src.path(), dst.path());
    cfg.rename = RenamePolicy::None;
    pipeline::run(&cfg).unwrap();

    assert!(dst.path().join("Office/Word/2021/03/f1234567.docx").is_file());
}

#[test]
fn name_collisions_get_a_stable_fingerprint_suffix() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write_file(src.path(), "one/pic.jpg", &minimal_jpeg());
    let mut other = minimal_jpeg();
    other.insert(2, 0xFF);
    other.insert(3, 0xFE);
    other.insert(4, 0x00);
    other.insert(5, 0x04);
    other.insert(6, b'h');
    other.insert(7, b'i');
    write_file(src.path(), "two/pic.jpg", &other);

    let outcome = pipeline::run(&config(src.path(), dst.path())).unwrap();

    assert_eq!(outcome.summary.binned, 2);
    let bin = dst.path().join("Images/JPEG/date-unknown");
    assert!(bin.join("pic.jpg").is_file());

    let suffixed = outcome
        .records
        .iter()
        .find(|r| r.source.ends_with("two/pic.jpg"))
        .and_then(|r| r.dest.clone())
        .unwrap();
    let name = suffixed.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("pic~") && name.ends_with(".jpg"), "got {name}");
    assert!(dst.path().join(&suffixed).is_file());
}

#[test]
fn dry_run_decides_everything_but_moves_nothing() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write_file(src.path(), "a.jpg", &minimal_jpeg());
    write_file(src.path(), "notes.txt", b"plain text");

    let mut cfg = config(src.path(), dst.path());
    cfg.dry_run = true;
    let outcome = pipeline::run(&cfg).unwrap();

    assert_eq!(outcome.summary.binned, 2);
    for record in &outcome.records {
        assert!(record.dest.is_some());
    }
    // Only the manifest may exist at the destination.
    assert_eq!(tree(dst.path()), vec![PathBuf::from("manifest.jsonl")]);
}

#[test]
fn rerun_resumes_without_redoing_work() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write_file(src.path(), "a.jpg", &minimal_jpeg());
    write_file(src.path(), "notes.txt", b"plain text");

    let cfg = config(src.path(), dst.path());
    let first = pipeline::run(&cfg).unwrap();
    assert_eq!(first.summary.total(), 2);

    let second = pipeline::run(&cfg).unwrap();
    assert_eq!(second.summary.skipped_resumed, 2);
    assert_eq!(second.summary.total(), 0);
}

#[test]
fn identical_sources_produce_identical_trees() {
    let src_a = TempDir::new().unwrap();
    let src_b = TempDir::new().unwrap();
    for src in [src_a.path(), src_b.path()] {
        write_file(src, "one/pic.jpg", &minimal_jpeg());
        write_file(src, "notes.txt", b"plain text");
        let mut cut = minimal_jpeg();
        cut.truncate(4);
        write_file(src, "cut.jpg", &cut);
    }

    let dst_a = TempDir::new().unwrap();
    let dst_b = TempDir::new().unwrap();
    pipeline::run(&config(src_a.path(), dst_a.path())).unwrap();
    pipeline::run(&config(src_b.path(), dst_b.path())).unwrap();

    assert_eq!(tree(dst_a.path()), tree(dst_b.path()));
}

#[test]
fn every_discovered_file_gets_exactly_one_disposition() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write_file(src.path(), "a.jpg", &minimal_jpeg());
    write_file(src.path(), "b.jpg", &minimal_jpeg());
    let mut cut = minimal_jpeg();
    cut.truncate(4);
    write_file(src.path(), "cut.jpg", &cut);
    write_file(src.path(), "notes.txt", b"plain text");
    write_file(src.path(), "empty.bin", b"");

    let outcome = pipeline::run(&config(src.path(), dst.path())).unwrap();

    assert_eq!(outcome.summary.total(), 5);
    assert_eq!(outcome.records.len(), 5);
}

#[cfg(unix)]
#[test]
fn unreadable_file_is_errored_and_the_rest_still_bin() {
    use std::os::unix::fs::PermissionsExt;

    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write_file(src.path(), "good.jpg", &minimal_jpeg());
    let blocked = write_file(src.path(), "locked.jpg", &minimal_jpeg());
    fs::set_permissions(&blocked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read(&blocked).is_ok() {
        // Privileged users bypass permission bits; nothing to exercise here.
        return;
    }

    let outcome = pipeline::run(&config(src.path(), dst.path())).unwrap();

    assert_eq!(outcome.summary.errored, 1);
    assert_eq!(outcome.summary.binned, 1);
    // One terminal disposition per discovered file, error or not.
    assert_eq!(outcome.summary.total(), 2);

    let errored = outcome
        .records
        .iter()
        .find(|r| r.source.ends_with("locked.jpg"))
        .unwrap();
    match &errored.disposition {
        Disposition::Errored { cause } => assert!(!cause.is_empty()),
        other => panic!("expected errored, got {other:?}"),
    }
    assert!(errored.dest.is_none());
    assert!(dst.path().join("Images/JPEG/date-unknown/good.jpg").is_file());
}

#[test]
fn empty_files_dedup_to_one_group() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    write_file(src.path(), "a.bin", b"");
    write_file(src.path(), "b.bin", b"");

    let outcome = pipeline::run(&config(src.path(), dst.path())).unwrap();

    assert_eq!(outcome.summary.binned, 1);
    assert_eq!(outcome.summary.duplicates, 1);
}
