use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::manifest::{self, Summary};
use crate::types::{Disposition, FileRecord};

pub const REPORT_NAME: &str = "report.html";

/// Render a standalone HTML summary from the manifest alone. The report is
/// derived data; everything in it must be reconstructible from
/// `manifest.jsonl`.
pub fn write_report(dest_root: &Path) -> Result<PathBuf> {
    let records = load_records(dest_root)?;

    let mut summary = Summary::default();
    let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
    let mut quarantined: Vec<&FileRecord> = Vec::new();

    for record in &records {
        summary.add(&record.disposition);
        if record.disposition.is_placed() {
            *by_kind.entry(record.kind.to_string()).or_insert(0) += 1;
        }
        if record.disposition == Disposition::Quarantined {
            quarantined.push(record);
        }
    }

    let mut html = String::with_capacity(4096);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>Triage report</title>\n");
    html.push_str(
        "<style>body{font-family:sans-serif;margin:2em}table{border-collapse:collapse}\
         td,th{border:1px solid #999;padding:4px 10px;text-align:left}</style>\n",
    );
    html.push_str("</head>\n<body>\n<h1>Triage report</h1>\n");

    html.push_str("<h2>Totals</h2>\n<table>\n");
    push_row(&mut html, "Binned", summary.binned);
    push_row(&mut html, "Quarantined", summary.quarantined);
    push_row(&mut html, "Duplicates", summary.duplicates);
    push_row(&mut html, "Errored", summary.errored);
    push_row(&mut html, "Total", summary.total());
    html.push_str("</table>\n");

    html.push_str("<h2>Placed by type</h2>\n<table>\n<tr><th>Type</th><th>Count</th></tr>\n");
    for (kind, count) in &by_kind {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td></tr>\n",
            escape(kind),
            count
        ));
    }
    html.push_str("</table>\n");

    if !quarantined.is_empty() {
        html.push_str("<h2>Quarantined</h2>\n<table>\n<tr><th>Source</th><th>Reason</th></tr>\n");
        for record in &quarantined {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td></tr>\n",
                escape(&record.source.display().to_string()),
                escape(record.verdict.reason().unwrap_or("damaged")),
            ));
        }
        html.push_str("</table>\n");
    }

    html.push_str("</body>\n</html>\n");

    let path = dest_root.join(REPORT_NAME);
    fs::write(&path, html)?;
    info!(?path, "report written");
    Ok(path)
}

/// All manifest lines in file order, skipping undecodable lines the same
/// way the resume loader does.
fn load_records(dest_root: &Path) -> Result<Vec<FileRecord>> {
    let path = dest_root.join(manifest::MANIFEST_NAME);
    let file = match fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<FileRecord>(&line) {
            Ok(r) => records.push(r),
            Err(e) => info!("skipping undecodable manifest entry: {e}"),
        }
    }
    Ok(records)
}

fn push_row(html: &mut String, label: &str, count: usize) {
    html.push_str(&format!("<tr><td>{label}</td><td>{count}</td></tr>\n"));
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
