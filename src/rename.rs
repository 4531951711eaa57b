use serde::{Deserialize, Serialize};

/// Filename budget in bytes; common filesystems cap names at 255.
const MAX_NAME_BYTES: usize = 240;
const MAX_TITLE_CHARS: usize = 60;

/// Which files are eligible for content-aware renaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RenamePolicy {
    /// Never rename.
    None,
    /// Rename only machine-generated carved names (e.g. PhotoRec's
    /// `f0123456`), which carry no information worth preserving.
    Carved,
    /// Rename everything with a usable metadata title.
    All,
}

impl RenamePolicy {
    pub fn applies_to(&self, stem: &str) -> bool {
        match self {
            RenamePolicy::None => false,
            RenamePolicy::Carved => is_carved_stem(stem),
            RenamePolicy::All => true,
        }
    }
}

/// PhotoRec and friends emit `f` followed by a run of at least seven digits.
pub fn is_carved_stem(stem: &str) -> bool {
    let mut chars = stem.chars();
    if chars.next() != Some('f') {
        return false;
    }
    let digits = chars.take_while(|c| c.is_ascii_digit()).count();
    digits >= 7
}

/// Build the renamed stem: original stem plus the sanitized title, capped to
/// the filesystem byte budget. Returns None when the title sanitizes away to
/// nothing.
pub fn renamed_stem(stem: &str, title: &str) -> Option<String> {
    let clean = sanitize_title(title);
    if clean.is_empty() {
        return None;
    }
    Some(enforce_byte_limit(format!("{stem}-{clean}")))
}

/// Reduce recovered metadata text to a filename-safe token. Carved metadata
/// is full of artifacts: embedded NULs, UTF-16 shrapnel, separator runs.
pub fn sanitize_title(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_dash = true;
    for c in text.chars() {
        if c == '\0' {
            continue;
        }
        if c.is_alphanumeric() {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_matches('-');

    if trimmed.chars().count() <= MAX_TITLE_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(MAX_TITLE_CHARS).collect();
    // Prefer cutting on a word boundary.
    match cut.rfind('-') {
        Some(idx) if idx > 0 => cut[..idx].to_string(),
        _ => cut,
    }
}

fn enforce_byte_limit(mut stem: String) -> String {
    while stem.len() > MAX_NAME_BYTES {
        stem.pop();
    }
    stem.trim_end_matches('-').to_string()
}
