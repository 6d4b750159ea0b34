//! Append-only run log, `manifest.tsv`.
//!
//! One line per dispatched attempt:
//! `object \t language \t content_hash \t created_utc \t summary \t artifact_path`.
//! Tabs, newlines, carriage returns and backslashes inside fields are escaped.

use chrono::{SecondsFormat, Utc};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.tsv";
const FIELD_COUNT: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub object: String,
    pub language: String,
    pub content_hash: String,
    /// RFC 3339, UTC, e.g. `2024-05-01T12:00:00Z`.
    pub created_utc: String,
    pub summary: String,
    pub artifact_path: String,
}

impl ManifestEntry {
    /// An entry stamped with the current time.
    pub fn now(
        object: impl Into<String>,
        language: impl Into<String>,
        content_hash: impl Into<String>,
        summary: impl Into<String>,
        artifact_path: impl Into<String>,
    ) -> Self {
        Self {
            object: object.into(),
            language: language.into(),
            content_hash: content_hash.into(),
            created_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            summary: summary.into(),
            artifact_path: artifact_path.into(),
        }
    }

    fn to_line(&self) -> String {
        let fields = [
            &self.object,
            &self.language,
            &self.content_hash,
            &self.created_utc,
            &self.summary,
            &self.artifact_path,
        ];
        let mut line = fields
            .iter()
            .map(|f| escape_field(f))
            .collect::<Vec<_>>()
            .join("\t");
        line.push('\n');
        line
    }

    fn from_line(line: &str) -> Option<Self> {
        let fields: Vec<String> = line.split('\t').map(unescape_field).collect();
        let [object, language, content_hash, created_utc, summary, artifact_path]: [String; FIELD_COUNT] =
            fields.try_into().ok()?;
        Some(Self {
            object,
            language,
            content_hash,
            created_utc,
            summary,
            artifact_path,
        })
    }
}

fn escape_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for ch in field.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

fn unescape_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
}

impl Manifest {
    /// The manifest stored directly under `out_root`.
    pub fn in_dir(out_root: &Path) -> Self {
        Self {
            path: out_root.join(MANIFEST_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry with a single write on an append-mode handle, so
    /// concurrent writers never interleave within a line.
    pub fn append(&self, entry: &ManifestEntry) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(entry.to_line().as_bytes())
    }

    /// All entries in append order. A missing manifest is empty.
    pub fn read_entries(&self) -> io::Result<Vec<ManifestEntry>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            match ManifestEntry::from_line(line) {
                Some(entry) => entries.push(entry),
                None => log::warn!(
                    "{}:{}: expected {} fields, skipping",
                    self.path.display(),
                    index + 1,
                    FIELD_COUNT
                ),
            }
        }
        Ok(entries)
    }
}
