//! The documentation header and the gate built on it.
//!
//! ```text
//! /*---DOC---
//! {
//!   "object": "demo.echo_c",
//!   "language": "c",
//!   "summary": "Echoes its input.",
//!   "entry": "stdio-json"
//! }
//! ---END---*/
//! ```

use crate::codes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Component, Path};
use thiserror::Error;

pub const DOC_OPEN: &str = "/*---DOC---";
pub const DOC_CLOSE: &str = "---END---*/";
/// The opening delimiter must start within this many bytes.
pub const DOC_SEARCH_LIMIT: usize = 8 * 1024;

pub const STDIO_JSON: &str = "stdio-json";

/// Location of the header inside a source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocBlock<'a> {
    /// Byte offset of `/*---DOC---`.
    pub start: usize,
    /// Byte offset just past `---END---*/`.
    pub end: usize,
    /// Text between the delimiters.
    pub body: &'a str,
}

pub fn extract_doc_block(source: &str) -> Option<DocBlock<'_>> {
    let start = source.find(DOC_OPEN)?;
    if start >= DOC_SEARCH_LIMIT {
        return None;
    }
    let body_start = start + DOC_OPEN.len();
    let close = source[body_start..].find(DOC_CLOSE)? + body_start;
    Some(DocBlock {
        start,
        end: close + DOC_CLOSE.len(),
        body: &source[body_start..close],
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    C,
    Cpp,
    Java,
    Python,
}

impl Language {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "c" => Some(Language::C),
            "cpp" | "c++" | "cplusplus" => Some(Language::Cpp),
            "java" => Some(Language::Java),
            "python" => Some(Language::Python),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Python => "python",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraFile {
    /// Path relative to the work directory.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Reference the caller is expected to inline before execution.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSpec {
    pub cflags: String,
    pub ldflags: String,
    pub classpath: String,
    pub venv: String,
    pub python_requirements: Vec<String>,
}

impl BuildSpec {
    pub fn wants_venv(&self) -> bool {
        !self.venv.trim().is_empty() || !self.python_requirements.is_empty()
    }
}

fn default_main() -> String {
    "main".to_string()
}

/// Parsed documentation header. Unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doc {
    pub object: String,
    pub language: String,
    pub summary: String,
    pub entry: String,
    #[serde(default = "default_main")]
    pub main: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(default)]
    pub files: Vec<ExtraFile>,
    #[serde(default)]
    pub build: BuildSpec,
}

impl Doc {
    /// Last dotted segment of `main`, the Java class file name.
    pub fn simple_main(&self) -> &str {
        self.main.rsplit('.').next().unwrap_or(&self.main)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocError {
    #[error("Missing documentation block ({} ... {} within the first {} bytes)", DOC_OPEN, DOC_CLOSE, DOC_SEARCH_LIMIT)]
    Missing,

    #[error("Invalid documentation block: {0}")]
    Invalid(String),

    #[error("Unsupported entry: {0} (only stdio-json is supported)")]
    UnsupportedEntry(String),

    #[error("Unknown language: {0}")]
    UnknownLanguage(String),
}

impl DocError {
    pub fn code(&self) -> i32 {
        match self {
            DocError::Missing => codes::MISSING_DOC,
            DocError::Invalid(_) => codes::INVALID_DOC,
            DocError::UnsupportedEntry(_) => codes::UNSUPPORTED_ENTRY,
            DocError::UnknownLanguage(_) => codes::UNKNOWN_LANGUAGE,
        }
    }
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn is_safe_relative(name: &str) -> bool {
    let path = Path::new(name);
    !name.trim().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && path.components().any(|c| matches!(c, Component::Normal(_)))
}

/// Parse a header body into a [`Doc`] and check the names it uses as paths.
pub fn parse_doc(body: &str) -> Result<Doc, DocError> {
    let doc: Doc = serde_json::from_str(body.trim()).map_err(|e| DocError::Invalid(e.to_string()))?;

    for (field, value) in [
        ("object", &doc.object),
        ("language", &doc.language),
        ("summary", &doc.summary),
        ("entry", &doc.entry),
    ] {
        if value.trim().is_empty() {
            return Err(DocError::Invalid(format!("'{}' is empty", field)));
        }
    }
    if !is_single_component(&doc.object) {
        return Err(DocError::Invalid(format!(
            "object '{}' must be a plain name",
            doc.object
        )));
    }
    for file in &doc.files {
        if !is_safe_relative(&file.name) {
            return Err(DocError::Invalid(format!(
                "file name '{}' must be a relative path without '..'",
                file.name
            )));
        }
        if file.content.is_none() && file.reference.is_none() {
            return Err(DocError::Invalid(format!(
                "file '{}' has neither content nor ref",
                file.name
            )));
        }
    }
    let venv = doc.build.venv.trim();
    if !venv.is_empty() && !is_safe_relative(venv) {
        return Err(DocError::Invalid(format!(
            "venv '{}' must be a relative path without '..'",
            venv
        )));
    }
    let java_main = format!("{}.java", doc.simple_main());
    if Language::parse(&doc.language) == Some(Language::Java) && !is_single_component(&java_main) {
        return Err(DocError::Invalid(format!("main '{}' is not a class name", doc.main)));
    }
    Ok(doc)
}

/// Everything the gate learned about an accepted source.
#[derive(Debug, Clone)]
pub struct Checked<'a> {
    pub doc: Doc,
    pub language: Language,
    pub block: DocBlock<'a>,
}

/// The documentation gate. Pure: no filesystem or process activity.
pub fn check(source: &str) -> Result<Checked<'_>, DocError> {
    let block = extract_doc_block(source).ok_or(DocError::Missing)?;
    let doc = parse_doc(block.body)?;
    if doc.entry.trim() != STDIO_JSON {
        return Err(DocError::UnsupportedEntry(doc.entry.clone()));
    }
    let language =
        Language::parse(&doc.language).ok_or_else(|| DocError::UnknownLanguage(doc.language.clone()))?;
    Ok(Checked {
        doc,
        language,
        block,
    })
}

/// Run the gate and describe the header for a human.
pub fn doc_check(source: &str) -> Result<String, DocError> {
    let checked = check(source)?;
    let pretty =
        serde_json::to_string_pretty(&checked.doc).map_err(|e| DocError::Invalid(e.to_string()))?;
    let unresolved = checked
        .doc
        .files
        .iter()
        .filter(|f| f.content.is_none())
        .count();

    let mut report = format!(
        "object:   {}\nlanguage: {}\nsummary:  {}\n",
        checked.doc.object,
        checked.language.as_str(),
        checked.doc.summary
    );
    if unresolved > 0 {
        report.push_str(&format!("warning:  {} file(s) with unresolved ref\n", unresolved));
    }
    report.push('\n');
    report.push_str(&pretty);
    Ok(report)
}

/// Replace every `ref`-only `files[]` entry of the header with literal
/// `content` produced by `resolve`.
///
/// Sources without a parseable header, or without such entries, are returned
/// unchanged; the gate reports those later.
pub fn inline_file_refs<E, F>(source: &str, mut resolve: F) -> Result<String, E>
where
    F: FnMut(&str) -> Result<String, E>,
{
    let Some(block) = extract_doc_block(source) else {
        return Ok(source.to_string());
    };
    let Ok(mut header) = serde_json::from_str::<Value>(block.body.trim()) else {
        return Ok(source.to_string());
    };
    let Some(files) = header.get_mut("files").and_then(Value::as_array_mut) else {
        return Ok(source.to_string());
    };

    let mut changed = false;
    for file in files.iter_mut() {
        let Some(entry) = file.as_object_mut() else {
            continue;
        };
        if entry.contains_key("content") {
            continue;
        }
        let Some(reference) = entry.get("ref").and_then(Value::as_str).map(str::to_string) else {
            continue;
        };
        let content = resolve(&reference)?;
        entry.remove("ref");
        entry.insert("content".to_string(), Value::String(content));
        changed = true;
    }
    if !changed {
        return Ok(source.to_string());
    }

    let body = serde_json::to_string_pretty(&header).unwrap_or_else(|_| block.body.to_string());
    Ok(format!(
        "{}{}\n{}\n{}{}",
        &source[..block.start],
        DOC_OPEN,
        body,
        DOC_CLOSE,
        &source[block.end..]
    ))
}

/// `source` with the header replaced by as many newlines as it spanned.
pub fn blank_doc_block(source: &str, block: &DocBlock<'_>) -> String {
    let newlines = source[block.start..block.end].matches('\n').count();
    format!(
        "{}{}{}",
        &source[..block.start],
        "\n".repeat(newlines),
        &source[block.end..]
    )
}
