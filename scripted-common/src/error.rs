//! Error handling for the scripted workspace
//!
//! Every failure category that can cross a crate boundary lives here so the
//! store, the resolver and the presenter agree on one taxonomy. Execution
//! failures are not errors: the execution manager encodes them into its
//! result's exit code instead.

use std::path::PathBuf;
use thiserror::Error;

/// Identifier encoding failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("base {0} is outside 2..=36")]
    InvalidBase(u32),

    #[error("'{ch}' at position {position} is not a base-{base} digit")]
    InvalidDigit { ch: char, position: usize, base: u32 },

    #[error("empty identifier")]
    Empty,

    #[error("identifier '{0}' does not fit in 64 bits")]
    Overflow(String),
}

/// Invalid display configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("base {0} is outside 2..=36")]
    InvalidBase(u32),

    #[error("prefix '{prefix}' is ambiguous in base {base}")]
    InvalidPrefix { prefix: char, base: u32 },

    #[error("width {0} is too large")]
    InvalidWidth(usize),

    #[error("cannot read config {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
}

/// Malformed persisted bank text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{source_name}:{line}: {message}")]
pub struct ParseError {
    pub source_name: String,
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(source_name: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            line,
            message: message.into(),
        }
    }
}

/// A reference occurrence that could not be expanded.
///
/// Every variant names the token as written and its byte offset in the text
/// that was being scanned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("{token} at offset {offset}: cannot read {path}: {message}")]
    MissingFile {
        token: String,
        offset: usize,
        path: PathBuf,
        message: String,
    },

    #[error("{token} at offset {offset}: bank {bank} is not loaded")]
    MissingBank {
        token: String,
        offset: usize,
        bank: u64,
    },

    #[error("{token} at offset {offset}: no cell at register {register}, address {address} of bank {bank}")]
    MissingCell {
        token: String,
        offset: usize,
        bank: u64,
        register: u64,
        address: u64,
    },

    #[error("{token} at offset {offset}: {message}")]
    Malformed {
        token: String,
        offset: usize,
        message: String,
    },

    /// Expansion outgrew the per-call budget.
    #[error("{token} at offset {offset}: expansion too large: {message}")]
    TooLarge {
        token: String,
        offset: usize,
        message: String,
    },
}

impl ReferenceError {
    /// The reference token as it appeared in the source text.
    pub fn token(&self) -> &str {
        match self {
            ReferenceError::MissingFile { token, .. }
            | ReferenceError::MissingBank { token, .. }
            | ReferenceError::MissingCell { token, .. }
            | ReferenceError::Malformed { token, .. }
            | ReferenceError::TooLarge { token, .. } => token,
        }
    }

    pub fn offset(&self) -> usize {
        match self {
            ReferenceError::MissingFile { offset, .. }
            | ReferenceError::MissingBank { offset, .. }
            | ReferenceError::MissingCell { offset, .. }
            | ReferenceError::Malformed { offset, .. }
            | ReferenceError::TooLarge { offset, .. } => *offset,
        }
    }
}

/// Umbrella error used at the presentation boundary.
#[derive(Error, Debug)]
pub enum ScriptedError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Reference error: {0}")]
    Reference(#[from] ReferenceError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl ScriptedError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScriptedError::Io {
            path: path.into(),
            source,
        }
    }
}
