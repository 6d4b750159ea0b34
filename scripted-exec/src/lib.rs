//! Scripted register banks - execution manager
//!
//! Turns a self-describing source text into a process run:
//!
//! 1. the documentation gate parses the `/*---DOC--- ... ---END---*/` header
//!    and refuses anything it can't use, before touching the filesystem;
//! 2. a content-addressed work directory is (re)written;
//! 3. the language's toolchain builds and runs the program with the
//!    `stdio-json` contract (JSON in on stdin, JSON out on stdout);
//! 4. one line per dispatched attempt is appended to `manifest.tsv`.
//!
//! Failures never escape as `Err`; they are folded into the exit code of
//! [`ExecResult`], see [`codes`].

pub mod codes;
pub mod command;
pub mod doc;
pub mod hash;
pub mod manager;
pub mod manifest;
pub mod toolchain;

pub use doc::{doc_check, inline_file_refs, Doc, DocError, Language};
pub use manager::{ExecManager, ExecOutcome, ExecResult, Stage};
pub use manifest::{Manifest, ManifestEntry};
pub use toolchain::Toolchain;
