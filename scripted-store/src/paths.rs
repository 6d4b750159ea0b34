use crate::error::StoreError;
use scripted_common::{AddressError, BankId, Config};
use std::fs;
use std::path::{Path, PathBuf};

/// File locations under a workspace root.
///
/// ```text
/// <root>/scripted.json              display config
/// <root>/<ctx>.txt                  bank files
/// <root>/out/<ctx>.resolved.txt     resolve output
/// <root>/out/<ctx>.json             export output
/// <root>/out/exec/                  execution work dirs + manifest.tsv
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub root: PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("scripted.json")
    }

    pub fn out_dir(&self) -> PathBuf {
        self.root.join("out")
    }

    pub fn exec_dir(&self) -> PathBuf {
        self.out_dir().join("exec")
    }

    pub fn context_file(&self, config: &Config, id: BankId) -> Result<PathBuf, AddressError> {
        Ok(self.root.join(format!("{}.txt", config.context_name(id)?)))
    }

    pub fn resolved_file(&self, config: &Config, id: BankId) -> Result<PathBuf, AddressError> {
        Ok(self
            .out_dir()
            .join(format!("{}.resolved.txt", config.context_name(id)?)))
    }

    pub fn json_file(&self, config: &Config, id: BankId) -> Result<PathBuf, AddressError> {
        Ok(self.out_dir().join(format!("{}.json", config.context_name(id)?)))
    }

    /// Create the root and output directories.
    pub fn ensure(&self) -> Result<(), StoreError> {
        for dir in [self.root.clone(), self.out_dir(), self.exec_dir()] {
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Glob pattern matching every bank file in the root.
    pub fn context_glob(&self) -> String {
        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        Path::new(&root).join("*.txt").to_string_lossy().into_owned()
    }
}
