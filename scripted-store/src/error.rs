use scripted_common::{AddressError, BankId, ConfigError, ParseError, ScriptedError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("bank {0} is not loaded")]
    UnknownBank(BankId),

    #[error("bad file pattern: {0}")]
    Pattern(String),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<StoreError> for ScriptedError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io { path, source } => ScriptedError::Io { path, source },
            StoreError::Parse(e) => ScriptedError::Parse(e),
            StoreError::Config(e) => ScriptedError::Config(e),
            StoreError::Address(e) => ScriptedError::Address(e),
            other => ScriptedError::Other(other.to_string()),
        }
    }
}
