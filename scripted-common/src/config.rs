use crate::addressing::{decode, encode, MAX_BASE, MIN_BASE};
use crate::error::{AddressError, ConfigError};
use crate::{AddressId, BankId, RegisterId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Widths beyond this are almost certainly a typo.
const MAX_WIDTH: usize = 32;

/// Display configuration for identifiers
///
/// Only the textual form of ids depends on it; ids are plain integers
/// everywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub prefix: char,
    pub base: u32,
    pub width_bank: usize,
    pub width_reg: usize,
    pub width_addr: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: 'x',
            base: 10,
            width_bank: 5,
            width_reg: 2,
            width_addr: 4,
        }
    }
}

impl Config {
    /// Check base, prefix and widths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_BASE..=MAX_BASE).contains(&self.base) {
            return Err(ConfigError::InvalidBase(self.base));
        }
        if self.prefix.is_whitespace() || self.prefix.to_digit(self.base).is_some() {
            return Err(ConfigError::InvalidPrefix {
                prefix: self.prefix,
                base: self.base,
            });
        }
        for width in [self.width_bank, self.width_reg, self.width_addr] {
            if width > MAX_WIDTH {
                return Err(ConfigError::InvalidWidth(width));
            }
        }
        Ok(())
    }

    /// Load configuration from a JSON file, or return defaults if it doesn't exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let unreadable = |message: String| ConfigError::Unreadable {
            path: path.to_path_buf(),
            message,
        };
        let contents = fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
        let config: Config = serde_json::from_str(&contents).map_err(|e| unreadable(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let unwritable = |message: String| ConfigError::Unreadable {
            path: path.to_path_buf(),
            message,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| unwritable(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| unwritable(e.to_string()))?;
        fs::write(path, json).map_err(|e| unwritable(e.to_string()))
    }

    pub fn format_bank(&self, id: BankId) -> Result<String, AddressError> {
        encode(id, self.base, self.width_bank)
    }

    pub fn format_register(&self, id: RegisterId) -> Result<String, AddressError> {
        encode(id, self.base, self.width_reg)
    }

    pub fn format_address(&self, id: AddressId) -> Result<String, AddressError> {
        encode(id, self.base, self.width_addr)
    }

    /// External name of a bank, e.g. `x00001`.
    pub fn context_name(&self, id: BankId) -> Result<String, AddressError> {
        Ok(format!("{}{}", self.prefix, self.format_bank(id)?))
    }

    /// Parse `x00001`, `00001` or `x00001.txt` back to a bank id.
    pub fn parse_context_name(&self, name: &str) -> Result<BankId, AddressError> {
        let stem = name.strip_suffix(".txt").unwrap_or(name);
        let token = stem.strip_prefix(self.prefix).unwrap_or(stem);
        decode(token, self.base)
    }

    /// Parse a register or address token in the configured base.
    pub fn parse_id(&self, token: &str) -> Result<u64, AddressError> {
        decode(token, self.base)
    }
}
