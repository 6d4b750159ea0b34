//! Scripted register banks - reference resolver
//!
//! Cells may contain two kinds of reference tokens:
//!
//! - `@file(path)` is replaced by the contents of `path`, relative to the
//!   workspace root. Included text is inserted verbatim and not scanned again.
//! - `@ref(reg.addr)` or `@ref(bank.reg.addr)` is replaced by the fully
//!   resolved text of that cell. Ids are written in the configured base and the
//!   bank may carry the configured prefix.
//!
//! Cycles are broken by leaving the offending token as written. The visited
//! set only holds the cells currently being expanded, so a cell reached twice
//! through different paths (a diamond) is expanded both times. One top-level
//! call may perform at most [`MAX_EXPANSIONS`] cell expansions and produce at
//! most [`MAX_RESOLVED_LEN`] bytes; past either the call fails with
//! [`ReferenceError::TooLarge`].

mod render;


pub use render::{export_bank_to_json, resolve_bank_to_text};

use once_cell::sync::Lazy;
use regex::Regex;
use scripted_common::{BankId, CellKey, Config, ReferenceError};
use scripted_store::Workspace;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// `@file(...)` or `@ref(...)`; the closing paren is optional so an
/// unterminated token can be reported instead of silently kept.
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@(file|ref)\(([^)\n]*)(\))?").expect("token pattern is valid")
});

/// Cell expansions allowed in one top-level call.
pub const MAX_EXPANSIONS: usize = 100_000;

/// Longest text one top-level call may produce, at any nesting level.
pub const MAX_RESOLVED_LEN: usize = 1 << 20;

/// Expansion state shared by every level of one top-level call: the cells
/// currently being expanded and how many expansions have happened so far.
#[derive(Debug, Clone, Default)]
pub struct Visited {
    expanding: HashSet<CellKey>,
    expansions: usize,
}

impl Visited {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &CellKey) -> bool {
        self.expanding.contains(key)
    }

    pub fn insert(&mut self, key: CellKey) -> bool {
        self.expanding.insert(key)
    }

    pub fn remove(&mut self, key: &CellKey) -> bool {
        self.expanding.remove(key)
    }

    pub fn len(&self) -> usize {
        self.expanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expanding.is_empty()
    }

    /// Cell expansions performed so far.
    pub fn expansions(&self) -> usize {
        self.expansions
    }
}

pub struct Resolver<'a> {
    config: &'a Config,
    workspace: &'a Workspace,
    root: &'a Path,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a Config, workspace: &'a Workspace, root: &'a Path) -> Self {
        Self {
            config,
            workspace,
            root,
        }
    }

    /// Expand every reference token in `raw`.
    ///
    /// `current_bank` is the bank used by two-component `@ref` tokens.
    /// The set of expanding cells in `visited` is left as it was given once this
    /// returns successfully; its expansion count keeps growing.
    pub fn resolve(
        &self,
        raw: &str,
        current_bank: BankId,
        visited: &mut Visited,
    ) -> Result<String, ReferenceError> {
        let mut out = String::with_capacity(raw.len());
        let mut last = 0;

        for caps in TOKEN_RE.captures_iter(raw) {
            let Some(whole) = caps.get(0) else { continue };
            let token = whole.as_str();
            let offset = whole.start();
            let kind = caps.get(1).map_or("", |m| m.as_str());
            let arg = caps.get(2).map_or("", |m| m.as_str()).trim();

            out.push_str(&raw[last..offset]);
            last = whole.end();

            if caps.get(3).is_none() {
                return Err(ReferenceError::Malformed {
                    token: token.to_string(),
                    offset,
                    message: "missing ')'".to_string(),
                });
            }

            match kind {
                "file" => out.push_str(&self.include_file(token, offset, arg)?),
                _ => {
                    let key = self.parse_key(arg, current_bank, token, offset)?;
                    if visited.contains(&key) {
                        log::warn!("Cyclic reference {} to {} left unexpanded", token, key);
                        out.push_str(token);
                    } else {
                        out.push_str(&self.expand_key(key, token, offset, visited)?);
                    }
                }
            }
            check_len(&out, token, offset)?;
        }

        out.push_str(&raw[last..]);
        Ok(out)
    }

    /// Fully resolve one cell, with the cell itself marked as visited.
    pub fn resolve_cell(&self, key: CellKey, visited: &mut Visited) -> Result<String, ReferenceError> {
        if visited.contains(&key) {
            return Ok(self.workspace.cell(key).unwrap_or_default().to_string());
        }
        self.expand_key(key, &key.to_string(), 0, visited)
    }

    /// Resolve a bare reference such as `01.0002` or `x00001.01.0002`.
    pub fn resolve_reference(
        &self,
        spec: &str,
        current_bank: BankId,
        visited: &mut Visited,
    ) -> Result<String, ReferenceError> {
        let spec = spec.trim();
        let key = self.parse_key(spec, current_bank, spec, 0)?;
        if visited.contains(&key) {
            return Ok(format!("@ref({})", spec));
        }
        self.expand_key(key, spec, 0, visited)
    }

    fn expand_key(
        &self,
        key: CellKey,
        token: &str,
        offset: usize,
        visited: &mut Visited,
    ) -> Result<String, ReferenceError> {
        let text = self.lookup(key, token, offset)?;
        visited.expansions += 1;
        if visited.expansions > MAX_EXPANSIONS {
            return Err(ReferenceError::TooLarge {
                token: token.to_string(),
                offset,
                message: format!("more than {} cell expansions", MAX_EXPANSIONS),
            });
        }
        visited.insert(key);
        let result = self.resolve(text, key.bank, visited);
        visited.remove(&key);
        result
    }

    fn lookup(&self, key: CellKey, token: &str, offset: usize) -> Result<&'a str, ReferenceError> {
        let bank = self
            .workspace
            .bank(key.bank)
            .ok_or_else(|| ReferenceError::MissingBank {
                token: token.to_string(),
                offset,
                bank: key.bank,
            })?;
        bank.get(key.register, key.address)
            .ok_or_else(|| ReferenceError::MissingCell {
                token: token.to_string(),
                offset,
                bank: key.bank,
                register: key.register,
                address: key.address,
            })
    }

    fn include_file(&self, token: &str, offset: usize, arg: &str) -> Result<String, ReferenceError> {
        if arg.is_empty() {
            return Err(ReferenceError::Malformed {
                token: token.to_string(),
                offset,
                message: "empty path".to_string(),
            });
        }
        let path = self.root.join(arg);
        fs::read_to_string(&path).map_err(|e| ReferenceError::MissingFile {
            token: token.to_string(),
            offset,
            path,
            message: e.to_string(),
        })
    }

    fn parse_key(
        &self,
        spec: &str,
        current_bank: BankId,
        token: &str,
        offset: usize,
    ) -> Result<CellKey, ReferenceError> {
        let malformed = |message: String| ReferenceError::Malformed {
            token: token.to_string(),
            offset,
            message,
        };

        let parts: Vec<&str> = spec.split('.').map(str::trim).collect();
        let (bank, reg, addr) = match parts.as_slice() {
            [reg, addr] => (current_bank, *reg, *addr),
            [bank, reg, addr] => {
                let bank = self
                    .config
                    .parse_context_name(bank)
                    .map_err(|e| malformed(format!("bank: {}", e)))?;
                (bank, *reg, *addr)
            }
            _ => {
                return Err(malformed(
                    "expected <register>.<address> or <bank>.<register>.<address>".to_string(),
                ))
            }
        };

        let register = self
            .config
            .parse_id(reg)
            .map_err(|e| malformed(format!("register: {}", e)))?;
        let address = self
            .config
            .parse_id(addr)
            .map_err(|e| malformed(format!("address: {}", e)))?;
        Ok(CellKey::new(bank, register, address))
    }
}

fn check_len(out: &str, token: &str, offset: usize) -> Result<(), ReferenceError> {
    if out.len() > MAX_RESOLVED_LEN {
        return Err(ReferenceError::TooLarge {
            token: token.to_string(),
            offset,
            message: format!("more than {} bytes", MAX_RESOLVED_LEN),
        });
    }
    Ok(())
}
