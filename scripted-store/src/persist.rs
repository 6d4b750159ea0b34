//! Loading and saving banks.
//!
//! Banks already present in the workspace are never overwritten from disk;
//! unsaved in-memory edits always win.

use crate::bank::{Bank, Workspace};
use crate::error::StoreError;
use crate::format::{parse_bank, render_bank};
use crate::paths::Paths;
use scripted_common::{BankId, Config};
use std::fs;
use std::path::{Path, PathBuf};

fn read_bank_file(path: &Path, config: &Config) -> Result<Bank, StoreError> {
    let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(parse_bank(&text, config, &name)?)
}

/// Make bank `id` available in the workspace.
///
/// Loads `<root>/<ctx>.txt` if it exists, otherwise creates an empty bank.
/// Returns true when the bank was read from disk.
pub fn open_context(
    ws: &mut Workspace,
    config: &Config,
    paths: &Paths,
    id: BankId,
) -> Result<bool, StoreError> {
    if ws.contains(id) {
        return Ok(false);
    }

    let file = paths.context_file(config, id)?;
    if file.exists() {
        let bank = read_bank_file(&file, config)?;
        log::debug!("Loaded {} ({} cells)", file.display(), bank.cell_count());
        ws.insert_bank(id, bank);
        Ok(true)
    } else {
        log::debug!("No file for bank {}, starting empty", id);
        ws.insert_bank(id, Bank::default());
        Ok(false)
    }
}

/// Load every bank file in the root that isn't loaded yet.
///
/// Files whose name doesn't decode as a context name are skipped. Returns the
/// ids that were loaded.
pub fn preload_all(
    ws: &mut Workspace,
    config: &Config,
    paths: &Paths,
) -> Result<Vec<BankId>, StoreError> {
    let pattern = paths.context_glob();
    let entries = glob::glob(&pattern).map_err(|e| StoreError::Pattern(e.to_string()))?;

    let mut loaded = Vec::new();
    for entry in entries.flatten() {
        let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let id = match config.parse_context_name(name) {
            Ok(id) => id,
            Err(e) => {
                log::debug!("Skipping {}: {}", name, e);
                continue;
            }
        };
        if ws.contains(id) {
            continue;
        }
        let bank = read_bank_file(&entry, config)?;
        ws.insert_bank(id, bank);
        loaded.push(id);
    }

    loaded.sort_unstable();
    log::info!("Preloaded {} bank(s) from {}", loaded.len(), paths.root.display());
    Ok(loaded)
}

/// Write bank `id` to its context file, returning the path written.
pub fn save_context(
    ws: &Workspace,
    config: &Config,
    paths: &Paths,
    id: BankId,
) -> Result<PathBuf, StoreError> {
    let bank = ws.bank(id).ok_or(StoreError::UnknownBank(id))?;
    let file = paths.context_file(config, id)?;
    let text = render_bank(bank, config, &config.context_name(id)?)?;

    fs::create_dir_all(&paths.root).map_err(|e| StoreError::io(&paths.root, e))?;
    fs::write(&file, text).map_err(|e| StoreError::io(&file, e))?;
    log::info!("Saved {} ({} cells)", file.display(), bank.cell_count());
    Ok(file)
}

/// Merge the cells of a bank text file into bank `id`, creating it if needed.
/// Returns the number of cells merged.
pub fn merge_file(
    ws: &mut Workspace,
    config: &Config,
    id: BankId,
    file: &Path,
) -> Result<usize, StoreError> {
    let incoming = read_bank_file(file, config)?;
    let count = ws.ensure_bank(id).merge(incoming);
    log::info!("Merged {} cell(s) from {} into bank {}", count, file.display(), id);
    Ok(count)
}
