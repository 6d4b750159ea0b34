use crate::{Resolver, Visited};
use scripted_common::{BankId, CellKey, Config, ReferenceError, ScriptedError};
use scripted_store::format::render_bank_with;
use scripted_store::{Bank, Workspace};
use serde_json::{json, Map, Value};
use std::path::Path;

fn bank_or_missing<'w>(
    config: &Config,
    workspace: &'w Workspace,
    id: BankId,
) -> Result<&'w Bank, ScriptedError> {
    workspace.bank(id).ok_or_else(|| {
        let token = config.context_name(id).unwrap_or_else(|_| id.to_string());
        ScriptedError::Reference(ReferenceError::MissingBank {
            token,
            offset: 0,
            bank: id,
        })
    })
}

/// Bank `id` in its text form with every value fully resolved.
pub fn resolve_bank_to_text(
    config: &Config,
    workspace: &Workspace,
    root: &Path,
    id: BankId,
) -> Result<String, ScriptedError> {
    let bank = bank_or_missing(config, workspace, id)?;
    let resolver = Resolver::new(config, workspace, root);
    let header = format!("{} (resolved)", config.context_name(id)?);

    render_bank_with(bank, config, &header, |reg, addr, _| {
        let mut visited = Visited::new();
        resolver
            .resolve_cell(CellKey::new(id, reg, addr), &mut visited)
            .map_err(ScriptedError::from)
    })
}

/// Bank `id` as pretty JSON, raw and resolved text side by side:
///
/// ```json
/// { "context": "x00001", "id": 1, "title": "...",
///   "registers": { "01": { "0001": { "raw": "...", "resolved": "..." } } } }
/// ```
pub fn export_bank_to_json(
    config: &Config,
    workspace: &Workspace,
    root: &Path,
    id: BankId,
) -> Result<String, ScriptedError> {
    let bank = bank_or_missing(config, workspace, id)?;
    let resolver = Resolver::new(config, workspace, root);

    let mut registers = Map::new();
    for (reg, addrs) in &bank.registers {
        let mut cells = Map::new();
        for (&addr, raw) in addrs {
            let mut visited = Visited::new();
            let resolved = resolver.resolve_cell(CellKey::new(id, *reg, addr), &mut visited)?;
            cells.insert(
                config.format_address(addr)?,
                json!({ "raw": raw, "resolved": resolved }),
            );
        }
        registers.insert(config.format_register(*reg)?, Value::Object(cells));
    }

    let doc = json!({
        "context": config.context_name(id)?,
        "id": id,
        "title": bank.title,
        "registers": registers,
    });
    serde_json::to_string_pretty(&doc).map_err(|e| ScriptedError::Other(e.to_string()))
}
