//! Bank text format
//!
//! ```text
//! # x00001
//! title = Greetings
//! 01.0001 = hello
//! 01.0002 = @ref(01.0001), world\n
//! ```
//!
//! One cell per line as `<register>.<address> = <value>`, ids in the
//! configured base. Values escape `\n`, `\r`, `\t` and `\\` so every cell
//! stays on one line. Blank lines and lines starting with `#` are skipped.

use crate::bank::Bank;
use scripted_common::{Config, ParseError};

const TITLE_KEY: &str = "title";

pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

/// Undo [`escape_value`]. Unknown escapes are kept as written.
pub fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
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

/// Parse bank text. `source_name` only labels errors.
pub fn parse_bank(text: &str, config: &Config, source_name: &str) -> Result<Bank, ParseError> {
    let mut bank = Bank::default();

    for (index, raw_line) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let (key, value) = trimmed.split_once('=').ok_or_else(|| {
            ParseError::new(source_name, line_no, "expected '<register>.<address> = <value>'")
        })?;
        let key = key.trim();
        // A single space after '=' belongs to the syntax, anything beyond to the value.
        let value = unescape_value(value.strip_prefix(' ').unwrap_or(value));

        if key == TITLE_KEY {
            bank.title = value;
            continue;
        }

        let (reg, addr) = key.split_once('.').ok_or_else(|| {
            ParseError::new(source_name, line_no, format!("key '{}' has no '.'", key))
        })?;
        let register = config
            .parse_id(reg.trim())
            .map_err(|e| ParseError::new(source_name, line_no, format!("register: {}", e)))?;
        let address = config
            .parse_id(addr.trim())
            .map_err(|e| ParseError::new(source_name, line_no, format!("address: {}", e)))?;

        if bank.insert(register, address, value).is_some() {
            log::warn!(
                "{}:{}: duplicate cell {}, last one wins",
                source_name,
                line_no,
                key
            );
        }
    }

    Ok(bank)
}

/// Render a bank with each value passed through `value_of`.
///
/// Used both for plain persistence and for the resolved view of a bank.
pub fn render_bank_with<E, F>(
    bank: &Bank,
    config: &Config,
    header: &str,
    mut value_of: F,
) -> Result<String, E>
where
    F: FnMut(u64, u64, &str) -> Result<String, E>,
    E: From<scripted_common::AddressError>,
{
    let mut out = String::new();
    out.push_str("# ");
    out.push_str(header);
    out.push('\n');
    if !bank.title.is_empty() {
        out.push_str(&format!("{} = {}\n", TITLE_KEY, escape_value(&bank.title)));
    }
    for (reg, addr, raw) in bank.cells() {
        let value = value_of(reg, addr, raw)?;
        out.push_str(&format!(
            "{}.{} = {}\n",
            config.format_register(reg)?,
            config.format_address(addr)?,
            escape_value(&value)
        ));
    }
    Ok(out)
}

pub fn render_bank(
    bank: &Bank,
    config: &Config,
    header: &str,
) -> Result<String, scripted_common::AddressError> {
    render_bank_with(bank, config, header, |_, _, raw| Ok(raw.to_string()))
}
