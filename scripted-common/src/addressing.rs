//! Base-N encoding of bank, register and address identifiers.

use crate::error::AddressError;

pub const MIN_BASE: u32 = 2;
pub const MAX_BASE: u32 = 36;

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn check_base(base: u32) -> Result<(), AddressError> {
    if (MIN_BASE..=MAX_BASE).contains(&base) {
        Ok(())
    } else {
        Err(AddressError::InvalidBase(base))
    }
}

/// Render `value` in `base`, left-padded with `0` to at least `width` characters.
///
/// The natural representation is never truncated when it is wider than `width`.
pub fn encode(value: u64, base: u32, width: usize) -> Result<String, AddressError> {
    check_base(base)?;

    let base = u64::from(base);
    let mut digits = Vec::new();
    let mut rest = value;
    loop {
        digits.push(DIGITS[(rest % base) as usize]);
        rest /= base;
        if rest == 0 {
            break;
        }
    }
    while digits.len() < width {
        digits.push(b'0');
    }
    digits.reverse();

    // Only ASCII digits were pushed.
    Ok(digits.into_iter().map(char::from).collect())
}

/// Parse `token` as a number written in `base`.
///
/// Letters are accepted in either case.
pub fn decode(token: &str, base: u32) -> Result<u64, AddressError> {
    check_base(base)?;
    if token.is_empty() {
        return Err(AddressError::Empty);
    }

    let mut value: u64 = 0;
    for (position, ch) in token.chars().enumerate() {
        let digit = ch
            .to_digit(base)
            .ok_or(AddressError::InvalidDigit { ch, position, base })?;
        value = value
            .checked_mul(u64::from(base))
            .and_then(|v| v.checked_add(u64::from(digit)))
            .ok_or_else(|| AddressError::Overflow(token.to_string()))?;
    }
    Ok(value)
}
