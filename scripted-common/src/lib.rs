//! Scripted register banks - common types and utilities
//!
//! This crate contains the identifier encoding, the display configuration
//! and the error taxonomy shared by every other crate of the workspace.

pub mod addressing;
pub mod config;
pub mod error;

pub use addressing::{decode, encode, MAX_BASE, MIN_BASE};
pub use config::Config;
pub use error::{AddressError, ConfigError, ParseError, ReferenceError, ScriptedError};

/// Identifier of a bank (a "context").
pub type BankId = u64;
/// Identifier of a register inside a bank.
pub type RegisterId = u64;
/// Identifier of an address inside a register.
pub type AddressId = u64;

/// Fully qualified location of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub bank: BankId,
    pub register: RegisterId,
    pub address: AddressId,
}

impl CellKey {
    pub fn new(bank: BankId, register: RegisterId, address: AddressId) -> Self {
        Self {
            bank,
            register,
            address,
        }
    }
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.bank, self.register, self.address)
    }
}
