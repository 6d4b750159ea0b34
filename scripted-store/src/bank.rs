use scripted_common::{AddressError, AddressId, BankId, CellKey, Config, RegisterId};
use std::collections::BTreeMap;

/// Address id to cell text.
pub type AddressMap = BTreeMap<AddressId, String>;

/// One bank ("context"): a title and its registers.
///
/// A register only exists while it holds at least one address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bank {
    pub title: String,
    pub registers: BTreeMap<RegisterId, AddressMap>,
}

impl Bank {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            registers: BTreeMap::new(),
        }
    }

    pub fn get(&self, register: RegisterId, address: AddressId) -> Option<&str> {
        self.registers
            .get(&register)
            .and_then(|addrs| addrs.get(&address))
            .map(String::as_str)
    }

    /// Create or overwrite a cell, returning the previous text.
    pub fn insert(
        &mut self,
        register: RegisterId,
        address: AddressId,
        value: impl Into<String>,
    ) -> Option<String> {
        self.registers
            .entry(register)
            .or_default()
            .insert(address, value.into())
    }

    /// Remove a cell. Removing the last address of a register removes the register.
    pub fn remove(&mut self, register: RegisterId, address: AddressId) -> Option<String> {
        let addrs = self.registers.get_mut(&register)?;
        let old = addrs.remove(&address);
        if addrs.is_empty() {
            self.registers.remove(&register);
        }
        old
    }

    pub fn cell_count(&self) -> usize {
        self.registers.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// All cells in register, then address order.
    pub fn cells(&self) -> impl Iterator<Item = (RegisterId, AddressId, &str)> {
        self.registers.iter().flat_map(|(&reg, addrs)| {
            addrs
                .iter()
                .map(move |(&addr, value)| (reg, addr, value.as_str()))
        })
    }

    /// Copy every cell of `other` into this bank, overwriting on collision.
    /// The title is taken over only when this bank has none.
    pub fn merge(&mut self, other: Bank) -> usize {
        if self.title.is_empty() {
            self.title = other.title;
        }
        let mut count = 0;
        for (reg, addrs) in other.registers {
            for (addr, value) in addrs {
                self.insert(reg, addr, value);
                count += 1;
            }
        }
        count
    }

    /// Rows whose encoded register, encoded address or value contains
    /// `filter`, ignoring case. An empty filter keeps everything.
    pub fn rows(&self, config: &Config, filter: &str) -> Result<Vec<Row>, AddressError> {
        let needle = filter.to_lowercase();
        let mut rows = Vec::new();
        for (reg, addr, value) in self.cells() {
            let row = Row {
                register: config.format_register(reg)?,
                address: config.format_address(addr)?,
                value: value.to_string(),
            };
            if needle.is_empty() || row.matches(&needle) {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}

/// A cell as front ends display it, ids already encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub register: String,
    pub address: String,
    pub value: String,
}

impl Row {
    fn matches(&self, needle: &str) -> bool {
        [&self.register, &self.address, &self.value]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

/// Every loaded bank, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workspace {
    banks: BTreeMap<BankId, Bank>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: BankId) -> bool {
        self.banks.contains_key(&id)
    }

    pub fn bank(&self, id: BankId) -> Option<&Bank> {
        self.banks.get(&id)
    }

    pub fn bank_mut(&mut self, id: BankId) -> Option<&mut Bank> {
        self.banks.get_mut(&id)
    }

    /// The bank with `id`, created empty if it isn't loaded yet.
    pub fn ensure_bank(&mut self, id: BankId) -> &mut Bank {
        self.banks.entry(id).or_default()
    }

    pub fn insert_bank(&mut self, id: BankId, bank: Bank) -> Option<Bank> {
        self.banks.insert(id, bank)
    }

    pub fn bank_ids(&self) -> Vec<BankId> {
        self.banks.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.banks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }

    pub fn cell(&self, key: CellKey) -> Option<&str> {
        self.bank(key.bank)?.get(key.register, key.address)
    }
}
