//! Scripted register banks - bank store
//!
//! Owns the in-memory [`Workspace`] of banks and their on-disk text form.
//! Nothing in here interprets cell contents; references and source code are
//! plain strings at this layer.

pub mod bank;
pub mod error;
pub mod format;
pub mod paths;
pub mod persist;

pub use bank::{AddressMap, Bank, Row, Workspace};
pub use error::StoreError;
pub use paths::Paths;
pub use persist::{merge_file, open_context, preload_all, save_context};
