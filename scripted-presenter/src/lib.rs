//! Scripted register banks - presentation boundary
//!
//! Front ends implement [`View`] and drive a [`Presenter`]. Long-running
//! operations (resolve, export, run-code, doc-check) go through the
//! single-flight [`Orchestrator`].

pub mod gate;
pub mod presenter;
pub mod view;

pub use gate::{JobResult, OperationKind, Orchestrator, StartError};
pub use presenter::{Outcome, Presenter};
pub use view::{BankSummary, ExecReport, Row, View};
