use scripted_common::BankId;
use std::path::PathBuf;

pub use scripted_store::Row;

/// One entry of the bank list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankSummary {
    pub id: BankId,
    pub context: String,
    pub title: String,
}

/// Full diagnostic of a run or doc-check, shown apart from the status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecReport {
    pub title: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub workdir: Option<PathBuf>,
}

/// What every front end implements. Called only from the delivery context.
pub trait View {
    fn show_status(&mut self, status: &str);
    /// Rows of the current bank, already filtered.
    fn show_rows(&mut self, rows: &[Row]);
    fn show_current(&mut self, current: Option<BankId>);
    fn show_bank_list(&mut self, banks: &[BankSummary]);
    fn set_busy(&mut self, busy: bool);
    fn show_exec_result(&mut self, report: &ExecReport);
}
