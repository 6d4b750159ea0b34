use scripted_common::BankId;
use scripted_presenter::{BankSummary, ExecReport, Row, View};

/// Terminal front end. Statuses and exec reports are printed as they come;
/// rows and the bank list are kept for the command to print.
#[derive(Default)]
pub struct ConsoleView {
    pub rows: Vec<Row>,
    pub banks: Vec<BankSummary>,
    pub current: Option<BankId>,
    pub last_status: String,
    pub last_report: Option<ExecReport>,
    quiet: bool,
}

impl ConsoleView {
    /// Statuses are logged instead of printed.
    pub fn quiet() -> Self {
        Self {
            quiet: true,
            ..Self::default()
        }
    }
}

impl View for ConsoleView {
    fn show_status(&mut self, status: &str) {
        if self.quiet {
            log::info!("{}", status);
        } else {
            eprintln!("{}", status);
        }
        self.last_status = status.to_string();
    }

    fn show_rows(&mut self, rows: &[Row]) {
        self.rows = rows.to_vec();
    }

    fn show_current(&mut self, current: Option<BankId>) {
        self.current = current;
    }

    fn show_bank_list(&mut self, banks: &[BankSummary]) {
        self.banks = banks.to_vec();
    }

    fn set_busy(&mut self, busy: bool) {
        log::debug!("busy = {}", busy);
    }

    fn show_exec_result(&mut self, report: &ExecReport) {
        eprintln!("== {} (exit {})", report.title, report.exit_code);
        if let Some(workdir) = &report.workdir {
            eprintln!("workdir: {}", workdir.display());
        }
        if !report.stdout.is_empty() {
            println!("{}", report.stdout.trim_end());
        }
        if !report.stderr.is_empty() {
            eprintln!("{}", report.stderr.trim_end());
        }
        self.last_report = Some(report.clone());
    }
}
