use indoc::indoc;
use pretty_assertions::assert_eq;
use scripted_common::BankId;
use scripted_exec::Toolchain;
use scripted_presenter::{BankSummary, ExecReport, Presenter, Row, View};
use scripted_store::Paths;
use std::fs;
use std::path::Path;
use std::time::Duration;

const LONG: Duration = Duration::from_secs(60);

#[derive(Default)]
struct RecordingView {
    statuses: Vec<String>,
    rows: Vec<Row>,
    current: Option<BankId>,
    banks: Vec<BankSummary>,
    busy: Vec<bool>,
    exec: Vec<ExecReport>,
}

impl RecordingView {
    fn last_status(&self) -> &str {
        self.statuses.last().map(String::as_str).unwrap_or("")
    }
}

impl View for RecordingView {
    fn show_status(&mut self, status: &str) {
        self.statuses.push(status.to_string());
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
        self.busy.push(busy);
    }

    fn show_exec_result(&mut self, report: &ExecReport) {
        self.exec.push(report.clone());
    }
}

fn presenter(root: &Path) -> Presenter<RecordingView> {
    Presenter::new(RecordingView::default(), Paths::new(root), Toolchain::default()).unwrap()
}

#[test]
fn test_startup_preloads_banks() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("x00002.txt"), "title = second\n01.0001 = two\n").unwrap();

    let p = presenter(dir.path());
    assert_eq!(p.view().last_status(), "Ready. Loaded 1 banks.");
    assert_eq!(
        p.view().banks,
        vec![BankSummary {
            id: 2,
            context: "x00002".to_string(),
            title: "second".to_string(),
        }]
    );
    assert_eq!(p.current(), None);
}

#[test]
fn test_edit_and_save() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = presenter(dir.path());

    p.insert(1, 1, "orphan");
    assert_eq!(p.view().last_status(), "No current context");

    p.open_or_switch("x00001");
    assert_eq!(p.view().last_status(), "Created x00001");
    assert_eq!(p.view().current, Some(1));

    p.insert(1, 1, "hello");
    p.insert(1, 2, "@ref(01.0001), world");
    assert_eq!(p.view().last_status(), "Updated 01.0002");
    assert_eq!(p.view().rows.len(), 2);
    assert!(p.is_dirty());

    p.save();
    assert!(!p.is_dirty());
    let saved = fs::read_to_string(dir.path().join("x00001.txt")).unwrap();
    assert!(saved.contains("01.0001 = hello"));

    // A fresh session reads it back.
    let mut again = presenter(dir.path());
    again.open_or_switch("x00001.txt");
    assert_eq!(again.view().last_status(), "Switched to x00001");
    assert_eq!(again.workspace().bank(1).unwrap().get(1, 2), Some("@ref(01.0001), world"));
}

#[test]
fn test_open_from_disk_and_bad_name() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = presenter(dir.path());
    fs::write(dir.path().join("x00003.txt"), "01.0001 = late\n").unwrap();

    p.open_or_switch("x00003");
    assert_eq!(p.view().last_status(), "Opened x00003");

    p.open_or_switch("x0000z");
    assert!(p.view().last_status().starts_with("Bad context name"));
    assert_eq!(p.current(), Some(3));
}

#[test]
fn test_filter_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = presenter(dir.path());
    p.open_or_switch("1");
    p.insert(1, 1, "Apple");
    p.insert(1, 2, "banana");
    p.insert(2, 7, "cherry");

    p.set_filter("APPLE");
    assert_eq!(p.view().rows.len(), 1);
    assert_eq!(p.view().rows[0].value, "Apple");

    p.set_filter("0007");
    assert_eq!(p.view().rows.len(), 1);
    assert_eq!(p.view().rows[0].register, "02");

    p.set_filter("");
    p.delete(2, 7);
    assert_eq!(p.view().last_status(), "Deleted 02.0007");
    assert!(!p.workspace().bank(1).unwrap().registers.contains_key(&2));
    assert_eq!(p.view().rows.len(), 2);

    p.delete(2, 7);
    assert_eq!(p.view().last_status(), "No cell 02.0007");
}

#[test]
fn test_busy_gate_rejects_then_accepts() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = presenter(dir.path());
    p.open_or_switch("x00001");
    p.insert(1, 1, "hello");
    p.insert(1, 2, "@ref(01.0001), world");

    p.resolve_async();
    assert!(p.is_busy());
    assert_eq!(p.view().busy, vec![true]);

    p.export_async();
    assert_eq!(p.view().last_status(), "Busy...");
    assert_eq!(p.view().busy, vec![true]);

    // Edits after the start don't reach the running job.
    p.insert(1, 1, "changed");

    assert!(p.wait_idle(LONG));
    assert!(!p.is_busy());
    assert_eq!(p.view().busy, vec![true, false]);
    assert!(p.view().last_status().starts_with("Resolved -> "));

    let resolved = fs::read_to_string(dir.path().join("out").join("x00001.resolved.txt")).unwrap();
    assert!(resolved.contains("01.0002 = hello, world"));

    p.export_async();
    assert!(p.wait_idle(LONG));
    assert!(p.view().last_status().starts_with("Exported JSON -> "));
    let json = fs::read_to_string(dir.path().join("out").join("x00001.json")).unwrap();
    assert!(json.contains("\"resolved\": \"changed, world\""));

    assert!(!p.pump());
}

#[test]
fn test_resolve_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = presenter(dir.path());
    p.open_or_switch("x00001");
    p.insert(1, 1, "@ref(09.0009)");

    p.resolve_async();
    assert!(p.wait_idle(LONG));
    assert!(p.view().last_status().starts_with("Resolve failed: "));
    assert!(!p.is_busy());
}

#[test]
fn test_doc_check() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = presenter(dir.path());
    p.open_or_switch("x00001");
    p.insert(1, 1, "\"Echoes its input.\"");
    p.insert(
        1,
        2,
        indoc! {r#"
            /*---DOC---
            {"object": "demo", "language": "python", "summary": @ref(01.0001), "entry": "stdio-json"}
            ---END---*/
            print("{}")
        "#},
    );
    p.insert(1, 3, "no header here");

    p.doc_check_async(1, 2);
    assert!(p.wait_idle(LONG));
    assert_eq!(p.view().last_status(), "Doc OK");
    let report = p.view().exec.last().unwrap();
    assert_eq!(report.exit_code, 0);
    assert!(report.stdout.contains("summary:  Echoes its input."));

    p.doc_check_async(1, 3);
    assert!(p.wait_idle(LONG));
    let report = p.view().exec.last().unwrap();
    assert_eq!(report.exit_code, 9001);
    assert!(report.stderr.starts_with("ERROR: "));
}

#[test]
fn test_run_missing_cell() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = presenter(dir.path());
    p.open_or_switch("x00001");

    p.run_code_async(4, 4, "{}");
    assert!(p.wait_idle(LONG));
    assert_eq!(p.view().last_status(), "Run failed: No such cell.");
    assert_eq!(p.view().exec.last().unwrap().exit_code, -1);
}

#[test]
fn test_run_code_with_referenced_header() {
    if which::which("gcc").is_err() {
        eprintln!("skipping: gcc not found");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut p = presenter(dir.path());
    p.open_or_switch("x00001");
    p.insert(1, 1, "#define TWICE(x) ((x) * 2)\n");
    p.insert(
        1,
        2,
        indoc! {r#"
            /*---DOC---
            {"object": "demo.twice", "language": "c", "summary": "Doubles.",
             "entry": "stdio-json", "files": [{"name": "util.h", "ref": "01.0001"}]}
            ---END---*/
            #include <stdio.h>
            #include "util.h"
            int main(void){ printf("{\"v\":%d}", TWICE(21)); return 0; }
        "#},
    );

    p.run_code_async(1, 2, "{}");
    assert!(p.wait_idle(LONG));
    let report = p.view().exec.last().unwrap().clone();
    assert_eq!(report.exit_code, 0, "stderr: {}", report.stderr);
    assert_eq!(report.stdout, r#"{"v":42}"#);
    assert_eq!(report.title, "Run x00001 01.0002");
    assert!(report.workdir.unwrap().starts_with(dir.path().join("out").join("exec")));
    assert!(p.view().last_status().starts_with("Run OK: exit=0"));
}

#[test]
fn test_config_setters() {
    let dir = tempfile::tempdir().unwrap();
    let mut p = presenter(dir.path());
    p.open_or_switch("x00001");
    p.insert(10, 255, "hex");

    p.set_base(40);
    assert!(p.view().last_status().starts_with("Config rejected"));
    assert_eq!(p.config().base, 10);

    p.set_base(16);
    assert_eq!(p.view().last_status(), "Config saved.");
    assert_eq!(p.view().rows[0].register, "0a");
    assert_eq!(p.view().rows[0].address, "00ff");

    p.set_widths(3, 1, 2);
    p.set_prefix('b');
    assert!(p.view().last_status().starts_with("Config rejected"));
    p.set_prefix('#');
    assert_eq!(p.view().banks[0].context, "#001");

    let again = presenter(dir.path());
    assert_eq!(again.config().base, 16);
    assert_eq!(again.config().prefix, '#');
}

#[test]
fn test_merge_file() {
    let dir = tempfile::tempdir().unwrap();
    let incoming = dir.path().join("import.dat");
    fs::write(&incoming, "title = imported\n01.0001 = one\n01.0002 = two\n").unwrap();

    let mut p = presenter(dir.path());
    p.open_or_switch("x00001");
    p.merge_file(&incoming);
    assert_eq!(p.view().last_status(), format!("Merged 2 cells from {}", incoming.display()));
    assert_eq!(p.view().rows.len(), 2);
    assert_eq!(p.view().banks[0].title, "imported");
    assert!(p.is_dirty());
}
