use crate::gate::{JobResult, OperationKind, Orchestrator, StartError};
use crate::view::{BankSummary, ExecReport, View};
use scripted_common::{AddressId, BankId, CellKey, Config, RegisterId, ScriptedError};
use scripted_exec::{doc_check, inline_file_refs, DocError, ExecManager, ExecResult, Toolchain};
use scripted_resolver::{export_bank_to_json, resolve_bank_to_text, Resolver, Visited};
use scripted_store::{merge_file, open_context, preload_all, save_context, Paths, Workspace};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What a background operation hands back to the delivery context.
#[derive(Debug)]
pub enum Outcome {
    /// Resolve or export wrote this file.
    Written(PathBuf),
    Executed(ExecResult),
    DocChecked(Result<String, DocError>),
    Failed(String),
}

/// Everything the presenter mutates on the delivery context.
struct Session<V> {
    view: V,
    paths: Paths,
    config: Config,
    workspace: Workspace,
    toolchain: Toolchain,
    current: Option<BankId>,
    filter: String,
    dirty: BTreeSet<BankId>,
}

impl<V: View> Session<V> {
    fn context_name(&self, id: BankId) -> String {
        self.config
            .context_name(id)
            .unwrap_or_else(|_| id.to_string())
    }

    fn cell_label(&self, register: RegisterId, address: AddressId) -> String {
        match (
            self.config.format_register(register),
            self.config.format_address(address),
        ) {
            (Ok(reg), Ok(addr)) => format!("{}.{}", reg, addr),
            _ => format!("{}.{}", register, address),
        }
    }

    fn push_banks(&mut self) {
        let banks: Vec<BankSummary> = self
            .workspace
            .bank_ids()
            .into_iter()
            .map(|id| BankSummary {
                id,
                context: self.context_name(id),
                title: self
                    .workspace
                    .bank(id)
                    .map(|b| b.title.clone())
                    .unwrap_or_default(),
            })
            .collect();
        self.view.show_bank_list(&banks);
        self.view.show_current(self.current);
    }

    fn refresh_rows(&mut self) {
        let rows = match self.current.and_then(|id| self.workspace.bank(id)) {
            Some(bank) => match bank.rows(&self.config, &self.filter) {
                Ok(rows) => rows,
                Err(e) => {
                    self.view.show_status(&format!("Cannot list rows: {}", e));
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        self.view.show_rows(&rows);
        self.view.show_current(self.current);
    }

    fn require_current(&mut self) -> Option<BankId> {
        if self.current.is_none() {
            self.view.show_status("No current context");
        }
        self.current
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            config: self.config.clone(),
            workspace: self.workspace.clone(),
            paths: self.paths.clone(),
            toolchain: self.toolchain.clone(),
        }
    }
}

/// Owned copy of the state a worker reads, taken when the operation starts.
#[derive(Clone)]
struct Snapshot {
    config: Config,
    workspace: Workspace,
    paths: Paths,
    toolchain: Toolchain,
}

impl Snapshot {
    fn write_output(path: &Path, text: &str) -> Result<PathBuf, ScriptedError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| ScriptedError::io(dir, e))?;
        }
        fs::write(path, text).map_err(|e| ScriptedError::io(path, e))?;
        Ok(path.to_path_buf())
    }

    fn resolve_to_file(&self, id: BankId) -> Result<PathBuf, ScriptedError> {
        let text = resolve_bank_to_text(&self.config, &self.workspace, &self.paths.root, id)?;
        Self::write_output(&self.paths.resolved_file(&self.config, id)?, &text)
    }

    fn export_to_file(&self, id: BankId) -> Result<PathBuf, ScriptedError> {
        let json = export_bank_to_json(&self.config, &self.workspace, &self.paths.root, id)?;
        Self::write_output(&self.paths.json_file(&self.config, id)?, &json)
    }

    /// Cell text with references expanded and `files[].ref` entries inlined.
    fn expanded_source(&self, key: CellKey) -> Result<String, String> {
        if self.workspace.cell(key).is_none() {
            return Err("No such cell.".to_string());
        }
        let resolver = Resolver::new(&self.config, &self.workspace, &self.paths.root);
        let expanded = resolver
            .resolve_cell(key, &mut Visited::new())
            .map_err(|e| e.to_string())?;
        inline_file_refs(&expanded, |spec| {
            resolver.resolve_reference(spec, key.bank, &mut Visited::new())
        })
        .map_err(|e| e.to_string())
    }

    fn run_code(&self, key: CellKey, stdin: &str) -> Outcome {
        match self.expanded_source(key) {
            Ok(source) => {
                let manager = ExecManager::new(self.paths.exec_dir(), self.toolchain.clone());
                Outcome::Executed(manager.build_and_run(&source, stdin))
            }
            Err(message) => Outcome::Failed(message),
        }
    }

    fn doc_check(&self, key: CellKey) -> Outcome {
        match self.expanded_source(key) {
            Ok(source) => Outcome::DocChecked(doc_check(&source)),
            Err(message) => Outcome::Failed(message),
        }
    }
}

fn written_or_failed(result: Result<PathBuf, ScriptedError>) -> Outcome {
    match result {
        Ok(path) => Outcome::Written(path),
        Err(e) => Outcome::Failed(e.to_string()),
    }
}

fn finish_write<V: View>(session: &mut Session<V>, done: &str, failed: &str, result: JobResult<Outcome>) {
    let status = match result {
        Ok(Outcome::Written(path)) => format!("{} -> {}", done, path.display()),
        Ok(Outcome::Failed(message)) | Err(message) => format!("{}: {}", failed, message),
        Ok(other) => format!("{}: unexpected result {:?}", failed, other),
    };
    session.view.show_status(&status);
}

fn finish_run<V: View>(session: &mut Session<V>, title: String, result: JobResult<Outcome>) {
    match result {
        Ok(Outcome::Executed(exec)) => {
            let workdir = exec
                .workdir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string());
            let status = if exec.is_success() {
                format!("Run OK: exit=0  ({})", workdir)
            } else {
                format!("Run failed: {}  ({})", exec.outcome(), workdir)
            };
            session.view.show_status(&status);
            session.view.show_exec_result(&ExecReport {
                title,
                stdout: exec.stdout_text,
                stderr: exec.stderr_text,
                exit_code: exec.exit_code,
                workdir: exec.workdir,
            });
        }
        Ok(Outcome::Failed(message)) | Err(message) => {
            session.view.show_status(&format!("Run failed: {}", message));
            session.view.show_exec_result(&ExecReport {
                title,
                stdout: String::new(),
                stderr: message,
                exit_code: -1,
                workdir: None,
            });
        }
        Ok(other) => session
            .view
            .show_status(&format!("Run failed: unexpected result {:?}", other)),
    }
}

fn finish_doc_check<V: View>(session: &mut Session<V>, title: String, result: JobResult<Outcome>) {
    let (status, report) = match result {
        Ok(Outcome::DocChecked(Ok(report))) => (
            "Doc OK".to_string(),
            ExecReport {
                title,
                stdout: report,
                stderr: String::new(),
                exit_code: 0,
                workdir: None,
            },
        ),
        Ok(Outcome::DocChecked(Err(e))) => (
            format!("Doc check failed: {}", e),
            ExecReport {
                title,
                stdout: String::new(),
                stderr: format!("ERROR: {}", e),
                exit_code: e.code(),
                workdir: None,
            },
        ),
        Ok(Outcome::Failed(message)) | Err(message) => (
            format!("Doc check failed: {}", message),
            ExecReport {
                title,
                stdout: String::new(),
                stderr: format!("ERROR: {}", message),
                exit_code: 1,
                workdir: None,
            },
        ),
        Ok(other) => (
            format!("Doc check failed: unexpected result {:?}", other),
            ExecReport {
                title,
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 1,
                workdir: None,
            },
        ),
    };
    session.view.show_status(&status);
    session.view.show_exec_result(&report);
}

/// Mediates between a [`View`] and the store, resolver and execution manager.
///
/// Synchronous operations mutate the workspace directly. Resolve, export,
/// run-code and doc-check go through the single-flight gate; their results
/// reach the view when the front end calls [`Presenter::pump`] or
/// [`Presenter::wait_idle`].
pub struct Presenter<V: View + 'static> {
    session: Session<V>,
    gate: Orchestrator<Session<V>, Outcome>,
}

impl<V: View + 'static> Presenter<V> {
    /// Load the display config under `paths.root` and preload every bank.
    pub fn new(view: V, paths: Paths, toolchain: Toolchain) -> Result<Self, ScriptedError> {
        let config = Config::load(&paths.config_file())?;
        let mut presenter = Self {
            session: Session {
                view,
                paths,
                config,
                workspace: Workspace::new(),
                toolchain,
                current: None,
                filter: String::new(),
                dirty: BTreeSet::new(),
            },
            gate: Orchestrator::new(),
        };

        let s = &mut presenter.session;
        let status = match preload_all(&mut s.workspace, &s.config, &s.paths) {
            Ok(_) => format!("Ready. Loaded {} banks.", s.workspace.len()),
            Err(e) => format!("Ready. Preload stopped: {}", e),
        };
        s.push_banks();
        s.view.show_status(&status);
        Ok(presenter)
    }

    pub fn view(&self) -> &V {
        &self.session.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.session.view
    }

    pub fn workspace(&self) -> &Workspace {
        &self.session.workspace
    }

    pub fn config(&self) -> &Config {
        &self.session.config
    }

    pub fn paths(&self) -> &Paths {
        &self.session.paths
    }

    pub fn current(&self) -> Option<BankId> {
        self.session.current
    }

    /// Whether the current bank has unsaved edits.
    pub fn is_dirty(&self) -> bool {
        self.session
            .current
            .is_some_and(|id| self.session.dirty.contains(&id))
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// Open `name` (`x00001`, `00001` or `x00001.txt`) and make it current.
    pub fn open_or_switch(&mut self, name: &str) {
        let s = &mut self.session;
        let id = match s.config.parse_context_name(name.trim()) {
            Ok(id) => id,
            Err(e) => {
                s.view.show_status(&format!("Bad context name '{}': {}", name, e));
                return;
            }
        };

        let was_loaded = s.workspace.contains(id);
        let status = match open_context(&mut s.workspace, &s.config, &s.paths, id) {
            Ok(_) if was_loaded => format!("Switched to {}", s.context_name(id)),
            Ok(true) => format!("Opened {}", s.context_name(id)),
            Ok(false) => format!("Created {}", s.context_name(id)),
            Err(e) => {
                s.view.show_status(&format!("Open failed: {}", e));
                return;
            }
        };

        s.current = Some(id);
        s.push_banks();
        s.refresh_rows();
        s.view.show_status(&status);
    }

    pub fn preload(&mut self) {
        let s = &mut self.session;
        let status = match preload_all(&mut s.workspace, &s.config, &s.paths) {
            Ok(_) => format!("Preloaded {} banks.", s.workspace.len()),
            Err(e) => format!("Preload failed: {}", e),
        };
        s.push_banks();
        s.refresh_rows();
        s.view.show_status(&status);
    }

    pub fn save(&mut self) {
        let s = &mut self.session;
        let Some(id) = s.require_current() else { return };
        match save_context(&s.workspace, &s.config, &s.paths, id) {
            Ok(path) => {
                s.dirty.remove(&id);
                s.view.show_status(&format!("Saved {}", path.display()));
            }
            Err(e) => s.view.show_status(&format!("Save failed: {}", e)),
        }
    }

    pub fn insert(&mut self, register: RegisterId, address: AddressId, value: &str) {
        let s = &mut self.session;
        let Some(id) = s.require_current() else { return };
        s.workspace.ensure_bank(id).insert(register, address, value);
        s.dirty.insert(id);
        s.refresh_rows();
        let label = s.cell_label(register, address);
        s.view.show_status(&format!("Updated {}", label));
    }

    pub fn delete(&mut self, register: RegisterId, address: AddressId) {
        let s = &mut self.session;
        let Some(id) = s.require_current() else { return };
        let label = s.cell_label(register, address);
        let removed = s
            .workspace
            .bank_mut(id)
            .and_then(|bank| bank.remove(register, address));
        if removed.is_some() {
            s.dirty.insert(id);
            s.refresh_rows();
            s.view.show_status(&format!("Deleted {}", label));
        } else {
            s.view.show_status(&format!("No cell {}", label));
        }
    }

    /// Case-insensitive substring filter on register, address and value.
    pub fn set_filter(&mut self, filter: &str) {
        self.session.filter = filter.to_string();
        self.session.refresh_rows();
    }

    /// Merge a bank text file into the current bank.
    pub fn merge_file(&mut self, file: &Path) {
        let s = &mut self.session;
        let Some(id) = s.require_current() else { return };
        match merge_file(&mut s.workspace, &s.config, id, file) {
            Ok(count) => {
                s.dirty.insert(id);
                s.push_banks();
                s.refresh_rows();
                s.view
                    .show_status(&format!("Merged {} cells from {}", count, file.display()));
            }
            Err(e) => s.view.show_status(&format!("Merge failed: {}", e)),
        }
    }

    fn update_config(&mut self, config: Config) {
        let s = &mut self.session;
        if let Err(e) = config.save(&s.paths.config_file()) {
            s.view.show_status(&format!("Config rejected: {}", e));
            return;
        }
        s.config = config;
        s.push_banks();
        s.refresh_rows();
        s.view.show_status("Config saved.");
    }

    pub fn set_prefix(&mut self, prefix: char) {
        let config = Config {
            prefix,
            ..self.session.config.clone()
        };
        self.update_config(config);
    }

    pub fn set_base(&mut self, base: u32) {
        let config = Config {
            base,
            ..self.session.config.clone()
        };
        self.update_config(config);
    }

    pub fn set_widths(&mut self, bank: usize, register: usize, address: usize) {
        let config = Config {
            width_bank: bank,
            width_reg: register,
            width_addr: address,
            ..self.session.config.clone()
        };
        self.update_config(config);
    }

    fn launch<J, D>(&mut self, kind: OperationKind, job: J, on_done: D)
    where
        J: FnOnce() -> Outcome + Send + 'static,
        D: FnOnce(&mut Session<V>, JobResult<Outcome>) + 'static,
    {
        let started = self.gate.start(kind, job, move |session: &mut Session<V>, result| {
            session.view.set_busy(false);
            on_done(session, result);
        });
        match started {
            Ok(()) => self.session.view.set_busy(true),
            Err(StartError::Busy(_)) => self.session.view.show_status("Busy..."),
            Err(e) => self.session.view.show_status(&e.to_string()),
        }
    }

    /// Write the current bank, fully resolved, to `out/<ctx>.resolved.txt`.
    pub fn resolve_async(&mut self) {
        let Some(id) = self.session.require_current() else { return };
        let snapshot = self.session.snapshot();
        self.launch(
            OperationKind::Resolve,
            move || written_or_failed(snapshot.resolve_to_file(id)),
            |session, result| finish_write(session, "Resolved", "Resolve failed", result),
        );
    }

    /// Write the current bank as JSON to `out/<ctx>.json`.
    pub fn export_async(&mut self) {
        let Some(id) = self.session.require_current() else { return };
        let snapshot = self.session.snapshot();
        self.launch(
            OperationKind::Export,
            move || written_or_failed(snapshot.export_to_file(id)),
            |session, result| finish_write(session, "Exported JSON", "Export failed", result),
        );
    }

    /// Resolve the cell and build and run it with `stdin` as its input.
    pub fn run_code_async(&mut self, register: RegisterId, address: AddressId, stdin: &str) {
        let Some(id) = self.session.require_current() else { return };
        let snapshot = self.session.snapshot();
        let key = CellKey::new(id, register, address);
        let stdin = stdin.to_string();
        let title = format!(
            "Run {} {}",
            self.session.context_name(id),
            self.session.cell_label(register, address)
        );
        self.launch(
            OperationKind::RunCode,
            move || snapshot.run_code(key, &stdin),
            move |session, result| finish_run(session, title, result),
        );
    }

    /// Resolve the cell and report on its documentation header.
    pub fn doc_check_async(&mut self, register: RegisterId, address: AddressId) {
        let Some(id) = self.session.require_current() else { return };
        let snapshot = self.session.snapshot();
        let key = CellKey::new(id, register, address);
        let title = format!(
            "Doc check {} {}",
            self.session.context_name(id),
            self.session.cell_label(register, address)
        );
        self.launch(
            OperationKind::DocCheck,
            move || snapshot.doc_check(key),
            move |session, result| finish_doc_check(session, title, result),
        );
    }

    /// Deliver a finished background operation, if any. Never blocks.
    pub fn pump(&mut self) -> bool {
        self.gate.poll(&mut self.session)
    }

    /// Block until the running operation (if any) is delivered.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        self.gate.wait(&mut self.session, timeout)
    }
}
