use crate::codes;
use crate::command::{run_command_sync, CommandError, CommandSpec};
use crate::doc::{self, blank_doc_block, Checked, Doc, DocError, Language};
use crate::hash::content_hash;
use crate::manifest::{Manifest, ManifestEntry};
use crate::toolchain::Toolchain;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

const STDIN_FILE: &str = "stdin.json";
const STDOUT_FILE: &str = "stdout.json";
const STDERR_FILE: &str = "stderr.txt";
const DOC_FILE: &str = "doc.json";
const EXE_FILE: &str = "a.out";

/// How far an attempt got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Gate,
    Materialize,
    Build,
    Run,
}

/// Classification of an [`ExecResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Success,
    /// The program ran and exited non-zero.
    ProgramFailed(i32),
    /// Refused by the documentation gate (9001..=9004).
    Refused(i32),
    /// Compiler, venv or pip failed; the code is in a build band.
    BuildFailed(i32),
    TimedOut,
    IoFailure,
    SpawnFailure,
}

impl fmt::Display for ExecOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecOutcome::Success => write!(f, "ok"),
            ExecOutcome::ProgramFailed(code) => write!(f, "program exited with {}", code),
            ExecOutcome::Refused(code) => write!(f, "refused ({})", code),
            ExecOutcome::BuildFailed(code) => write!(f, "build failed ({})", code),
            ExecOutcome::TimedOut => write!(f, "timed out"),
            ExecOutcome::IoFailure => write!(f, "I/O failure"),
            ExecOutcome::SpawnFailure => write!(f, "tool could not be started"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout_text: String,
    pub stderr_text: String,
    /// Unset when the gate refused the source.
    pub workdir: Option<PathBuf>,
    /// The executable (or interpreter) that ran, if the run stage was reached.
    pub exe_path: Option<PathBuf>,
    pub stage: Stage,
}

impl ExecResult {
    fn failure(stage: Stage, exit_code: i32, stderr_text: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout_text: String::new(),
            stderr_text: stderr_text.into(),
            workdir: None,
            exe_path: None,
            stage,
        }
    }

    fn refused(err: &DocError) -> Self {
        Self::failure(Stage::Gate, err.code(), err.to_string())
    }

    fn in_workdir(mut self, work: &Path) -> Self {
        self.workdir = Some(work.to_path_buf());
        self
    }

    pub fn outcome(&self) -> ExecOutcome {
        match (self.stage, self.exit_code) {
            (Stage::Gate, code) => ExecOutcome::Refused(code),
            (_, codes::IO_FAILURE) => ExecOutcome::IoFailure,
            (_, codes::SPAWN_FAILURE) => ExecOutcome::SpawnFailure,
            (Stage::Materialize, _) => ExecOutcome::IoFailure,
            (Stage::Build, code) => ExecOutcome::BuildFailed(code),
            (Stage::Run, codes::TIMED_OUT) => ExecOutcome::TimedOut,
            (Stage::Run, 0) => ExecOutcome::Success,
            (Stage::Run, code) => ExecOutcome::ProgramFailed(code),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome() == ExecOutcome::Success
    }
}

/// Failure inside a build or run step, before it is folded into a code.
enum StepError {
    Failed(ExecResult),
    Io(PathBuf, io::Error),
}

impl From<ExecResult> for StepError {
    fn from(result: ExecResult) -> Self {
        StepError::Failed(result)
    }
}

fn read_back(path: &Path) -> Result<String, StepError> {
    match fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(StepError::Io(path.to_path_buf(), e)),
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), StepError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StepError::Io(parent.to_path_buf(), e))?;
    }
    fs::write(path, contents).map_err(|e| StepError::Io(path.to_path_buf(), e))
}

fn split_flags(flags: &str) -> impl Iterator<Item = &str> {
    flags.split_whitespace()
}

/// Builds and runs documented source texts under `out_root`.
#[derive(Debug, Clone)]
pub struct ExecManager {
    out_root: PathBuf,
    toolchain: Toolchain,
}

impl ExecManager {
    pub fn new(out_root: impl Into<PathBuf>, toolchain: Toolchain) -> Self {
        Self {
            out_root: out_root.into(),
            toolchain,
        }
    }

    pub fn out_root(&self) -> &Path {
        &self.out_root
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    pub fn manifest(&self) -> Manifest {
        Manifest::in_dir(&self.out_root)
    }

    /// Work directory a source would be built in, without building it.
    /// [`ExecManager::build_and_run`] uses this path made absolute against the
    /// current directory.
    pub fn workdir_for(&self, object: &str, source: &str) -> PathBuf {
        self.out_root
            .join(format!("{}_{}", object, content_hash(source)))
    }

    /// Gate, materialize, build and run `source`, feeding it `stdin_payload`.
    ///
    /// Every call rebuilds from scratch; the work directory name is a content
    /// address, not a cache key.
    pub fn build_and_run(&self, source: &str, stdin_payload: &str) -> ExecResult {
        let checked = match doc::check(source) {
            Ok(checked) => checked,
            Err(err) => {
                log::warn!("Refusing source: {}", err);
                return ExecResult::refused(&err);
            }
        };

        let hash = content_hash(source);
        // Tools run inside the work directory, so every path handed to them
        // must be absolute.
        let work = match std::path::absolute(self.workdir_for(&checked.doc.object, source)) {
            Ok(work) => work,
            Err(e) => {
                let message = format!("cannot locate work directory: {}", e);
                log::warn!("{}", message);
                return ExecResult::failure(Stage::Materialize, codes::IO_FAILURE, message);
            }
        };

        if let Err(err) = self.materialize(&checked, source, stdin_payload, &work) {
            let message = match err {
                StepError::Io(path, e) => format!("cannot write {}: {}", path.display(), e),
                StepError::Failed(result) => result.stderr_text,
            };
            log::warn!("{}", message);
            return ExecResult::failure(Stage::Materialize, codes::IO_FAILURE, message)
                .in_workdir(&work);
        }

        let result = match self.dispatch(&checked.doc, checked.language, &work) {
            Ok(result) | Err(StepError::Failed(result)) => result,
            Err(StepError::Io(path, e)) => ExecResult::failure(
                Stage::Run,
                codes::IO_FAILURE,
                format!("cannot read {}: {}", path.display(), e),
            ),
        }
        .in_workdir(&work);

        let artifact = result
            .exe_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let entry = ManifestEntry::now(
            &checked.doc.object,
            checked.language.as_str(),
            hash,
            &checked.doc.summary,
            artifact,
        );
        if let Err(e) = self.manifest().append(&entry) {
            log::warn!("Cannot append to manifest: {}", e);
        }

        log::info!(
            "{} ({}): {} [exit {}]",
            checked.doc.object,
            checked.language.as_str(),
            result.outcome(),
            result.exit_code
        );
        result
    }

    /// Write the work directory: stdin, header, primary source and extra files.
    fn materialize(
        &self,
        checked: &Checked<'_>,
        source: &str,
        stdin_payload: &str,
        work: &Path,
    ) -> Result<(), StepError> {
        let doc = &checked.doc;
        log::debug!("Materializing {} in {}", doc.object, work.display());

        fs::create_dir_all(work).map_err(|e| StepError::Io(work.to_path_buf(), e))?;
        write_file(&work.join(STDIN_FILE), stdin_payload)?;
        write_file(&work.join(DOC_FILE), checked.block.body.trim())?;

        let (primary, text) = match checked.language {
            Language::C => (work.join("main.c"), source.to_string()),
            Language::Cpp => (work.join("main.cpp"), source.to_string()),
            Language::Java => (
                work.join(format!("{}.java", doc.simple_main())),
                source.to_string(),
            ),
            Language::Python => (work.join("main.py"), blank_doc_block(source, &checked.block)),
        };
        write_file(&primary, &text)?;

        for file in &doc.files {
            let body = match (&file.content, &file.reference) {
                (Some(content), _) => content.clone(),
                (None, Some(reference)) => format!("// unresolved ref: {}\n", reference),
                (None, None) => String::new(),
            };
            write_file(&work.join(&file.name), &body)?;
        }
        Ok(())
    }

    fn dispatch(&self, doc: &Doc, language: Language, work: &Path) -> Result<ExecResult, StepError> {
        match language {
            Language::C => self.build_native(doc, work, &self.toolchain.gcc, &["c"], codes::C_BUILD_BAND),
            Language::Cpp => self.build_native(
                doc,
                work,
                &self.toolchain.gxx,
                &["cpp", "cc", "cxx"],
                codes::CPP_BUILD_BAND,
            ),
            Language::Java => self.build_java(doc, work),
            Language::Python => self.run_python(doc, work),
        }
    }

    fn build_native(
        &self,
        doc: &Doc,
        work: &Path,
        compiler: &str,
        extensions: &[&str],
        band: i32,
    ) -> Result<ExecResult, StepError> {
        let sources = collect_sources(work, extensions)?;
        let exe = work.join(EXE_FILE);

        let spec = CommandSpec::new(
            compiler,
            work,
            work.join("compile_stdout.txt"),
            work.join("compile_stderr.txt"),
        )
        .args(split_flags(&doc.build.cflags))
        .args(sources)
        .args(split_flags(&doc.build.ldflags))
        .arg("-o")
        .arg(&exe);
        self.build_step(&spec, band)?;

        self.run(doc, work, CommandSpec::new(&exe, work, PathBuf::new(), PathBuf::new()), exe.clone())
    }

    fn build_java(&self, doc: &Doc, work: &Path) -> Result<ExecResult, StepError> {
        let classpath = doc.build.classpath.trim();
        let sources = collect_sources(work, &["java"])?;

        let spec = CommandSpec::new(
            &self.toolchain.javac,
            work,
            work.join("javac_stdout.txt"),
            work.join("javac_stderr.txt"),
        )
        .arg("-cp")
        .arg(if classpath.is_empty() { "." } else { classpath })
        .arg("-d")
        .arg(work)
        .args(sources);
        self.build_step(&spec, codes::JAVA_BUILD_BAND)?;

        let mut run_cp = OsString::from(work);
        if !classpath.is_empty() {
            run_cp.push(Toolchain::classpath_separator().to_string());
            run_cp.push(classpath);
        }
        let java = PathBuf::from(&self.toolchain.java);
        let spec = CommandSpec::new(&self.toolchain.java, work, PathBuf::new(), PathBuf::new())
            .arg("-cp")
            .arg(run_cp)
            .arg(&doc.main);
        self.run(doc, work, spec, java)
    }

    fn run_python(&self, doc: &Doc, work: &Path) -> Result<ExecResult, StepError> {
        let venv_name = match doc.build.venv.trim() {
            "" => "venv",
            name => name,
        };
        let venv = work.join(venv_name);
        let (venv_python, venv_pip) = venv_binaries(&venv);

        if doc.build.wants_venv() {
            if !venv_python.exists() {
                let spec = CommandSpec::new(
                    &self.toolchain.python,
                    work,
                    work.join("venv_stdout.txt"),
                    work.join("venv_stderr.txt"),
                )
                .args(["-m", "venv"])
                .arg(&venv);
                self.build_step(&spec, codes::PYTHON_SETUP_BAND)?;
            }

            if !doc.build.python_requirements.is_empty() {
                let requirements = work.join("requirements.txt");
                let mut listing = doc.build.python_requirements.join("\n");
                listing.push('\n');
                write_file(&requirements, &listing)?;

                let spec = CommandSpec::new(
                    &venv_pip,
                    work,
                    work.join("pip_stdout.txt"),
                    work.join("pip_stderr.txt"),
                )
                .args(["install", "-r"])
                .arg(&requirements);
                self.build_step(&spec, codes::PYTHON_SETUP_BAND)?;
            }
        }

        let interpreter = if venv_python.exists() {
            venv_python
        } else {
            PathBuf::from(&self.toolchain.python)
        };
        let spec = CommandSpec::new(&interpreter, work, PathBuf::new(), PathBuf::new())
            .arg(work.join("main.py"));
        self.run(doc, work, spec, interpreter)
    }

    /// Run a compile or setup command; a non-zero exit becomes a banded result
    /// carrying the tool's stderr.
    fn build_step(&self, spec: &CommandSpec, band: i32) -> Result<(), StepError> {
        match run_command_sync(spec) {
            Ok(result) if result.exit_code == 0 => Ok(()),
            Ok(result) => {
                let stderr = read_back(&spec.stderr)?;
                Err(ExecResult::failure(Stage::Build, codes::banded(band, result.exit_code), stderr).into())
            }
            Err(e) => Err(command_failure(Stage::Build, e).into()),
        }
    }

    /// The single run of a built program.
    fn run(&self, doc: &Doc, work: &Path, mut spec: CommandSpec, exe: PathBuf) -> Result<ExecResult, StepError> {
        let stdout_path = work.join(STDOUT_FILE);
        let stderr_path = work.join(STDERR_FILE);
        spec.stdout = stdout_path.clone();
        spec.stderr = stderr_path.clone();
        spec = spec
            .stdin_from(work.join(STDIN_FILE))
            .timeout(self.run_timeout(doc));

        let outcome = run_command_sync(&spec);
        let mut result = match outcome {
            Ok(run) if run.timed_out => ExecResult::failure(Stage::Run, codes::TIMED_OUT, ""),
            Ok(run) => ExecResult::failure(Stage::Run, run.exit_code, ""),
            Err(e) => return Err(command_failure(Stage::Run, e).into()),
        };

        result.stdout_text = read_back(&stdout_path)?;
        result.stderr_text = read_back(&stderr_path)?;
        if result.exit_code == codes::TIMED_OUT {
            result
                .stderr_text
                .push_str(&format!("\n[killed after {} ms]\n", doc.timeout_ms.unwrap_or_default()));
        }
        result.exe_path = Some(exe);
        Ok(result)
    }

    fn run_timeout(&self, doc: &Doc) -> Option<Duration> {
        if self.toolchain.enforce_timeout {
            doc.timeout_ms.map(Duration::from_millis)
        } else {
            None
        }
    }
}

fn command_failure(stage: Stage, err: CommandError) -> ExecResult {
    let code = match err {
        CommandError::Spawn { .. } => codes::SPAWN_FAILURE,
        CommandError::Redirect { .. } | CommandError::Wait(_) => codes::IO_FAILURE,
    };
    ExecResult::failure(stage, code, err.to_string())
}

/// Every file under `work` with one of `extensions`, sorted.
fn collect_sources(work: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, StepError> {
    let root = glob::Pattern::escape(&work.to_string_lossy());
    let mut sources = Vec::new();
    for ext in extensions {
        let pattern = format!("{}/**/*.{}", root, ext);
        let entries = glob::glob(&pattern)
            .map_err(|e| StepError::Io(work.to_path_buf(), io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        sources.extend(entries.flatten().filter(|p| p.is_file()));
    }
    sources.sort();
    Ok(sources)
}

fn venv_binaries(venv: &Path) -> (PathBuf, PathBuf) {
    if cfg!(windows) {
        (
            venv.join("Scripts").join("python.exe"),
            venv.join("Scripts").join("pip.exe"),
        )
    } else {
        (venv.join("bin").join("python"), venv.join("bin").join("pip"))
    }
}
