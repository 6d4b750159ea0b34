use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// A process invocation with every stream redirected to a file.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
    pub stdin: Option<PathBuf>,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>, cwd: &Path, stdout: PathBuf, stderr: PathBuf) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.to_path_buf(),
            stdin: None,
            stdout,
            stderr,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin_from(mut self, path: PathBuf) -> Self {
        self.stdin = Some(path);
        self
    }

    pub fn timeout(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit;
        self
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of running a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub timed_out: bool,
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot redirect to {path}: {source}")]
    Redirect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("process error: {0}")]
    Wait(#[from] std::io::Error),
}

fn open_for_write(path: &Path) -> Result<File, CommandError> {
    File::create(path).map_err(|source| CommandError::Redirect {
        path: path.to_path_buf(),
        source,
    })
}

/// Run a command, killing it if it outlives its timeout
pub async fn run_command(spec: &CommandSpec) -> Result<CommandResult, CommandError> {
    log::debug!("$ {}", spec.display());

    let stdin = match &spec.stdin {
        Some(path) => Stdio::from(File::open(path).map_err(|source| CommandError::Redirect {
            path: path.clone(),
            source,
        })?),
        None => Stdio::null(),
    };

    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .stdin(stdin)
        .stdout(Stdio::from(open_for_write(&spec.stdout)?))
        .stderr(Stdio::from(open_for_write(&spec.stderr)?))
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: spec.program.to_string_lossy().into_owned(),
            source,
        })?;

    let status = match spec.timeout {
        Some(limit) => match timeout(limit, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                // Timeout occurred
                log::warn!("Killing {} after {:?}", spec.display(), limit);
                child.kill().await?;
                return Ok(CommandResult {
                    exit_code: -1,
                    timed_out: true,
                });
            }
        },
        None => child.wait().await?,
    };

    Ok(CommandResult {
        exit_code: status.code().unwrap_or(-1),
        timed_out: false,
    })
}

/// Run a command synchronously (wrapper for async version)
pub fn run_command_sync(spec: &CommandSpec) -> Result<CommandResult, CommandError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_command(spec))
}
