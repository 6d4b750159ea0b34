//! Scripted register banks - command line driver
//!
//! Every invocation loads the banks under `--root`, performs one command
//! through the presenter and exits. Background operations are waited for
//! before the process ends.

mod cli;
mod console_view;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{parse_cell, Cli, Command};
use console_view::ConsoleView;
use scripted_common::{AddressId, RegisterId};
use scripted_exec::{ExecManager, Toolchain};
use scripted_presenter::Presenter;
use scripted_store::Paths;
use std::fs;
use std::path::Path;
use std::process;
use std::time::Duration;

/// Upper bound for one background operation, builds included.
const WAIT_LIMIT: Duration = Duration::from_secs(600);

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let paths = Paths::new(&cli.root);
    let toolchain = Toolchain::from_env();

    // Runs a file straight through the execution manager.
    let command = match cli.command {
        Command::Exec { source, stdin, stdin_file } => {
            return exec_file(&paths, toolchain, &source, &stdin, stdin_file.as_deref());
        }
        other => other,
    };

    let view = match command {
        Command::Ls | Command::Show { .. } => ConsoleView::quiet(),
        _ => ConsoleView::default(),
    };
    let mut presenter = Presenter::new(view, paths, toolchain)
        .with_context(|| format!("Cannot load banks under {}", cli.root.display()))?;

    match command {
        Command::Ls => {
            for bank in &presenter.view().banks {
                let cells = presenter
                    .workspace()
                    .bank(bank.id)
                    .map(|b| b.cell_count())
                    .unwrap_or(0);
                println!("{}\t{} cells\t{}", bank.context, cells, bank.title);
            }
        }

        Command::Show { context, filter } => {
            open(&mut presenter, &context)?;
            presenter.set_filter(&filter);
            if let Some(title) = presenter
                .view()
                .current
                .and_then(|id| presenter.workspace().bank(id))
                .map(|b| b.title.clone())
                .filter(|t| !t.is_empty())
            {
                println!("title = {}", title);
            }
            for row in &presenter.view().rows {
                println!("{}.{} = {}", row.register, row.address, row.value);
            }
        }

        Command::Set { context, cell, value, from_file } => {
            open(&mut presenter, &context)?;
            let (register, address) = cell_of(&presenter, &cell)?;
            let value = match (value, from_file) {
                (_, Some(file)) => fs::read_to_string(&file)
                    .with_context(|| format!("Cannot read {}", file.display()))?,
                (Some(value), None) => value,
                (None, None) => bail!("No value given"),
            };
            presenter.insert(register, address, &value);
            save(&mut presenter)?;
        }

        Command::Del { context, cell } => {
            open(&mut presenter, &context)?;
            let (register, address) = cell_of(&presenter, &cell)?;
            presenter.delete(register, address);
            if !presenter.is_dirty() {
                bail!("{}", presenter.view().last_status);
            }
            save(&mut presenter)?;
        }

        Command::Merge { context, file } => {
            open(&mut presenter, &context)?;
            presenter.merge_file(&file);
            if !presenter.is_dirty() {
                bail!("{}", presenter.view().last_status);
            }
            save(&mut presenter)?;
        }

        Command::Resolve { context } => {
            open(&mut presenter, &context)?;
            presenter.resolve_async();
            finish(&mut presenter)?;
            expect_status(&presenter, "Resolved")?;
        }

        Command::Export { context } => {
            open(&mut presenter, &context)?;
            presenter.export_async();
            finish(&mut presenter)?;
            expect_status(&presenter, "Exported")?;
        }

        Command::Run { context, cell, stdin, stdin_file } => {
            open(&mut presenter, &context)?;
            let (register, address) = cell_of(&presenter, &cell)?;
            let stdin = stdin_payload(&stdin, stdin_file.as_deref())?;
            presenter.run_code_async(register, address, &stdin);
            finish(&mut presenter)?;
            expect_clean_exit(&presenter)?;
        }

        Command::DocCheck { context, cell } => {
            open(&mut presenter, &context)?;
            let (register, address) = cell_of(&presenter, &cell)?;
            presenter.doc_check_async(register, address);
            finish(&mut presenter)?;
            expect_clean_exit(&presenter)?;
        }

        Command::Config { prefix, base, widths } => {
            if let Some(prefix) = prefix {
                presenter.set_prefix(prefix);
            }
            if let Some(base) = base {
                presenter.set_base(base);
            }
            if let Some(widths) = widths {
                let &[bank, register, address] = widths.as_slice() else {
                    bail!("--widths takes three numbers, got {}", widths.len());
                };
                presenter.set_widths(bank, register, address);
            }
            if presenter.view().last_status.starts_with("Config rejected") {
                bail!("{}", presenter.view().last_status);
            }
            let config = presenter.config();
            println!("prefix = {}", config.prefix);
            println!("base   = {}", config.base);
            println!(
                "widths = {},{},{}",
                config.width_bank, config.width_reg, config.width_addr
            );
        }

        Command::Exec { .. } => {}
    }

    Ok(())
}

fn open(presenter: &mut Presenter<ConsoleView>, context: &str) -> Result<()> {
    presenter.open_or_switch(context);
    if presenter.current().is_none() {
        bail!("{}", presenter.view().last_status);
    }
    Ok(())
}

fn cell_of(presenter: &Presenter<ConsoleView>, cell: &str) -> Result<(RegisterId, AddressId)> {
    parse_cell(presenter.config(), cell).map_err(anyhow::Error::msg)
}

fn save(presenter: &mut Presenter<ConsoleView>) -> Result<()> {
    presenter.save();
    if presenter.is_dirty() {
        bail!("{}", presenter.view().last_status);
    }
    Ok(())
}

fn finish(presenter: &mut Presenter<ConsoleView>) -> Result<()> {
    if presenter.is_busy() && !presenter.wait_idle(WAIT_LIMIT) {
        bail!("Gave up waiting after {}s", WAIT_LIMIT.as_secs());
    }
    Ok(())
}

fn expect_status(presenter: &Presenter<ConsoleView>, prefix: &str) -> Result<()> {
    let status = &presenter.view().last_status;
    if !status.starts_with(prefix) {
        bail!("{}", status);
    }
    Ok(())
}

fn expect_clean_exit(presenter: &Presenter<ConsoleView>) -> Result<()> {
    match &presenter.view().last_report {
        Some(report) if report.exit_code == 0 => Ok(()),
        Some(report) => bail!("exit code {}", report.exit_code),
        None => bail!("{}", presenter.view().last_status),
    }
}

fn stdin_payload(inline: &str, file: Option<&Path>) -> Result<String> {
    match file {
        Some(file) => {
            fs::read_to_string(file).with_context(|| format!("Cannot read {}", file.display()))
        }
        None => Ok(inline.to_string()),
    }
}

fn exec_file(
    paths: &Paths,
    toolchain: Toolchain,
    source: &Path,
    stdin: &str,
    stdin_file: Option<&Path>,
) -> Result<()> {
    let text = fs::read_to_string(source)
        .with_context(|| format!("Cannot read {}", source.display()))?;
    let stdin = stdin_payload(stdin, stdin_file)?;

    let manager = ExecManager::new(paths.exec_dir(), toolchain);
    let result = manager.build_and_run(&text, &stdin);

    if let Some(workdir) = &result.workdir {
        eprintln!("workdir: {}", workdir.display());
    }
    if !result.stdout_text.is_empty() {
        println!("{}", result.stdout_text.trim_end());
    }
    if !result.stderr_text.is_empty() {
        eprintln!("{}", result.stderr_text.trim_end());
    }
    if !result.is_success() {
        bail!("{} (exit code {})", result.outcome(), result.exit_code);
    }
    Ok(())
}
