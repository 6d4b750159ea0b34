use clap::{Parser, Subcommand};
use scripted_common::{AddressId, Config, RegisterId};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "scripted",
    about = "Scripted register banks",
    long_about = "scripted - register banks whose cells reference each other\n\nCells hold text with @ref(...) and @file(...) tokens. Banks can be resolved, exported as JSON, and cells carrying a documentation header can be built and run.",
    version
)]
pub struct Cli {
    /// Directory holding the bank files and scripted.json
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Debug logging (RUST_LOG still wins when set)
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the banks under the root
    Ls,

    /// Print the cells of a bank
    Show {
        context: String,

        /// Case-insensitive substring filter
        #[arg(short, long, default_value = "")]
        filter: String,
    },

    /// Set a cell and save the bank
    Set {
        context: String,

        /// Cell as REG.ADDR, e.g. 01.0002
        cell: String,

        /// New value
        #[arg(required_unless_present = "from_file", conflicts_with = "from_file")]
        value: Option<String>,

        /// Read the value from a file instead
        #[arg(long)]
        from_file: Option<PathBuf>,
    },

    /// Delete a cell and save the bank
    Del { context: String, cell: String },

    /// Merge a bank text file into a bank and save it
    Merge { context: String, file: PathBuf },

    /// Write out/<ctx>.resolved.txt
    Resolve { context: String },

    /// Write out/<ctx>.json
    Export { context: String },

    /// Build and run a code cell
    Run {
        context: String,
        cell: String,

        /// JSON handed to the program on stdin
        #[arg(long, default_value = "{}", conflicts_with = "stdin_file")]
        stdin: String,

        /// Read the program's stdin from a file
        #[arg(long)]
        stdin_file: Option<PathBuf>,
    },

    /// Check the documentation header of a code cell
    DocCheck { context: String, cell: String },

    /// Build and run a source file directly, without any bank
    Exec {
        source: PathBuf,

        #[arg(long, default_value = "{}", conflicts_with = "stdin_file")]
        stdin: String,

        #[arg(long)]
        stdin_file: Option<PathBuf>,
    },

    /// Show or change the display configuration
    Config {
        #[arg(long)]
        prefix: Option<char>,

        #[arg(long)]
        base: Option<u32>,

        /// Bank, register and address widths, e.g. 5,2,4
        #[arg(long, value_delimiter = ',')]
        widths: Option<Vec<usize>>,
    },
}

/// Split `REG.ADDR` and decode both halves in the configured base.
pub fn parse_cell(config: &Config, cell: &str) -> Result<(RegisterId, AddressId), String> {
    let (reg, addr) = cell
        .trim()
        .split_once('.')
        .ok_or_else(|| format!("expected REG.ADDR, got '{}'", cell))?;
    let register = config
        .parse_id(reg)
        .map_err(|e| format!("bad register '{}': {}", reg, e))?;
    let address = config
        .parse_id(addr)
        .map_err(|e| format!("bad address '{}': {}", addr, e))?;
    Ok((register, address))
}
