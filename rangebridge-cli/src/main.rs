//! RangeBridge CLI - Command-line interface
//!
//! Drives range reads of local files through an in-process producer so both
//! transports, verification and retry can be exercised from a shell.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use console::style;

use commands::common::TransportArg;
use commands::config::ConfigCommands;
use commands::copy::CopyArgs;
use commands::read::ReadArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "rangebridge")]
#[command(
    about = "Random-access range reads across an asynchronous producer boundary",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read one byte range of a file
    Read {
        /// File to read
        path: PathBuf,

        /// Byte position in the file
        #[arg(long, default_value = "0")]
        position: u64,

        /// Number of bytes to read
        #[arg(long, default_value = "256")]
        count: u32,

        /// Offset into the destination buffer
        #[arg(long, default_value = "0")]
        offset: u64,

        /// Transport (overrides config)
        #[arg(long, value_enum)]
        transport: Option<TransportArg>,

        /// Corrupt the next N shared-buffer reads
        #[arg(long, default_value = "0")]
        corrupt: usize,

        /// Print a hex dump instead of text
        #[arg(long)]
        hex: bool,
    },

    /// Copy a file through the bridge in chunks
    Copy {
        /// Source file
        source: PathBuf,

        /// Destination file
        destination: PathBuf,

        /// Transport (overrides config)
        #[arg(long, value_enum)]
        transport: Option<TransportArg>,

        /// Chunk size in bytes (overrides config)
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// View and modify configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result: Result<(), CliError> = match cli.command {
        Commands::Read {
            path,
            position,
            count,
            offset,
            transport,
            corrupt,
            hex,
        } => commands::read::run(ReadArgs {
            path,
            position,
            count,
            offset,
            transport,
            corrupt,
            hex,
        }),
        Commands::Copy {
            source,
            destination,
            transport,
            chunk_size,
        } => commands::copy::run(CopyArgs {
            source,
            destination,
            transport,
            chunk_size,
        }),
        Commands::Config { command } => commands::config::run(command),
    };

    if let Err(e) = result {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        process::exit(e.exit_code());
    }
}
