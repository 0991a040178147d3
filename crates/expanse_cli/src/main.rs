//! Expanse CLI: expands macro calls through the persistent expansion cache.
//!
//! Provides `expanse expand` for expanding the `macro_rules!` calls of a
//! file, `expanse cache` for inspecting and maintaining the on-disk caches,
//! and the hidden `expanse proc-worker` helper that the engine starts for
//! procedural macro expansion.

#![warn(missing_docs)]

mod cache;
mod expand;
mod logging;
mod settings;
mod source;
mod worker;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Expanse: incremental macro expansion with a persistent result cache.
#[derive(Parser, Debug)]
#[command(name = "expanse", version, about = "Incremental macro expansion engine")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control colored output.
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Path to a custom `expanse.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Cache directory, overriding the configuration.
    #[arg(long, global = true)]
    pub cache_dir: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Expand every macro call in a file.
    Expand(ExpandArgs),
    /// Inspect or maintain the persistent caches.
    Cache {
        /// What to do with the cache.
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Serve procedural macro requests on stdin/stdout.
    #[command(name = "proc-worker", hide = true)]
    ProcWorker,
}

/// Arguments for the `expanse expand` subcommand.
#[derive(Parser, Debug)]
pub struct ExpandArgs {
    /// Source file containing `macro_rules!` definitions and calls.
    pub file: PathBuf,

    /// Print a machine-readable JSON report.
    #[arg(long)]
    pub json: bool,

    /// Expand without reading or writing the persistent cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Also list the items each expansion declares.
    #[arg(long)]
    pub index: bool,
}

/// `expanse cache` subcommands.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum CacheAction {
    /// Show what the caches hold.
    Stats {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Open the caches, applying version checks and repairs, and sync them.
    Flush,
    /// Delete all cached expansions, index trees, and names.
    Clear,
}

/// Controls whether colored output is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Detect from terminal capabilities.
    Auto,
    /// Always produce colored output.
    Always,
    /// Never produce colored output.
    Never,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Whether to use colored output.
    pub color: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
    /// Optional cache directory override.
    pub cache_dir: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let color = match cli.color {
        ColorChoice::Auto => std::io::stderr().is_terminal(),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        color,
        config: cli.config,
        cache_dir: cli.cache_dir,
    };
    logging::init(&global);

    let result = match cli.command {
        Command::Expand(ref args) => expand::run(args, &global),
        Command::Cache { ref action } => cache::run(action, &global),
        Command::ProcWorker => worker::run(),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
