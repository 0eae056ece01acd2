#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use mmdb_core::config::{self, StoreConfig};
use mmdb_core::{CloseError, Store, StoreError, timing};
use output::{CliError, OutputMode, render_error};
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "mmdb: an embedded MVCC document store",
    long_about = None
)]
struct Cli {
    /// Database file. Without one the store lives in memory for this run.
    #[arg(short, long, global = true, env = "MMDB_DB")]
    db: Option<PathBuf>,

    /// Config file (default: <config dir>/mmdb/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level, unless `MMDB_LOG` is set.
    #[arg(short, long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    /// Emit command timing report to stderr.
    #[arg(long, global = true)]
    timing: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    const fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    None,
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    const fn directive(self) -> &'static str {
        match self {
            Self::None => "off",
            Self::Error => "mmdb=error,error",
            Self::Warning => "mmdb=warn,warn",
            Self::Info => "mmdb=info,warn",
            Self::Debug => "mmdb=debug,info",
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Write a new revision of a document",
        long_about = "Write a new revision on top of --rev (omit it to create the document). \
                      Prints the new revision.",
        after_help = "EXAMPLES:\n    # Create a document\n    mmdb -d app.db put Doc1 --fields '{\"title\":\"hello\"}'\n\n    # Update it from its current revision\n    mmdb -d app.db put Doc1 --rev 1-5d0c... --fields '{\"title\":\"bye\"}'\n\n    # Keep a stale edit as a conflicting branch\n    mmdb -d app.db put Doc1 --rev 1-5d0c... --allow-conflict"
    )]
    Put(cmd::put::PutArgs),

    #[command(
        about = "Read a document",
        long_about = "Read a document at its winning revision, or at an exact revision with --rev.",
        after_help = "EXAMPLES:\n    # Current revision\n    mmdb -d app.db get Doc1\n\n    # A historical or losing revision\n    mmdb -d app.db get Doc1 --rev 1-5d0c...\n\n    # Emit machine-readable output\n    mmdb -d app.db get Doc1 --json"
    )]
    Get(cmd::get::GetArgs),

    #[command(
        about = "List a document's revisions",
        long_about = "List leaf revisions newest first; more than one means unresolved conflicts.",
        after_help = "EXAMPLES:\n    # Leaves only\n    mmdb -d app.db revs Doc1\n\n    # Full history\n    mmdb -d app.db revs Doc1 --all"
    )]
    Revs(cmd::revs::RevsArgs),

    #[command(
        about = "Run commands read from stdin",
        long_about = "Read one command per line from stdin (put, fork, get, revs, quit) against a \
                      single open store.",
        after_help = "EXAMPLES:\n    printf 'put Doc1 - {\"a\":1}\\nget Doc1\\n' | mmdb shell"
    )]
    Shell,
}

fn init_tracing(level: Option<LogLevel>) {
    let filter = EnvFilter::try_from_env("MMDB_LOG").unwrap_or_else(|_| {
        EnvFilter::new(level.map_or_else(
            || {
                if env::var("DEBUG").is_ok() {
                    "mmdb=debug,info"
                } else {
                    "mmdb=info,warn"
                }
            },
            LogLevel::directive,
        ))
    });

    let format = env::var("MMDB_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(io::stderr))
                .init();
        }
    }
}

fn open_store(db: Option<&Path>, config: &StoreConfig) -> Result<Store, StoreError> {
    match db {
        Some(path) => Store::open_with_config(path, config),
        None => {
            debug!("no database file given; using an in-memory store");
            Store::open_in_memory_with_config(config)
        }
    }
}

fn close_store(store: Store, config: &StoreConfig) -> Result<(), CliError> {
    match store.close_with_retry(&config.close) {
        Ok(()) => Ok(()),
        Err(CloseError::Busy(_)) => {
            error!(attempts = config.close.attempts, "store still busy; giving up on close");
            Err(CliError::with_details(
                "store stayed busy while closing",
                mmdb_core::ErrorCode::Busy.code(),
                mmdb_core::ErrorCode::Busy.hint(),
            ))
        }
        Err(CloseError::Failed(err)) => Err(CliError::from(&err)),
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    let timing_enabled = cli.timing || timing::enabled_from_env();
    timing::set_enabled(timing_enabled);

    let mode = cli.output_mode();

    let config = match config::resolve_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            render_error(mode, &CliError::from(&err))?;
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut store = match open_store(cli.db.as_deref(), &config) {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, "couldn't open database");
            render_error(mode, &CliError::from(&err))?;
            return Ok(ExitCode::FAILURE);
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let command_result = match &cli.command {
        Commands::Put(args) => {
            timing::timed("cmd.put", || cmd::put::run_put(args, &mut store, mode, &mut out))
        }
        Commands::Get(args) => {
            timing::timed("cmd.get", || cmd::get::run_get(args, &store, mode, &mut out))
        }
        Commands::Revs(args) => {
            timing::timed("cmd.revs", || cmd::revs::run_revs(args, &store, mode, &mut out))
        }
        Commands::Shell => timing::timed("cmd.shell", || {
            cmd::shell::run_shell(&mut store, mode, io::stdin().lock(), &mut out).map(|_| ())
        }),
    };
    drop(out);

    let close_result = close_store(store, &config);

    if timing_enabled {
        let report = timing::take_report();
        eprint!("{}", report.render_text());
        eprintln!("{}", serde_json::to_string(&report)?);
    }

    let mut status = ExitCode::SUCCESS;
    if let Err(err) = command_result {
        render_error(mode, &CliError::from(&err))?;
        status = ExitCode::FAILURE;
    }
    if let Err(err) = close_result {
        render_error(mode, &err)?;
        status = ExitCode::FAILURE;
    }
    Ok(status)
}
