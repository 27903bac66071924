//! Flashcheck - speed, integrity and fake-capacity tests for removable drives
//!
//! # Usage
//!
//! ```bash
//! # List removable drives
//! flashcheck list
//!
//! # Measure read/write speed
//! flashcheck speed /media/user/USB
//!
//! # Check whether a drive really holds what it claims
//! flashcheck capacity /media/user/USB --full
//!
//! # Everything, with reports written to the reports directory
//! flashcheck comprehensive /media/user/USB --detailed
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use clap_mangen::Man;
use console::style;
use flashcheck_core::CancelToken;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod progress;

use commands::{RunOpts, Session, Verdict};

/// Flashcheck - speed, integrity and fake-capacity tests for USB drives and SD cards
#[derive(Parser)]
#[command(name = "flashcheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress log output and progress bars
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Suppress ALL output except JSON (implies --quiet and --yes)
    #[arg(long, global = true)]
    silent: bool,

    /// Configuration file to use instead of the default location
    #[arg(long, global = true, value_name = "FILE", env = "FLASHCHECK_CONFIG")]
    config: Option<PathBuf>,

    /// Append a timestamped session log to FILE
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List removable drives
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Measure sequential and random read/write speed
    Speed {
        /// Mount path or label of the drive
        target: String,

        /// Block size for sequential trials (e.g. 10M, 4M, 512K)
        #[arg(short, long)]
        block_size: Option<String>,

        /// Number of sequential trials
        #[arg(short, long)]
        iterations: Option<u32>,

        /// Keep the speed test file on the drive
        #[arg(long)]
        keep_files: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Accept any existing directory, not only detected drives
        #[arg(long)]
        unlisted: bool,
    },

    /// Write pattern files and verify them by digest
    Integrity {
        /// Mount path or label of the drive
        target: String,

        /// Size of each pattern file (e.g. 1M, 16M)
        #[arg(short, long)]
        file_size: Option<String>,

        #[command(flatten)]
        opts: RunOpts,
    },

    /// Fill the drive with numbered blocks to detect fake capacity
    Capacity {
        /// Mount path or label of the drive
        target: String,

        /// Write 90% of free space in large blocks (no verify pass)
        #[arg(long)]
        full: bool,

        /// Block size (e.g. 1M, 100M)
        #[arg(short, long)]
        block_size: Option<String>,

        /// Never test more than SIZE bytes (e.g. 2G)
        #[arg(long, value_name = "SIZE")]
        limit: Option<String>,

        #[command(flatten)]
        opts: RunOpts,
    },

    /// Speed, integrity and capacity in one run
    Comprehensive {
        /// Mount path or label of the drive
        target: String,

        /// Use the full capacity test instead of the fast one
        #[arg(long)]
        detailed: bool,

        #[command(flatten)]
        opts: RunOpts,
    },

    /// List saved test reports
    Reports,

    /// Manage configuration file
    Config {
        /// Initialize a new configuration file with defaults
        #[arg(long)]
        init: bool,

        /// Show the path to the configuration file
        #[arg(long)]
        path: bool,

        /// Show configuration in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Generate man pages
    Mangen {
        /// Output directory for man pages
        #[arg(short, long, default_value = ".")]
        out_dir: String,
    },
}

fn main() {
    // Set up panic handler for nicer error messages
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{} {}", style("Error:").red().bold(), panic_info);
    }));

    match run() {
        Ok(Verdict::Pass) => {}
        Ok(verdict) => std::process::exit(verdict.exit_code()),
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);

            // Show cause chain in verbose mode
            if std::env::var("RUST_BACKTRACE").is_ok() {
                let mut source = e.source();
                while let Some(cause) = source {
                    eprintln!("  {} {}", style("Caused by:").yellow(), cause);
                    source = cause.source();
                }
            }

            std::process::exit(1);
        }
    }
}

fn run() -> Result<Verdict> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet || cli.silent, cli.log_file.as_deref())?;

    // --silent implies --yes (skip confirmations)
    let silent = cli.silent;

    // Set up Ctrl+C handler (suppress messages in silent mode)
    let cancel = CancelToken::new();
    let flag = cancel.flag();
    ctrlc::set_handler(move || {
        if flag.load(Ordering::SeqCst) {
            // Second Ctrl+C, force exit
            if !silent {
                eprintln!("\n{}", style("Forced exit").red().bold());
            }
            std::process::exit(130);
        }
        flag.store(true, Ordering::SeqCst);
        if !silent {
            eprintln!(
                "\n{}",
                style("Cancelling... Press Ctrl+C again to force exit").yellow()
            );
        }
    })?;

    let config_file = cli.config;
    let quiet = cli.quiet;
    let session = || Session::load(config_file.clone(), quiet, silent, cancel.clone());

    match cli.command {
        Commands::List { json } => commands::list::execute(json, silent).map(|()| Verdict::Pass),
        Commands::Speed {
            target,
            block_size,
            iterations,
            keep_files,
            json,
            unlisted,
        } => commands::speed::execute(
            commands::speed::SpeedArgs {
                target,
                block_size,
                iterations,
                keep_files,
                json,
                unlisted,
            },
            &session()?,
        ),
        Commands::Integrity {
            target,
            file_size,
            opts,
        } => commands::integrity::execute(&target, file_size.as_deref(), &opts, &session()?),
        Commands::Capacity {
            target,
            full,
            block_size,
            limit,
            opts,
        } => commands::capacity::execute(
            commands::capacity::CapacityArgs {
                target,
                full,
                block_size,
                limit,
                opts,
            },
            &session()?,
        ),
        Commands::Comprehensive {
            target,
            detailed,
            opts,
        } => commands::comprehensive::execute(&target, detailed, &opts, &session()?),
        Commands::Reports => {
            commands::reports::execute(config_file.clone(), silent).map(|()| Verdict::Pass)
        }
        Commands::Config { init, path, json } => {
            commands::config::execute(commands::config::ConfigArgs {
                init,
                path,
                json,
                silent,
                config_file: config_file.clone(),
            })
            .map(|()| Verdict::Pass)
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(Verdict::Pass)
        }
        Commands::Mangen { out_dir } => {
            generate_man_pages(&out_dir, silent)?;
            Ok(Verdict::Pass)
        }
    }
}

/// Console logging per verbosity, plus an optional session log file
fn init_logging(verbose: bool, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    // --silent implies --quiet (no logs at all, not even errors to tracing)
    let filter = if verbose {
        EnvFilter::new("debug")
    } else if quiet {
        EnvFilter::new("off")
    } else {
        EnvFilter::new("info")
    };

    let console = fmt::layer()
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .with_filter(filter);

    let session_log = log_file
        .map(|path| -> Result<_> {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Ok(fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(EnvFilter::new("debug")))
        })
        .transpose()?;

    tracing_subscriber::registry()
        .with(console)
        .with(session_log)
        .init();

    Ok(())
}

fn generate_man_pages(out_dir: &str, silent: bool) -> Result<()> {
    let cmd = Cli::command();
    let out_path = Path::new(out_dir);
    std::fs::create_dir_all(out_path)?;

    // Generate main man page
    let man = Man::new(cmd.clone());
    let mut buffer = Vec::new();
    man.render(&mut buffer)?;
    std::fs::write(out_path.join("flashcheck.1"), buffer)?;
    if !silent {
        println!("Generated: {}/flashcheck.1", out_dir);
    }

    // Generate man pages for subcommands
    for subcommand in cmd.get_subcommands() {
        let name = subcommand.get_name();
        // Skip hidden commands and meta commands
        if subcommand.is_hide_set() || name == "completions" || name == "mangen" || name == "help"
        {
            continue;
        }

        let man = Man::new(subcommand.clone());
        let mut buffer = Vec::new();
        man.render(&mut buffer)?;
        let filename = format!("flashcheck-{}.1", name);
        std::fs::write(out_path.join(&filename), buffer)?;
        if !silent {
            println!("Generated: {}/{}", out_dir, filename);
        }
    }

    if !silent {
        println!(
            "\nInstall with: sudo cp {}/*.1 /usr/local/share/man/man1/",
            out_dir
        );
    }
    Ok(())
}
