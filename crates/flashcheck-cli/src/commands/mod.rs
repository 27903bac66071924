//! CLI command implementations

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use flashcheck_core::report::{render_json, render_text};
use flashcheck_core::{
    parse_size, restore, CancelToken, ComprehensiveResult, FilesystemKind, OverallStatus,
    ReportExporter, ReportSink, Settings, TestConfig,
};
use std::path::PathBuf;

/// Print unless running silently
macro_rules! println_if {
    ($silent:expr) => {
        if !$silent {
            println!();
        }
    };
    ($silent:expr, $($arg:tt)*) => {
        if !$silent {
            println!($($arg)*);
        }
    };
}

pub mod capacity;
pub mod comprehensive;
pub mod config;
pub mod integrity;
pub mod list;
pub mod reports;
pub mod speed;
pub mod target;

use crate::progress::PhaseBars;
use target::SystemDriveTools;

/// Flags shared by the commands that write test data to the drive
#[derive(Args, Debug, Clone, Default)]
pub struct RunOpts {
    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Leave test files on the drive
    #[arg(long)]
    pub keep_files: bool,

    /// Do not reformat the drive after testing
    #[arg(long)]
    pub no_restore: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Accept any existing directory, not only detected drives (disables restoration)
    #[arg(long)]
    pub unlisted: bool,
}

/// How a finished run maps onto the process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every phase that ran passed
    Pass,
    /// Corruption, fake capacity or no usable result
    Fail,
    /// The user cancelled
    Cancelled,
    /// The user declined the confirmation prompt
    Aborted,
}

impl Verdict {
    /// Verdict for a finished run
    pub fn of(result: &ComprehensiveResult) -> Self {
        if result.cancelled {
            Verdict::Cancelled
        } else if result.overall_status() == OverallStatus::Fail {
            Verdict::Fail
        } else {
            Verdict::Pass
        }
    }

    /// Process exit code
    pub fn exit_code(self) -> i32 {
        match self {
            Verdict::Pass | Verdict::Aborted => 0,
            Verdict::Fail => 2,
            Verdict::Cancelled => 130,
        }
    }
}

/// Settings and flags every test command runs with
pub struct Session {
    /// Persistent settings
    pub settings: Settings,
    /// Validated runtime configuration
    pub config: TestConfig,
    /// Print nothing except JSON
    pub silent: bool,
    /// Draw progress bars
    pub show_progress: bool,
    /// Skip confirmation prompts
    pub skip_confirm: bool,
    /// Set by Ctrl+C
    pub cancel: CancelToken,
}

impl Session {
    /// Load settings from `config_file` (or the default location)
    pub fn load(
        config_file: Option<PathBuf>,
        quiet: bool,
        silent: bool,
        cancel: CancelToken,
    ) -> Result<Self> {
        let settings = Settings::load_from_path(config_file.or_else(Settings::config_path));
        let config = settings
            .to_test_config()
            .context("Invalid configuration")?;
        let quiet = quiet || settings.behavior.quiet;

        Ok(Self {
            silent,
            show_progress: !(quiet || silent),
            // --silent implies --yes
            skip_confirm: silent || settings.behavior.skip_confirmation,
            settings,
            config,
            cancel,
        })
    }

    /// Runtime configuration with per-run flags applied
    pub fn config_for(&self, opts: &RunOpts) -> TestConfig {
        let mut config = self.config.clone();
        if opts.keep_files {
            config = config.delete_temp_files(false);
        }
        if opts.no_restore {
            config = config.restore_after_test(false);
        }
        config
    }

    /// Report exporter, unless reports are disabled
    pub fn exporter(&self) -> Option<ReportExporter> {
        if !self.settings.report.enabled {
            return None;
        }
        self.settings.report_dir().map(ReportExporter::new)
    }

    /// Progress bars for a run
    pub fn progress(&self) -> PhaseBars {
        PhaseBars::new(!self.show_progress)
    }

    /// Whether human-readable output should be suppressed
    pub fn hush(&self, json: bool) -> bool {
        self.silent || json
    }
}

/// Parse a size argument such as `4M` into a byte count that fits in memory
pub fn parse_block_size(value: &str) -> Result<usize> {
    let bytes = parse_size(value).with_context(|| format!("Invalid size: {}", value))?;
    usize::try_from(bytes).with_context(|| format!("Size too large: {}", value))
}

/// Export, restore and print a standalone run.
///
/// Reports are written and the drive restored only when the run was not
/// cancelled; restoration also requires a destructive phase to have
/// produced a result.
pub fn finish(
    session: &Session,
    mut result: ComprehensiveResult,
    tools: Option<&SystemDriveTools>,
    filesystem_before: Option<FilesystemKind>,
    json: bool,
) -> Result<Verdict> {
    result.cancelled = session.cancel.is_cancelled();
    let mut report_files = Vec::new();

    if result.cancelled {
        tracing::warn!("Run cancelled; skipping report export and restoration");
    } else {
        if let Some(exporter) = session.exporter() {
            match exporter.export(&result) {
                Ok(files) => report_files = files,
                Err(e) => {
                    tracing::warn!("Could not export report: {}", e);
                    result.phase_notes.push(format!("Report export failed: {}", e));
                }
            }
        }

        let destructive_ran = result.integrity.is_some() || result.capacity.is_some();
        if let Some(tools) = tools.filter(|_| destructive_ran) {
            println_if!(session.hush(json), "\n{}", style("Restoring drive...").bold());
            result.restoration = Some(restore(tools, &result.drive, filesystem_before.as_ref()));
        }
    }

    present(session, &result, &report_files, json)
}

/// Print a finished run and work out its verdict
pub fn present(
    session: &Session,
    result: &ComprehensiveResult,
    report_files: &[PathBuf],
    json: bool,
) -> Result<Verdict> {
    let verdict = Verdict::of(result);

    // JSON output mode - always output even in silent mode (it's machine-readable)
    if json {
        println!("{}", render_json(result)?);
        return Ok(verdict);
    }

    if session.silent {
        return Ok(verdict);
    }

    println!();
    print!("{}", render_text(result));
    println!();

    let status = match verdict {
        Verdict::Pass => style("PASS").green().bold(),
        Verdict::Fail => style("FAIL").red().bold(),
        Verdict::Cancelled | Verdict::Aborted => style("CANCELLED").yellow().bold(),
    };
    println!("{} {}", style("Result:").bold(), status);

    for path in report_files {
        println!("  {} {}", style("Report:").dim(), path.display());
    }

    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashcheck_core::{DigestAlgorithm, DriveDescriptor, IntegrityResult, TestType};
    use std::time::Duration;

    fn result() -> ComprehensiveResult {
        ComprehensiveResult::new(DriveDescriptor::new("/media/test/USB"), TestType::Integrity)
    }

    fn integrity(failed: u32) -> IntegrityResult {
        IntegrityResult {
            patterns_tested: 5,
            files_created: 15,
            verification_passed: 15 - failed,
            verification_failed: failed,
            error_messages: Vec::new(),
            file_size: 1024 * 1024,
            digest_algorithm: DigestAlgorithm::Sha256,
            elapsed: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_verdict_of_empty_run_is_fail() {
        assert_eq!(Verdict::of(&result()), Verdict::Fail);
    }

    #[test]
    fn test_verdict_of_clean_run() {
        let mut result = result();
        result.integrity = Some(integrity(0));
        assert_eq!(Verdict::of(&result), Verdict::Pass);
        assert_eq!(Verdict::Pass.exit_code(), 0);
    }

    #[test]
    fn test_verdict_of_corrupt_run() {
        let mut result = result();
        result.integrity = Some(integrity(2));
        assert_eq!(Verdict::of(&result), Verdict::Fail);
        assert_eq!(Verdict::Fail.exit_code(), 2);
    }

    #[test]
    fn test_verdict_cancelled_wins() {
        let mut result = result();
        result.integrity = Some(integrity(2));
        result.cancelled = true;
        assert_eq!(Verdict::of(&result), Verdict::Cancelled);
        assert_eq!(Verdict::Cancelled.exit_code(), 130);
    }

    #[test]
    fn test_parse_block_size() {
        assert_eq!(parse_block_size("4M").unwrap(), 4 * 1024 * 1024);
        assert_eq!(parse_block_size("512K").unwrap(), 512 * 1024);
        assert!(parse_block_size("lots").is_err());
    }

    #[test]
    fn test_config_for_applies_flags() {
        let session = Session {
            settings: Settings::default(),
            config: TestConfig::default(),
            silent: true,
            show_progress: false,
            skip_confirm: true,
            cancel: CancelToken::new(),
        };
        let opts = RunOpts {
            keep_files: true,
            no_restore: true,
            ..RunOpts::default()
        };

        let config = session.config_for(&opts);
        assert!(!config.delete_temp_files);
        assert!(!config.restore_after_test);

        let config = session.config_for(&RunOpts::default());
        assert!(config.delete_temp_files);
        assert!(config.restore_after_test);
    }
}
