//! Speed command - sequential and random throughput plus access time

use super::target::{print_target, resolve};
use super::{finish, parse_block_size, Session, Verdict};
use anyhow::{Context, Result};
use console::style;
use flashcheck_core::{format_size, ComprehensiveResult, SpeedProber, TestType};

/// Arguments for the speed command
pub struct SpeedArgs {
    /// Mount path or label
    pub target: String,
    /// Sequential block size override
    pub block_size: Option<String>,
    /// Trial count override
    pub iterations: Option<u32>,
    /// Leave the test file on the drive
    pub keep_files: bool,
    /// Output in JSON format
    pub json: bool,
    /// Accept any existing directory
    pub unlisted: bool,
}

/// Execute the speed command
pub fn execute(args: SpeedArgs, session: &Session) -> Result<Verdict> {
    let hush = session.hush(args.json);

    let mut config = session.config.clone();
    if let Some(size) = &args.block_size {
        config = config.speed_block_size(parse_block_size(size)?);
    }
    if let Some(iterations) = args.iterations {
        config = config.speed_iterations(iterations);
    }
    if args.keep_files {
        config = config.delete_temp_files(false);
    }
    config.validate().context("Invalid speed test options")?;

    let target = resolve(&args.target, args.unlisted)?;
    print_target(&target, hush);

    println_if!(
        hush,
        "\n{} {} x {} sequential, {} random operations, {} access samples",
        style("Speed test:").bold(),
        config.speed_iterations,
        format_size(config.speed_block_size as u64),
        config.random_ops,
        config.access_samples
    );

    let bars = session.progress();
    let outcome = SpeedProber::new(&target.volume, config)
        .with_cancel(session.cancel.clone())
        .on_progress(bars.callback())
        .run();
    bars.finish();

    let mut result = ComprehensiveResult::new(target.drive.clone(), TestType::Speed);
    result.speed = outcome.keep_noted("Speed test", &mut result.phase_notes);

    finish(session, result, None, None, args.json)
}
