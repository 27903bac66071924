//! Integrity command - pattern files written, read back and compared by digest

use super::target::{confirm_destructive, print_target, resolve, restoration_tools};
use super::{finish, parse_block_size, RunOpts, Session, Verdict};
use anyhow::{Context, Result};
use console::style;
use flashcheck_core::{
    capture_filesystem, format_size, ComprehensiveResult, IntegrityVerifier, TestType,
};

/// Execute the integrity command
pub fn execute(
    target: &str,
    file_size: Option<&str>,
    opts: &RunOpts,
    session: &Session,
) -> Result<Verdict> {
    let hush = session.hush(opts.json);

    let mut config = session.config_for(opts);
    if let Some(size) = file_size {
        config = config.integrity_file_size(parse_block_size(size)?);
    }
    config.validate().context("Invalid integrity test options")?;

    let target = resolve(target, opts.unlisted)?;
    print_target(&target, hush);

    let tools = restoration_tools(&target, &config, hush);

    if !(opts.yes || session.skip_confirm)
        && !confirm_destructive(&target.drive, "Run the integrity test", tools.is_some())?
    {
        return Ok(Verdict::Aborted);
    }

    let filesystem_before = tools
        .as_ref()
        .and_then(|tools| capture_filesystem(tools, &target.drive));

    println_if!(
        hush,
        "\n{} {} pattern(s) x {} file(s) of {}, {} digests",
        style("Integrity test:").bold(),
        config.patterns.len(),
        config.files_per_pattern,
        format_size(config.integrity_file_size as u64),
        config.digest_algorithm
    );

    let bars = session.progress();
    let outcome = IntegrityVerifier::new(&target.volume, config)
        .with_cancel(session.cancel.clone())
        .on_progress(bars.callback())
        .run();
    bars.finish();

    let mut result = ComprehensiveResult::new(target.drive.clone(), TestType::Integrity);
    result.integrity = outcome.keep_noted("Integrity test", &mut result.phase_notes);

    finish(
        session,
        result,
        tools.as_ref(),
        filesystem_before,
        opts.json,
    )
}
