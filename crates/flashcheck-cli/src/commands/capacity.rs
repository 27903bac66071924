//! Capacity command - fake-capacity detection

use super::target::{confirm_destructive, print_target, resolve, restoration_tools};
use super::{finish, parse_block_size, RunOpts, Session, Verdict};
use anyhow::{Context, Result};
use console::style;
use flashcheck_core::{
    capture_filesystem, format_size, parse_size, CapacityMode, CapacityPlan, CapacityVerifier,
    ComprehensiveResult, TestConfig, TestType,
};

/// Arguments for the capacity command
pub struct CapacityArgs {
    /// Mount path or label
    pub target: String,
    /// Full mode instead of fast
    pub full: bool,
    /// Block size override for the selected mode
    pub block_size: Option<String>,
    /// Upper bound on bytes written
    pub limit: Option<String>,
    /// Shared run flags
    pub opts: RunOpts,
}

/// Execute the capacity command
pub fn execute(args: CapacityArgs, session: &Session) -> Result<Verdict> {
    let hush = session.hush(args.opts.json);
    let mode = if args.full {
        CapacityMode::Full
    } else {
        CapacityMode::Fast
    };

    let config = capacity_config(session.config_for(&args.opts), mode, &args)?;

    let target = resolve(&args.target, args.opts.unlisted)?;
    print_target(&target, hush);

    let verifier = CapacityVerifier::new(&target.volume, config.clone(), mode);
    let plan = verifier
        .plan()
        .context("Could not determine free space")?;
    print_plan(&plan, hush);

    let tools = restoration_tools(&target, &config, hush);

    if !(args.opts.yes || session.skip_confirm)
        && !confirm_destructive(&target.drive, "Run the capacity test", tools.is_some())?
    {
        return Ok(Verdict::Aborted);
    }

    let filesystem_before = tools
        .as_ref()
        .and_then(|tools| capture_filesystem(tools, &target.drive));

    let bars = session.progress();
    let outcome = verifier
        .with_cancel(session.cancel.clone())
        .on_progress(bars.callback())
        .run();
    bars.finish();

    let mut result = ComprehensiveResult::new(target.drive.clone(), TestType::for_capacity(mode));
    result.capacity = outcome.keep_noted("Capacity test", &mut result.phase_notes);

    finish(
        session,
        result,
        tools.as_ref(),
        filesystem_before,
        args.opts.json,
    )
}

/// Apply block size and limit overrides for `mode`
fn capacity_config(
    mut config: TestConfig,
    mode: CapacityMode,
    args: &CapacityArgs,
) -> Result<TestConfig> {
    if let Some(size) = &args.block_size {
        let size = parse_block_size(size)?;
        config = match mode {
            CapacityMode::Fast => config.fast_block_size(size),
            CapacityMode::Full => config.full_block_size(size),
        };
    }
    if let Some(limit) = &args.limit {
        let limit = parse_size(limit).with_context(|| format!("Invalid limit: {}", limit))?;
        config = config.capacity_size_limit(Some(limit));
    }
    config.validate().context("Invalid capacity test options")?;
    Ok(config)
}

fn print_plan(plan: &CapacityPlan, silent: bool) {
    println_if!(
        silent,
        "\n{} {} mode, {} block(s) of {} ({} of {} free){}",
        style("Capacity test:").bold(),
        plan.mode,
        plan.blocks,
        format_size(plan.block_size),
        format_size(plan.test_size),
        format_size(plan.free_space),
        match plan.mode {
            CapacityMode::Fast => ", verified after writing",
            CapacityMode::Full => ", write only",
        }
    );
}
