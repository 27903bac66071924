//! Comprehensive command - speed, integrity and capacity in one run

use super::target::{confirm_destructive, print_target, resolve, restoration_tools};
use super::{present, RunOpts, Session, Verdict};
use anyhow::{Context, Result};
use console::style;
use flashcheck_core::{ComprehensiveMode, ComprehensiveRunner};

/// Execute the comprehensive command
pub fn execute(target: &str, detailed: bool, opts: &RunOpts, session: &Session) -> Result<Verdict> {
    let hush = session.hush(opts.json);
    let mode = if detailed {
        ComprehensiveMode::Detailed
    } else {
        ComprehensiveMode::Fast
    };

    let config = session.config_for(opts);
    config.validate().context("Invalid configuration")?;

    let target = resolve(target, opts.unlisted)?;
    print_target(&target, hush);

    let tools = restoration_tools(&target, &config, hush);
    let exporter = session.exporter();

    if !(opts.yes || session.skip_confirm)
        && !confirm_destructive(
            &target.drive,
            &format!("Run the {} test", mode.test_type()),
            tools.is_some(),
        )?
    {
        return Ok(Verdict::Aborted);
    }

    println_if!(
        hush,
        "\n{} speed, integrity, then {} capacity",
        style("Comprehensive test:").bold(),
        mode.capacity_mode()
    );

    let bars = session.progress();
    let mut runner = ComprehensiveRunner::new(&target.volume, config)
        .with_cancel(session.cancel.clone())
        .on_progress(bars.callback());
    if let Some(tools) = &tools {
        runner = runner.with_tools(tools);
    }
    if let Some(exporter) = &exporter {
        runner = runner.with_sink(exporter);
    }

    let run = runner.run(&target.drive, mode);
    bars.finish();

    present(session, &run.result, &run.report_files, opts.json)
}
