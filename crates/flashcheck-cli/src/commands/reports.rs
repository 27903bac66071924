//! Reports command - lists saved test reports

use anyhow::{Context, Result};
use console::style;
use flashcheck_core::{list_reports, Settings};
use std::path::PathBuf;

/// Execute the reports command
pub fn execute(config_file: Option<PathBuf>, silent: bool) -> Result<()> {
    let settings = Settings::load_from_path(config_file.or_else(Settings::config_path));
    let dir = settings
        .report_dir()
        .context("Could not determine the reports directory")?;
    let reports = list_reports(&dir).context("Failed to read the reports directory")?;

    if silent {
        return Ok(());
    }

    if reports.is_empty() {
        println!("No reports in {}", dir.display());
        if !settings.report.enabled {
            println!(
                "{}",
                style("Tip: Reports are disabled; set enabled = true under [report]").dim()
            );
        }
        return Ok(());
    }

    println!(
        "{} {} report file(s) in {}:\n",
        style("Found").green().bold(),
        reports.len(),
        dir.display()
    );
    for path in &reports {
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        println!("  {}", name);
    }

    Ok(())
}
