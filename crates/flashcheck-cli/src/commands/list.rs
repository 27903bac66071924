//! List command - displays removable drives

use anyhow::{Context, Result};
use console::style;
use flashcheck_core::{format_size, DriveDescriptor};

/// Execute the list command
pub fn execute(json: bool, silent: bool) -> Result<()> {
    let drives = flashcheck_detect::list_drives().context("Failed to list drives")?;

    // JSON output mode - always output even in silent mode (it's machine-readable)
    if json {
        let output =
            serde_json::to_string_pretty(&drives).context("Failed to serialize drive list")?;
        println!("{}", output);
        return Ok(());
    }

    // Silent mode - no human-readable output
    if silent {
        return Ok(());
    }

    if drives.is_empty() {
        println!("No removable drives found.");
        println!(
            "{}",
            style("Tip: Insert a USB drive or SD card and make sure it is mounted").dim()
        );
        return Ok(());
    }

    println!(
        "{} {} drive(s):\n",
        style("Found").green().bold(),
        drives.len()
    );

    for drive in &drives {
        print_drive(drive);
    }

    Ok(())
}

/// Print a single drive's information
fn print_drive(drive: &DriveDescriptor) {
    let filesystem = drive
        .filesystem_kind
        .as_ref()
        .map_or_else(|| "unknown".to_string(), ToString::to_string);

    println!(
        "{} {} {} ({}, {}, {})",
        style("✓").green().bold(),
        style(drive.mount_path.display()).white().bold(),
        style(&drive.display_label).white(),
        format_size(drive.total_bytes),
        filesystem,
        style(drive.interface_kind.to_string()).cyan()
    );

    if let Some(model) = &drive.model {
        println!("    Model: {}", style(model).dim());
    }
    if let Some(serial) = &drive.serial {
        println!("    Serial: {}", style(serial).dim());
    }
    if let Some(device) = &drive.device_path {
        println!("    Device: {}", style(device).dim());
    }
    println!();
}
