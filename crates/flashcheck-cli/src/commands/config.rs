//! Configuration file management command

use anyhow::{Context, Result};
use console::style;
use flashcheck_core::Settings;
use std::path::PathBuf;

/// Arguments for the config command
pub struct ConfigArgs {
    /// Initialize a new configuration file with defaults
    pub init: bool,
    /// Show the path to the configuration file
    pub path: bool,
    /// Show configuration in JSON format
    pub json: bool,
    /// Suppress output (for scripting)
    pub silent: bool,
    /// Custom configuration file path (overrides default)
    pub config_file: Option<PathBuf>,
}

/// Execute the config command
pub fn execute(args: ConfigArgs) -> Result<()> {
    // Determine the effective config path
    let config_path = args.config_file.clone().or_else(Settings::config_path);

    // Handle --path flag
    if args.path {
        if let Some(path) = &config_path {
            if !args.silent {
                println!("{}", path.display());
            }
        } else if !args.silent {
            eprintln!("{}", style("Could not determine config path").yellow());
        }
        return Ok(());
    }

    // Handle --init flag
    if args.init {
        return init_config(config_path, args.silent);
    }

    // Default: show current configuration
    show_config(config_path, args.json, args.silent)
}

/// Initialize a new configuration file with default values
fn init_config(config_path: Option<PathBuf>, silent: bool) -> Result<()> {
    let path = config_path.context("Could not determine configuration directory")?;

    if path.exists() {
        if !silent {
            eprintln!(
                "{} Configuration file already exists at: {}",
                style("Warning:").yellow(),
                path.display()
            );
            eprintln!("Use a text editor to modify it, or delete it to re-initialize.");
        }
        return Ok(());
    }

    let saved_path = Settings::default()
        .save_to_path(Some(path))
        .context("Failed to save configuration file")?;

    if !silent {
        println!(
            "{} Created configuration file at: {}",
            style("Success:").green(),
            saved_path.display()
        );
        println!();
        println!("You can edit this file to customize default settings.");
        println!("Example settings:");
        println!();
        println!("  [speed]");
        println!("  block_size = \"4M\"       # Sequential trial size");
        println!();
        println!("  [capacity]");
        println!("  fast_max_size = \"2G\"    # Upper bound for the fast check");
        println!();
        println!("  [behavior]");
        println!("  restore_after_test = false");
    }

    Ok(())
}

/// Show the current configuration
fn show_config(config_path: Option<PathBuf>, json: bool, silent: bool) -> Result<()> {
    if silent {
        return Ok(());
    }

    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let settings = Settings::load_from_path(config_path.clone());

    if json {
        // Output as JSON for scripting
        let json_output = serde_json::to_string_pretty(&settings)
            .context("Failed to serialize settings to JSON")?;
        println!("{}", json_output);
        return Ok(());
    }

    println!("{}", style("Flashcheck Configuration").bold());
    println!();

    if let Some(path) = &config_path {
        if config_exists {
            println!("  {} {}", style("Config file:").dim(), path.display());
        } else {
            println!(
                "  {} {} {}",
                style("Config file:").dim(),
                path.display(),
                style("(not found, using defaults)").yellow()
            );
        }
    }
    println!();

    println!("{}", style("[speed]").cyan());
    println!("  block_size = \"{}\"", settings.speed.block_size);
    println!("  iterations = {}", settings.speed.iterations);
    println!("  trial_pause_ms = {}", settings.speed.trial_pause_ms);
    println!("  random_ops = {}", settings.speed.random_ops);
    println!("  access_samples = {}", settings.speed.access_samples);
    println!();

    println!("{}", style("[integrity]").cyan());
    println!("  file_size = \"{}\"", settings.integrity.file_size);
    println!("  files_per_pattern = {}", settings.integrity.files_per_pattern);
    println!("  patterns = {:?}", settings.integrity.patterns);
    println!("  algorithm = \"{}\"", settings.integrity.algorithm);
    println!();

    println!("{}", style("[capacity]").cyan());
    println!("  fast_block_size = \"{}\"", settings.capacity.fast_block_size);
    println!("  full_block_size = \"{}\"", settings.capacity.full_block_size);
    println!("  fast_max_size = \"{}\"", settings.capacity.fast_max_size);
    println!("  fast_fraction = {}", settings.capacity.fast_fraction);
    println!("  full_fraction = {}", settings.capacity.full_fraction);
    println!("  sync_interval = \"{}\"", settings.capacity.sync_interval);
    println!();

    println!("{}", style("[behavior]").cyan());
    println!(
        "  skip_confirmation = {}",
        settings.behavior.skip_confirmation
    );
    println!("  quiet = {}", settings.behavior.quiet);
    println!("  delete_temp_files = {}", settings.behavior.delete_temp_files);
    println!(
        "  restore_after_test = {}",
        settings.behavior.restore_after_test
    );
    println!(
        "  format_timeout_secs = {}",
        settings.behavior.format_timeout_secs
    );
    println!();

    println!("{}", style("[report]").cyan());
    println!("  enabled = {}", settings.report.enabled);
    match settings.report_dir() {
        Some(dir) if settings.report.directory.is_some() => {
            println!("  directory = \"{}\"", dir.display());
        }
        Some(dir) => println!(
            "  # directory = \"{}\" {}",
            dir.display(),
            style("(default)").dim()
        ),
        None => {}
    }

    if let Err(e) = settings.to_test_config() {
        println!();
        println!("{} {}", style("Invalid:").red().bold(), e);
    }

    if !config_exists {
        println!();
        println!(
            "{}",
            style("Run 'flashcheck config --init' to create a configuration file.").dim()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(dir: &TempDir) -> ConfigArgs {
        ConfigArgs {
            init: false,
            path: false,
            json: false,
            silent: true,
            config_file: Some(dir.path().join("flashcheck_config.toml")),
        }
    }

    #[test]
    fn test_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flashcheck_config.toml");

        execute(ConfigArgs {
            init: true,
            ..args(&dir)
        })
        .unwrap();

        assert!(path.exists());
        let loaded = Settings::load_from_path(Some(path));
        assert_eq!(loaded.speed.block_size, Settings::default().speed.block_size);
    }

    #[test]
    fn test_init_keeps_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flashcheck_config.toml");
        std::fs::write(&path, "[speed]\niterations = 9\n").unwrap();

        execute(ConfigArgs {
            init: true,
            ..args(&dir)
        })
        .unwrap();

        let loaded = Settings::load_from_path(Some(path));
        assert_eq!(loaded.speed.iterations, 9);
    }

    #[test]
    fn test_show_and_path_succeed_without_file() {
        let dir = TempDir::new().unwrap();
        execute(args(&dir)).unwrap();
        execute(ConfigArgs {
            path: true,
            ..args(&dir)
        })
        .unwrap();
        assert!(!dir.path().join("flashcheck_config.toml").exists());
    }
}
