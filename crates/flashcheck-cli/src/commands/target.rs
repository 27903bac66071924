//! Resolving the drive to test, and the system tooling used to restore it

use anyhow::{bail, Context, Result};
use console::style;
use dialoguer::Confirm;
use flashcheck_core::{
    format_size, DriveDescriptor, DriveTools, FilesystemKind, TestConfig, Volume,
};
use flashcheck_detect::SYSTEM_MOUNT_POINTS;
use flashcheck_platform::{FormatRequest, MountedVolume};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// How often to retry a volume that is not yet writable after mounting
const ACCESS_ATTEMPTS: u32 = 5;
const ACCESS_DELAY: Duration = Duration::from_millis(500);

/// A drive ready to be tested
#[derive(Debug)]
pub struct Target {
    /// Scan snapshot (or a bare descriptor for unlisted directories)
    pub drive: DriveDescriptor,
    /// The mounted filesystem
    pub volume: MountedVolume,
    /// Whether the target came from drive detection
    pub listed: bool,
}

/// Find `target` among the detected removable drives.
///
/// With `unlisted`, any existing directory that is not itself a system
/// mount point is accepted when detection does not know it.
pub fn resolve(target: &str, unlisted: bool) -> Result<Target> {
    match flashcheck_detect::find_drive(target) {
        Ok(drive) => {
            let volume = wait_for_access(&drive.mount_path, ACCESS_ATTEMPTS, ACCESS_DELAY)?;
            Ok(Target {
                drive,
                volume,
                listed: true,
            })
        }
        Err(e) if unlisted => {
            tracing::debug!("{} not detected ({}); using it as a plain directory", target, e);
            let path = PathBuf::from(target);
            if is_system_root(&path) {
                bail!("Refusing to test system location {}", path.display());
            }
            let volume = wait_for_access(&path, ACCESS_ATTEMPTS, ACCESS_DELAY)?;
            let total_bytes = volume.free_space().unwrap_or(0);
            Ok(Target {
                drive: DriveDescriptor::new(path).with_total_bytes(total_bytes),
                volume,
                listed: false,
            })
        }
        Err(e) => Err(e).with_context(|| {
            format!(
                "{} is not a detected removable drive. Run 'flashcheck list' to see \
                 available drives, or pass --unlisted to test any directory",
                target
            )
        }),
    }
}

/// Whether `path` is exactly one of the system mount points
fn is_system_root(path: &Path) -> bool {
    let path = path.to_string_lossy();
    let path = trim_separators(&path);
    SYSTEM_MOUNT_POINTS
        .iter()
        .any(|system| trim_separators(system).eq_ignore_ascii_case(path))
}

fn trim_separators(path: &str) -> &str {
    match path.trim_end_matches(['/', '\\']) {
        "" => "/",
        trimmed => trimmed,
    }
}

/// Open the volume at `path`, retrying while a freshly mounted drive settles
pub fn wait_for_access(path: &Path, attempts: u32, delay: Duration) -> Result<MountedVolume> {
    let mut last_error = None;

    for attempt in 1..=attempts.max(1) {
        match MountedVolume::open(path).and_then(|volume| volume.free_space().map(|_| volume)) {
            Ok(volume) => return Ok(volume),
            Err(e) => {
                tracing::debug!(
                    "{} not accessible (attempt {}/{}): {}",
                    path.display(),
                    attempt,
                    attempts,
                    e
                );
                last_error = Some(e);
                if attempt < attempts {
                    thread::sleep(delay);
                }
            }
        }
    }

    match last_error {
        Some(e) => Err(e).with_context(|| format!("Cannot access {}", path.display())),
        None => bail!("Cannot access {}", path.display()),
    }
}

/// Warn about data loss and ask before a destructive run.
///
/// Returns `false` when the user declines.
pub fn confirm_destructive(drive: &DriveDescriptor, action: &str, restore: bool) -> Result<bool> {
    println!();
    println!(
        "{}",
        style("╔════════════════════════════════════════════════════════════╗")
            .red()
            .bold()
    );
    println!(
        "{}",
        style("║                        WARNING                             ║")
            .red()
            .bold()
    );
    if restore {
        println!(
            "{}",
            style("║  THE DRIVE WILL BE REFORMATTED. ALL DATA WILL BE LOST!     ║")
                .red()
                .bold()
        );
    } else {
        println!(
            "{}",
            style("║  TEST DATA WILL FILL THE DRIVE. BACK UP YOUR FILES FIRST!  ║")
                .red()
                .bold()
        );
    }
    println!(
        "{}",
        style("╚════════════════════════════════════════════════════════════╝")
            .red()
            .bold()
    );
    println!();

    let prompt = format!(
        "{} on {} ({})?",
        action,
        drive.display_label,
        drive.mount_path.display()
    );

    let proceed = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("Confirmation needs an interactive terminal; pass --yes to skip it")?;

    if !proceed {
        println!("{}", style("Aborted.").yellow());
    }
    Ok(proceed)
}

/// Print what is about to be tested
pub fn print_target(target: &Target, silent: bool) {
    if silent {
        return;
    }

    let drive = &target.drive;
    println!(
        "{} {} {}",
        style("Target:").bold(),
        style(&drive.display_label).white().bold(),
        style(drive.mount_path.display()).dim()
    );

    let mut details = Vec::new();
    if drive.total_bytes > 0 {
        details.push(format_size(drive.total_bytes));
    }
    if let Some(fs) = &drive.filesystem_kind {
        details.push(fs.to_string());
    }
    if let Some(model) = &drive.model {
        details.push(model.clone());
    }
    if !details.is_empty() {
        println!("    {}", style(details.join(", ")).dim());
    }
    if !target.listed {
        println!(
            "    {} not a detected removable drive; restoration disabled",
            style("⚠").yellow()
        );
    }
}

/// Tools for restoring `target` after a destructive run, or `None` when
/// restoration is off or impossible
pub fn restoration_tools(
    target: &Target,
    config: &TestConfig,
    silent: bool,
) -> Option<SystemDriveTools> {
    if !config.restore_after_test || !target.listed {
        return None;
    }

    if !flashcheck_platform::has_elevated_privileges() {
        tracing::warn!("Not running with elevated privileges; restoration skipped");
        if !silent {
            println!(
                "    {} Reformatting needs elevated privileges; the drive will be left as tested",
                style("⚠").yellow()
            );
        }
        return None;
    }

    Some(SystemDriveTools::new(config.format_timeout))
}

// ============================================================================
// DriveTools on the host system
// ============================================================================

/// [`DriveTools`] backed by drive detection and the platform formatter
#[derive(Debug, Clone)]
pub struct SystemDriveTools {
    timeout: Duration,
}

impl SystemDriveTools {
    /// Format commands are killed after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl DriveTools for SystemDriveTools {
    fn scan(&self) -> flashcheck_core::Result<Vec<DriveDescriptor>> {
        Ok(flashcheck_detect::list_drives()?)
    }

    fn filesystem_of(&self, mount: &Path) -> flashcheck_core::Result<FilesystemKind> {
        Ok(flashcheck_detect::filesystem_of(mount)?)
    }

    fn format(
        &self,
        mount: &Path,
        filesystem: &FilesystemKind,
        label: &str,
    ) -> flashcheck_core::Result<()> {
        let mut request =
            FormatRequest::new(mount, filesystem.clone(), label).with_timeout(self.timeout);

        // Rescan so the block device is current even if the drive was replugged
        let device = self
            .scan()?
            .into_iter()
            .find(|drive| drive.mount_path == mount)
            .and_then(|drive| drive.device_path);
        if let Some(device) = device {
            request = request.with_device(device);
        }

        Ok(flashcheck_platform::format_volume(&request)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_wait_for_access_existing_dir() {
        let temp = TempDir::new().unwrap();
        let volume = wait_for_access(temp.path(), 1, Duration::ZERO).unwrap();
        assert_eq!(volume.root(), temp.path());
    }

    #[test]
    fn test_wait_for_access_gives_up() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("not-mounted");
        let err = wait_for_access(&missing, 3, Duration::ZERO).unwrap_err();
        assert!(err.to_string().contains("Cannot access"));
    }

    #[test]
    fn test_resolve_unlisted_directory() {
        let temp = TempDir::new().unwrap();
        let target = resolve(&temp.path().to_string_lossy(), true).unwrap();
        assert!(!target.listed);
        assert_eq!(target.drive.mount_path, temp.path());
    }

    #[test]
    fn test_resolve_unknown_target_without_unlisted() {
        let temp = TempDir::new().unwrap();
        let err = resolve(&temp.path().to_string_lossy(), false).unwrap_err();
        assert!(format!("{:#}", err).contains("--unlisted"));
    }

    #[test]
    fn test_system_roots_refused() {
        assert!(is_system_root(Path::new("/")));
        assert!(is_system_root(Path::new("/home/")));
        assert!(!is_system_root(Path::new("/home/alex/scratch")));
        assert!(!is_system_root(Path::new("/media/alex/USB")));
    }

    #[test]
    fn test_restoration_off_for_unlisted_targets() {
        let temp = TempDir::new().unwrap();
        let target = resolve(&temp.path().to_string_lossy(), true).unwrap();
        assert!(restoration_tools(&target, &TestConfig::default(), true).is_none());
    }
}
