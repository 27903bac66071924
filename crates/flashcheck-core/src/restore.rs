//! Restoration after destructive testing.
//!
//! Integrity and capacity runs fill the drive with test data. Afterwards the
//! drive is reformatted with the filesystem it had before testing and its
//! original label. Restoration is best effort: a failed format is reported
//! in the [`RestorationOutcome`] and logged, never returned as an error.

use crate::drive::{DriveDescriptor, FilesystemKind};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Platform drive tooling the engine consumes
pub trait DriveTools: Send + Sync {
    /// Enumerate mounted removable drives
    fn scan(&self) -> Result<Vec<DriveDescriptor>>;

    /// Filesystem currently on the volume mounted at `mount`
    fn filesystem_of(&self, mount: &Path) -> Result<FilesystemKind>;

    /// Reformat the volume mounted at `mount`, leaving it mounted again
    fn format(&self, mount: &Path, filesystem: &FilesystemKind, label: &str) -> Result<()>;
}

/// What the restoration step did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorationOutcome {
    /// Filesystem the drive was formatted with
    pub filesystem: FilesystemKind,
    /// Label applied
    pub label: String,
    /// Whether the format succeeded
    pub succeeded: bool,
    /// Human readable summary, including recovery advice on failure
    pub message: String,
}

/// Record the drive's filesystem before any destructive phase runs.
///
/// Falls back to the filesystem in the scan snapshot when the live query
/// fails.
pub fn capture_filesystem(
    tools: &dyn DriveTools,
    drive: &DriveDescriptor,
) -> Option<FilesystemKind> {
    match tools.filesystem_of(&drive.mount_path) {
        Ok(fs) => {
            tracing::debug!("{} has filesystem {}", drive.mount_path.display(), fs);
            Some(fs)
        }
        Err(e) => {
            tracing::warn!(
                "Could not detect filesystem on {}: {}",
                drive.mount_path.display(),
                e
            );
            drive.filesystem_kind.clone()
        }
    }
}

/// Pick the filesystem to restore: the pre-test one, then the snapshot's,
/// then FAT32. Candidates this host cannot create are skipped.
pub fn restore_filesystem(
    drive: &DriveDescriptor,
    before: Option<&FilesystemKind>,
) -> FilesystemKind {
    restore_filesystem_on(drive, before, std::env::consts::OS)
}

/// [`restore_filesystem`] for an explicit host OS
pub fn restore_filesystem_on(
    drive: &DriveDescriptor,
    before: Option<&FilesystemKind>,
    os: &str,
) -> FilesystemKind {
    let usable = |fs: &&FilesystemKind| fs.is_formattable_on(os);
    before
        .filter(usable)
        .or_else(|| drive.filesystem_kind.as_ref().filter(usable))
        .cloned()
        .unwrap_or_default()
}

/// Reformat `drive` after testing
pub fn restore(
    tools: &dyn DriveTools,
    drive: &DriveDescriptor,
    before: Option<&FilesystemKind>,
) -> RestorationOutcome {
    let filesystem = restore_filesystem(drive, before);
    let label = drive.restore_label().to_string();

    tracing::info!(
        "Restoring {} as {} with label {}",
        drive.mount_path.display(),
        filesystem,
        label
    );

    match tools.format(&drive.mount_path, &filesystem, &label) {
        Ok(()) => {
            tracing::info!("Drive restored");
            RestorationOutcome {
                message: format!("Formatted as {} with label {}", filesystem, label),
                filesystem,
                label,
                succeeded: true,
            }
        }
        Err(e) => {
            let message = format!(
                "Restoration failed: {}. Reformat {} manually as {} with label {}",
                e,
                drive.mount_path.display(),
                filesystem,
                label
            );
            tracing::warn!("{}", message);
            RestorationOutcome {
                filesystem,
                label,
                succeeded: false,
                message,
            }
        }
    }
}
