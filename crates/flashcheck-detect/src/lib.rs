//! # Flashcheck Detect
//!
//! Enumerates mounted removable volumes and reports the filesystem behind a
//! mount point, producing [`DriveDescriptor`] values for the test engine.
//!
//! ## Safety
//!
//! A volume is never offered for testing when it, or any sibling partition
//! on the same disk, is mounted at a system location such as `/`, `/home`
//! or `C:\`.

#![warn(missing_docs)]
#![warn(clippy::all)]

use flashcheck_core::{DriveDescriptor, FilesystemKind};
use std::path::Path;
use thiserror::Error;

pub mod parse;

/// Drive detection errors
#[derive(Error, Debug)]
pub enum DetectError {
    /// Failed to enumerate drives
    #[error("Failed to enumerate drives: {0}")]
    EnumerationFailed(String),

    /// Permission denied when accessing drive information
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Platform not supported
    #[error("Platform not supported")]
    UnsupportedPlatform,

    /// Command execution failed
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Failed to parse drive information
    #[error("Parse error: {0}")]
    ParseError(String),

    /// No mounted volume matched the request
    #[error("No mounted volume found for {0}")]
    NotMounted(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for drive detection operations
pub type Result<T> = std::result::Result<T, DetectError>;

impl From<DetectError> for flashcheck_core::Error {
    fn from(err: DetectError) -> Self {
        match err {
            DetectError::NotMounted(target) => Self::DeviceNotFound(target),
            other => Self::Detect(other.to_string()),
        }
    }
}

/// Source of removable drive information
///
/// Implemented once per platform; tests substitute their own.
pub trait DriveEnumerator {
    /// List mounted removable volumes that are safe to test
    ///
    /// # Errors
    ///
    /// Returns an error if the platform's device tables cannot be read.
    fn list_drives(&self) -> Result<Vec<DriveDescriptor>>;

    /// Report the filesystem of the volume mounted at `mount`
    ///
    /// # Errors
    ///
    /// Returns an error if no mounted volume contains `mount`.
    fn filesystem_of(&self, mount: &Path) -> Result<FilesystemKind>;

    /// Find a drive by mount path, device path or label
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::NotMounted`] if nothing matches.
    fn find_drive(&self, target: &str) -> Result<DriveDescriptor> {
        self.list_drives()?
            .into_iter()
            .find(|drive| drive.matches_target(target))
            .ok_or_else(|| DetectError::NotMounted(target.to_string()))
    }
}

/// Mount points that indicate a system drive
pub const SYSTEM_MOUNT_POINTS: &[&str] = &[
    "/",
    "/boot",
    "/boot/efi",
    "/home",
    "/usr",
    "/var",
    "/etc",
    "/System",
    "/Applications",
    "/Library",
    "C:",
    "C:\\",
    "C:\\Windows",
];

/// Check if a mount point belongs to a system drive
#[must_use]
pub fn is_system_mount_point(mount_point: &str) -> bool {
    let normalized = mount_point.trim();

    SYSTEM_MOUNT_POINTS.iter().any(|&sys| {
        normalized.eq_ignore_ascii_case(sys)
            || normalized.starts_with(&format!("{sys}\\"))
            || normalized.starts_with(&format!("{sys}/"))
    })
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod linux;
        /// Enumerator for the host platform
        pub use linux::LinuxEnumerator as PlatformEnumerator;
    } else if #[cfg(target_os = "macos")] {
        mod macos;
        /// Enumerator for the host platform
        pub use macos::MacEnumerator as PlatformEnumerator;
    } else if #[cfg(target_os = "windows")] {
        mod windows;
        /// Enumerator for the host platform
        pub use windows::WindowsEnumerator as PlatformEnumerator;
    } else {
        /// Enumerator for platforms without drive detection
        #[derive(Debug, Default, Clone, Copy)]
        pub struct PlatformEnumerator;

        impl DriveEnumerator for PlatformEnumerator {
            fn list_drives(&self) -> Result<Vec<DriveDescriptor>> {
                Err(DetectError::UnsupportedPlatform)
            }

            fn filesystem_of(&self, _mount: &Path) -> Result<FilesystemKind> {
                Err(DetectError::UnsupportedPlatform)
            }
        }
    }
}

/// List mounted removable volumes on this host
///
/// # Errors
///
/// Returns an error if enumeration fails or the platform is unsupported.
pub fn list_drives() -> Result<Vec<DriveDescriptor>> {
    PlatformEnumerator::default().list_drives()
}

/// Report the filesystem of the volume mounted at `mount`
///
/// # Errors
///
/// Returns an error if the mount cannot be resolved.
pub fn filesystem_of(mount: &Path) -> Result<FilesystemKind> {
    PlatformEnumerator::default().filesystem_of(mount)
}

/// Find a removable volume by mount path, device path or label
///
/// # Errors
///
/// Returns [`DetectError::NotMounted`] if no listed volume matches.
pub fn find_drive(target: &str) -> Result<DriveDescriptor> {
    PlatformEnumerator::default().find_drive(target)
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        Enumerator {}
        impl DriveEnumerator for Enumerator {
            fn list_drives(&self) -> Result<Vec<DriveDescriptor>>;
            fn filesystem_of(&self, mount: &Path) -> Result<FilesystemKind>;
        }
    }

    fn sample_drives() -> Vec<DriveDescriptor> {
        vec![
            DriveDescriptor::new("/media/user/SANDISK").with_device_path("/dev/sdb1"),
            DriveDescriptor::new("/media/user/CARD")
                .with_label("NIKON")
                .with_device_path("/dev/mmcblk0p1"),
        ]
    }

    #[test]
    fn test_is_system_mount_point_root() {
        assert!(is_system_mount_point("/"));
        assert!(is_system_mount_point("/boot/efi"));
        assert!(is_system_mount_point("/home/user"));
    }

    #[test]
    fn test_is_system_mount_point_windows() {
        assert!(is_system_mount_point("C:"));
        assert!(is_system_mount_point("c:\\"));
        assert!(is_system_mount_point("C:\\Windows"));
        assert!(!is_system_mount_point("E:\\"));
    }

    #[test]
    fn test_is_system_mount_point_removable() {
        assert!(!is_system_mount_point("/media/user/USB"));
        assert!(!is_system_mount_point("/run/media/user/SD"));
        assert!(!is_system_mount_point("/Volumes/KINGSTON"));
    }

    #[test]
    fn test_find_drive_by_mount_device_and_label() {
        let mut enumerator = MockEnumerator::new();
        enumerator
            .expect_list_drives()
            .times(3)
            .returning(|| Ok(sample_drives()));

        let by_mount = enumerator.find_drive("/media/user/SANDISK").unwrap();
        assert_eq!(by_mount.display_label, "SANDISK");

        let by_device = enumerator.find_drive("/dev/mmcblk0p1").unwrap();
        assert_eq!(by_device.display_label, "NIKON");

        let by_label = enumerator.find_drive("NIKON").unwrap();
        assert_eq!(by_label.device_path.as_deref(), Some("/dev/mmcblk0p1"));
    }

    #[test]
    fn test_find_drive_missing() {
        let mut enumerator = MockEnumerator::new();
        enumerator
            .expect_list_drives()
            .returning(|| Ok(sample_drives()));

        let err = enumerator.find_drive("/media/user/OTHER").unwrap_err();
        assert!(matches!(err, DetectError::NotMounted(_)));
    }

    #[test]
    fn test_error_conversion() {
        let not_found: flashcheck_core::Error = DetectError::NotMounted("X".into()).into();
        assert!(matches!(not_found, flashcheck_core::Error::DeviceNotFound(_)));

        let failed: flashcheck_core::Error = DetectError::UnsupportedPlatform.into();
        assert!(matches!(failed, flashcheck_core::Error::Detect(_)));
    }
}
