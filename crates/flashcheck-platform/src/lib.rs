//! # Flashcheck Platform
//!
//! Platform-specific adapters for the drive under test: a [`MountedVolume`]
//! that implements the engine's storage seam on a real mount path, free space
//! queries, and reformatting with an external timeout.
//!
//! ## Safety
//!
//! Formatting destroys everything on the volume. Callers must resolve the
//! target through `flashcheck-detect` first so system volumes are never
//! passed in.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::path::Path;
use thiserror::Error;

pub mod format;
#[cfg(unix)]
mod unix;
mod volume;

pub use format::{
    format_commands_linux, format_commands_macos, format_commands_windows, run_with_timeout,
    sanitize_label, CommandSpec, FormatRequest, DEFAULT_FORMAT_TIMEOUT,
};
pub use volume::MountedVolume;

/// Platform-specific errors
#[derive(Error, Debug)]
pub enum PlatformError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Access denied (need elevated privileges)
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Volume not found
    #[error("Volume not found: {0}")]
    DeviceNotFound(String),

    /// Failed to unmount the volume
    #[error("Unmount failed: {0}")]
    UnmountFailed(String),

    /// Operation not supported on this platform
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Command execution failed
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// External command exceeded its time budget
    #[error("{command} timed out after {seconds}s")]
    Timeout {
        /// Program that was killed
        command: String,
        /// Budget in seconds
        seconds: u64,
    },
}

/// Result type for platform operations
pub type Result<T> = std::result::Result<T, PlatformError>;

impl From<PlatformError> for flashcheck_core::Error {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Io(e) => Self::Io(e),
            PlatformError::DeviceNotFound(path) => Self::DeviceNotFound(path),
            other => Self::Format(other.to_string()),
        }
    }
}

/// Platform operations interface
pub trait PlatformOps {
    /// Bytes available to unprivileged writers on the filesystem holding `path`
    fn free_space(path: &Path) -> Result<u64>;

    /// Reformat a mounted volume and leave it mounted again
    fn format_volume(request: &FormatRequest) -> Result<()>;

    /// Check if running with elevated privileges
    fn has_elevated_privileges() -> bool;
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod linux;
        pub use linux::LinuxPlatform as Platform;
    } else if #[cfg(target_os = "macos")] {
        mod macos;
        pub use macos::MacOSPlatform as Platform;
    } else if #[cfg(target_os = "windows")] {
        mod windows;
        pub use windows::WindowsPlatform as Platform;
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))] {
        /// Free space on the filesystem holding `path`
        pub fn free_space(path: &Path) -> Result<u64> {
            Platform::free_space(path)
        }

        /// Reformat a mounted volume using the platform's tools
        pub fn format_volume(request: &FormatRequest) -> Result<()> {
            Platform::format_volume(request)
        }

        /// Check if running with elevated privileges
        pub fn has_elevated_privileges() -> bool {
            Platform::has_elevated_privileges()
        }
    } else {
        /// Free space (unsupported platform)
        pub fn free_space(_path: &Path) -> Result<u64> {
            Err(PlatformError::NotSupported("Platform not supported".to_string()))
        }

        /// Format a volume (unsupported platform)
        pub fn format_volume(_request: &FormatRequest) -> Result<()> {
            Err(PlatformError::NotSupported("Platform not supported".to_string()))
        }

        /// Check privileges (unsupported platform)
        pub fn has_elevated_privileges() -> bool {
            false
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlatformError::PermissionDenied("need root".to_string());
        assert!(err.to_string().contains("Permission denied"));
        assert!(err.to_string().contains("need root"));

        let err = PlatformError::Timeout {
            command: "mkfs.vfat".to_string(),
            seconds: 120,
        };
        assert_eq!(err.to_string(), "mkfs.vfat timed out after 120s");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let platform_err: PlatformError = io_err.into();
        assert!(matches!(platform_err, PlatformError::Io(_)));
    }

    #[test]
    fn test_error_into_core() {
        let core: flashcheck_core::Error =
            PlatformError::UnmountFailed("/media/usb".to_string()).into();
        assert!(matches!(core, flashcheck_core::Error::Format(_)));

        let core: flashcheck_core::Error =
            PlatformError::DeviceNotFound("/media/usb".to_string()).into();
        assert!(matches!(core, flashcheck_core::Error::DeviceNotFound(_)));
    }

    #[test]
    fn test_free_space_of_temp_dir() {
        let dir = std::env::temp_dir();
        assert!(free_space(&dir).is_ok());
    }
}
