//! Linux platform implementation
//!
//! Formats with the mkfs family after unmounting, then mounts the device
//! back at its old mount point.

use crate::format::{format_commands_linux, run_with_timeout, FormatRequest};
use crate::{unix, PlatformError, PlatformOps, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Linux platform implementation
pub struct LinuxPlatform;

impl PlatformOps for LinuxPlatform {
    fn free_space(path: &Path) -> Result<u64> {
        unix::free_space(path)
    }

    fn format_volume(request: &FormatRequest) -> Result<()> {
        let commands = format_commands_linux(request)?;
        let [umount, mkfs, mount] = commands.as_slice() else {
            return Err(PlatformError::CommandFailed(
                "Unexpected format recipe".to_string(),
            ));
        };

        info!(
            "Formatting {} as {} with label {}",
            request.mount_path.display(),
            request.filesystem,
            request.label
        );

        run_with_timeout(umount, request.timeout).map_err(|e| match e {
            PlatformError::CommandFailed(msg) => PlatformError::UnmountFailed(msg),
            other => other,
        })?;
        run_with_timeout(mkfs, request.timeout)?;

        // the automounter may have removed the directory on unmount
        fs::create_dir_all(&request.mount_path)?;
        run_with_timeout(mount, request.timeout)?;

        debug!("Remounted at {}", request.mount_path.display());
        Ok(())
    }

    fn has_elevated_privileges() -> bool {
        unix::is_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashcheck_core::FilesystemKind;

    #[test]
    fn test_free_space_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let free = LinuxPlatform::free_space(dir.path()).unwrap();
        assert!(free > 0);
    }

    #[test]
    fn test_free_space_missing_path() {
        let result = LinuxPlatform::free_space(Path::new("/nonexistent/flashcheck/path"));
        assert!(matches!(result, Err(PlatformError::Io(_))));
    }

    #[test]
    fn test_format_without_device_fails_before_running_anything() {
        let request = FormatRequest::new("/media/none", FilesystemKind::Fat32, "X");
        assert!(matches!(
            LinuxPlatform::format_volume(&request),
            Err(PlatformError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_has_elevated_privileges() {
        let _ = LinuxPlatform::has_elevated_privileges();
    }
}
