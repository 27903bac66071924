//! macOS platform implementation
//!
//! `diskutil eraseVolume` unmounts, formats and remounts in one step.

use crate::format::{format_commands_macos, run_with_timeout, FormatRequest};
use crate::{unix, PlatformOps, Result};
use std::path::Path;
use tracing::info;

/// macOS platform implementation
pub struct MacOSPlatform;

impl PlatformOps for MacOSPlatform {
    fn free_space(path: &Path) -> Result<u64> {
        unix::free_space(path)
    }

    fn format_volume(request: &FormatRequest) -> Result<()> {
        info!(
            "Erasing {} as {} with label {}",
            request.mount_path.display(),
            request.filesystem,
            request.label
        );
        for command in format_commands_macos(request)? {
            run_with_timeout(&command, request.timeout)?;
        }
        Ok(())
    }

    fn has_elevated_privileges() -> bool {
        unix::is_root()
    }
}
