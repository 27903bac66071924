//! Windows drive detection implementation
//!
//! Uses PowerShell `Get-CimInstance Win32_LogicalDisk`; removable volumes are
//! those with `DriveType` 2.

use super::parse::{parse_logical_disks, LogicalDisk};
use super::{is_system_mount_point, DetectError, DriveEnumerator, Result};
use flashcheck_core::{DriveDescriptor, FilesystemKind, InterfaceKind};
use std::path::{Component, Path, Prefix};
use std::process::Command;
use tracing::debug;

const LOGICAL_DISK_QUERY: &str = "Get-CimInstance -ClassName Win32_LogicalDisk | \
     Select-Object DeviceID,DriveType,VolumeName,FileSystem,Size | \
     ConvertTo-Csv -NoTypeInformation";

/// Queries WMI through PowerShell
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsEnumerator;

impl DriveEnumerator for WindowsEnumerator {
    fn list_drives(&self) -> Result<Vec<DriveDescriptor>> {
        let drives: Vec<DriveDescriptor> = logical_disks()?
            .into_iter()
            .filter(LogicalDisk::is_removable)
            .filter(|disk| !is_system_mount_point(&disk.device_id))
            .map(descriptor_from_disk)
            .collect();

        debug!("Found {} removable volume(s)", drives.len());
        Ok(drives)
    }

    fn filesystem_of(&self, mount: &Path) -> Result<FilesystemKind> {
        let letter = drive_letter(mount)
            .ok_or_else(|| DetectError::NotMounted(mount.display().to_string()))?;

        logical_disks()?
            .into_iter()
            .find(|disk| disk.device_id.eq_ignore_ascii_case(&letter))
            .and_then(|disk| disk.filesystem)
            .map(|fs| FilesystemKind::from_os_name(&fs))
            .ok_or_else(|| DetectError::NotMounted(mount.display().to_string()))
    }
}

fn logical_disks() -> Result<Vec<LogicalDisk>> {
    let output = Command::new("powershell")
        .args(["-NoProfile", "-Command", LOGICAL_DISK_QUERY])
        .output()
        .map_err(|e| DetectError::CommandFailed(format!("PowerShell failed: {e}")))?;

    if !output.status.success() {
        return Err(DetectError::CommandFailed(format!(
            "Get-CimInstance failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(parse_logical_disks(&String::from_utf8_lossy(&output.stdout)))
}

fn descriptor_from_disk(disk: LogicalDisk) -> DriveDescriptor {
    let mut drive = DriveDescriptor::new(format!("{}\\", disk.device_id))
        .with_total_bytes(disk.size)
        .with_interface(InterfaceKind::Usb)
        .with_device_path(disk.device_id.clone());
    if !disk.volume_name.is_empty() {
        drive = drive.with_label(disk.volume_name);
    }
    if let Some(fs) = disk.filesystem {
        drive = drive.with_filesystem(FilesystemKind::from_os_name(&fs));
    }
    drive
}

/// `E:` for any path on the E drive
fn drive_letter(path: &Path) -> Option<String> {
    match path.components().next()? {
        Component::Prefix(prefix) => match prefix.kind() {
            Prefix::Disk(letter) | Prefix::VerbatimDisk(letter) => {
                Some(format!("{}:", char::from(letter).to_ascii_uppercase()))
            }
            _ => None,
        },
        _ => None,
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
