//! macOS drive detection implementation
//!
//! Uses `diskutil list -plist external physical` to find external disks and
//! `diskutil info -plist` per partition for mount and filesystem details.

use super::parse::{parse_plist_array, parse_plist_dict};
use super::{is_system_mount_point, DetectError, DriveEnumerator, Result};
use flashcheck_core::{DriveDescriptor, FilesystemKind, InterfaceKind};
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Queries `diskutil`
#[derive(Debug, Default, Clone, Copy)]
pub struct MacEnumerator;

impl DriveEnumerator for MacEnumerator {
    fn list_drives(&self) -> Result<Vec<DriveDescriptor>> {
        let listing = diskutil(&["list", "-plist", "external", "physical"])?;

        let mut drives = Vec::new();
        for disk in parse_plist_array(&listing, "WholeDisks") {
            match volumes_on_disk(&disk) {
                Ok(volumes) => drives.extend(volumes),
                Err(e) => debug!("Failed to get info for {disk}: {e}"),
            }
        }

        drives.sort_by(|a, b| a.mount_path.cmp(&b.mount_path));
        Ok(drives)
    }

    fn filesystem_of(&self, mount: &Path) -> Result<FilesystemKind> {
        let target = mount.to_string_lossy();
        let info = parse_plist_dict(&diskutil(&["info", "-plist", &target])?);

        info.get("FilesystemType")
            .map(|fs| FilesystemKind::from_os_name(fs))
            .ok_or_else(|| DetectError::NotMounted(target.into_owned()))
    }
}

fn diskutil(args: &[&str]) -> Result<String> {
    let output = Command::new("diskutil")
        .args(args)
        .output()
        .map_err(|e| DetectError::CommandFailed(format!("diskutil {} failed: {e}", args[0])))?;

    if !output.status.success() {
        return Err(DetectError::CommandFailed(format!(
            "diskutil {} failed: {}",
            args[0],
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn volumes_on_disk(disk: &str) -> Result<Vec<DriveDescriptor>> {
    let disk_info = parse_plist_dict(&diskutil(&["info", "-plist", disk])?);
    let interface = interface_from_info(&disk_info);
    let model = disk_info.get("MediaName").cloned();

    let listing = diskutil(&["list", "-plist", disk])?;
    let mut volumes = Vec::new();

    for identifier in parse_plist_array(&listing, "AllDisks") {
        let info = match diskutil(&["info", "-plist", &identifier]) {
            Ok(plist) => parse_plist_dict(&plist),
            Err(e) => {
                debug!("Skipping {identifier}: {e}");
                continue;
            }
        };

        if let Some(drive) = descriptor_from_info(&info, interface, model.as_deref()) {
            if is_system_mount_point(&drive.mount_path.to_string_lossy()) {
                debug!("Skipping {disk}: contains system mount point");
                return Ok(Vec::new());
            }
            volumes.push(drive);
        }
    }

    Ok(volumes)
}

/// Build a descriptor from a partition's `diskutil info`, if it is mounted
fn descriptor_from_info(
    info: &HashMap<String, String>,
    interface: InterfaceKind,
    model: Option<&str>,
) -> Option<DriveDescriptor> {
    let mount = info.get("MountPoint").filter(|m| !m.is_empty())?;

    let size = info
        .get("TotalSize")
        .or_else(|| info.get("Size"))
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let mut drive = DriveDescriptor::new(mount)
        .with_total_bytes(size)
        .with_interface(interface);
    if let Some(name) = info.get("VolumeName").filter(|n| !n.is_empty()) {
        drive = drive.with_label(name.clone());
    }
    if let Some(fs) = info.get("FilesystemType") {
        drive = drive.with_filesystem(FilesystemKind::from_os_name(fs));
    }
    if let Some(node) = info.get("DeviceNode") {
        drive = drive.with_device_path(node.clone());
    }
    if let Some(model) = model {
        drive = drive.with_model(model);
    }
    Some(drive)
}

/// Map `BusProtocol` to an interface kind
fn interface_from_info(info: &HashMap<String, String>) -> InterfaceKind {
    let protocol = info
        .get("BusProtocol")
        .or_else(|| info.get("DeviceProtocol"))
        .map(|p| p.to_lowercase())
        .unwrap_or_default();

    match protocol.as_str() {
        "usb" => InterfaceKind::Usb,
        "secure digital" | "sd" => InterfaceKind::SdCard,
        "pci-express" | "nvme" => InterfaceKind::Nvme,
        "sata" => InterfaceKind::Sata,
        _ => InterfaceKind::Other,
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
