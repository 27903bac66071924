//! Linux drive detection implementation
//!
//! Uses /sys/block for device enumeration and /proc/mounts for mount point detection.

use super::parse::{
    decode_label, is_automount_path, mount_for_path, parse_mounts, should_skip_device, MountEntry,
};
use super::{is_system_mount_point, DetectError, DriveEnumerator, Result};
use flashcheck_core::{DriveDescriptor, FilesystemKind, InterfaceKind};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, trace};

/// Reads /sys/block, /proc/mounts and /dev/disk/by-label
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxEnumerator;

impl DriveEnumerator for LinuxEnumerator {
    fn list_drives(&self) -> Result<Vec<DriveDescriptor>> {
        list_drives()
    }

    fn filesystem_of(&self, mount: &Path) -> Result<FilesystemKind> {
        filesystem_of(mount)
    }
}

/// List mounted removable volumes
///
/// # Errors
///
/// Returns an error if:
/// - `/sys/block` directory doesn't exist or can't be read
/// - `/proc/mounts` can't be read for mount point detection
fn list_drives() -> Result<Vec<DriveDescriptor>> {
    let mounts = read_mounts()?;
    let labels = get_partition_labels();

    let block_dir = Path::new("/sys/block");
    if !block_dir.exists() {
        return Err(DetectError::EnumerationFailed(
            "/sys/block not found".to_string(),
        ));
    }

    let mut drives = Vec::new();
    for entry in fs::read_dir(block_dir)? {
        let name = entry?.file_name().to_string_lossy().to_string();
        if should_skip_device(&name) {
            continue;
        }
        drives.extend(volumes_on_disk(&name, &mounts, &labels));
    }

    drives.sort_by(|a, b| a.mount_path.cmp(&b.mount_path));
    debug!("Found {} removable volume(s)", drives.len());
    Ok(drives)
}

fn filesystem_of(mount: &Path) -> Result<FilesystemKind> {
    let mounts = read_mounts()?;
    let resolved = mount.canonicalize().unwrap_or_else(|_| mount.to_path_buf());

    mount_for_path(&mounts, &resolved)
        .and_then(|entry| entry.filesystem.as_deref())
        .map(FilesystemKind::from_os_name)
        .ok_or_else(|| DetectError::NotMounted(mount.display().to_string()))
}

fn read_mounts() -> Result<Vec<MountEntry>> {
    let content = fs::read_to_string("/proc/mounts")
        .map_err(|e| DetectError::EnumerationFailed(format!("Failed to read /proc/mounts: {e}")))?;
    Ok(parse_mounts(&content))
}

/// Get partition labels from /dev/disk/by-label/
///
/// Returns a map of device path -> label
fn get_partition_labels() -> HashMap<String, String> {
    let mut labels = HashMap::new();

    if let Ok(entries) = fs::read_dir("/dev/disk/by-label") {
        for entry in entries.flatten() {
            let label = decode_label(&entry.file_name().to_string_lossy());
            // target is relative, e.g. "../../sdb1"
            if let Ok(target) = fs::read_link(entry.path()) {
                if let Some(device_name) = target.file_name() {
                    labels.insert(format!("/dev/{}", device_name.to_string_lossy()), label);
                }
            }
        }
    }

    labels
}

/// Build one descriptor per mounted partition of a disk
fn volumes_on_disk(
    disk: &str,
    mounts: &[MountEntry],
    labels: &HashMap<String, String>,
) -> Vec<DriveDescriptor> {
    let sys_path = format!("/sys/block/{disk}");
    let removable = read_sys_value(&format!("{sys_path}/removable")).is_ok_and(|s| s == "1");
    let interface = detect_interface(disk, &sys_path, removable);

    // partitions first, then the whole disk for superfloppy layouts
    let mut nodes = partition_names(disk, &sys_path);
    nodes.push((disk.to_string(), sys_path.clone()));

    let mounted: Vec<(&MountEntry, &str)> = nodes
        .iter()
        .flat_map(|(node, node_sys)| {
            let dev = format!("/dev/{node}");
            mounts
                .iter()
                .filter(move |m| m.device == dev)
                .map(move |m| (m, node_sys.as_str()))
        })
        .collect();

    if mounted.is_empty() {
        return Vec::new();
    }

    if let Some((system, _)) = mounted
        .iter()
        .find(|(m, _)| is_system_mount_point(&m.mount_point))
    {
        debug!("Skipping {disk}: contains system mount point {}", system.mount_point);
        return Vec::new();
    }

    let candidate = removable
        || matches!(interface, InterfaceKind::Usb | InterfaceKind::SdCard)
        || mounted.iter().all(|(m, _)| is_automount_path(&m.mount_point));
    if !candidate {
        trace!("Skipping {disk}: fixed internal disk");
        return Vec::new();
    }

    let model = disk_model(&sys_path);
    let serial = read_sys_value(&format!("{sys_path}/device/serial"))
        .ok()
        .filter(|s| !s.is_empty());

    mounted
        .into_iter()
        .map(|(entry, node_sys)| {
            let size = read_sys_value(&format!("{node_sys}/size"))
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map_or(0, |sectors| sectors * 512);

            let mut drive = DriveDescriptor::new(&entry.mount_point)
                .with_total_bytes(size)
                .with_interface(interface)
                .with_device_path(entry.device.clone());
            if let Some(label) = labels.get(&entry.device) {
                drive = drive.with_label(label.clone());
            }
            if let Some(fs) = &entry.filesystem {
                drive = drive.with_filesystem(FilesystemKind::from_os_name(fs));
            }
            if let Some(model) = &model {
                drive = drive.with_model(model.clone());
            }
            if let Some(serial) = &serial {
                drive = drive.with_serial(serial.clone());
            }
            drive
        })
        .collect()
}

/// Partition names and sysfs paths for a disk, sorted
fn partition_names(disk: &str, sys_path: &str) -> Vec<(String, String)> {
    let mut parts: Vec<(String, String)> = fs::read_dir(sys_path)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().to_string())
                .filter(|name| name.starts_with(disk) && name != disk)
                .map(|name| {
                    let path = format!("{sys_path}/{name}");
                    (name, path)
                })
                .collect()
        })
        .unwrap_or_default();
    parts.sort();
    parts
}

fn disk_model(sys_path: &str) -> Option<String> {
    let read = |attr: &str| {
        read_sys_value(&format!("{sys_path}/device/{attr}"))
            .ok()
            .filter(|s| !s.is_empty())
    };

    match (read("vendor"), read("model")) {
        (Some(v), Some(m)) => Some(format!("{v} {m}")),
        (v, m) => m.or(v),
    }
}

/// Detect how a disk is attached from its name and sysfs subsystem
fn detect_interface(name: &str, sys_path: &str, removable: bool) -> InterfaceKind {
    if name.starts_with("nvme") {
        return InterfaceKind::Nvme;
    }
    if name.starts_with("mmcblk") {
        return InterfaceKind::SdCard;
    }

    if let Ok(link) = fs::canonicalize(format!("{sys_path}/device")) {
        if link.components().any(|c| c.as_os_str().to_string_lossy().starts_with("usb")) {
            return InterfaceKind::Usb;
        }
    }

    if let Ok(subsystem_link) = fs::read_link(format!("{sys_path}/device/subsystem")) {
        if let Some(subsystem_name) = subsystem_link.file_name() {
            let sub = subsystem_name.to_string_lossy();
            if sub == "usb" || sub == "usb-storage" {
                return InterfaceKind::Usb;
            }
            if sub == "ata" {
                return InterfaceKind::Sata;
            }
        }
    }

    if removable && name.starts_with("sd") {
        return InterfaceKind::Usb;
    }

    InterfaceKind::Other
}

fn read_sys_value(path: &str) -> Result<String> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(DetectError::Io)
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_interface_by_name() {
        assert_eq!(
            detect_interface("nvme0n1", "/nonexistent", false),
            InterfaceKind::Nvme
        );
        assert_eq!(
            detect_interface("mmcblk0", "/nonexistent", true),
            InterfaceKind::SdCard
        );
    }

    #[test]
    fn test_detect_interface_removable_fallback() {
        assert_eq!(
            detect_interface("sdz", "/nonexistent", true),
            InterfaceKind::Usb
        );
        assert_eq!(
            detect_interface("sdz", "/nonexistent", false),
            InterfaceKind::Other
        );
    }

    #[test]
    fn test_volumes_on_disk_without_mounts() {
        let labels = HashMap::new();
        assert!(volumes_on_disk("sdz", &[], &labels).is_empty());
    }

    #[test]
    fn test_volumes_on_disk_refuses_system_mounts() {
        let mounts = parse_mounts("/dev/sdz1 / ext4 rw 0 0\n/dev/sdz2 /media/user/DATA vfat rw 0 0\n");
        let labels = HashMap::new();
        assert!(volumes_on_disk("sdz", &mounts, &labels).is_empty());
    }

    #[test]
    fn test_volumes_on_disk_whole_disk_automount() {
        // no sysfs entry for sdz, so only the whole-disk node is considered
        let mounts = parse_mounts("/dev/sdz /media/user/STICK vfat rw 0 0\n");
        let mut labels = HashMap::new();
        labels.insert("/dev/sdz".to_string(), "MY STICK".to_string());

        let drives = volumes_on_disk("sdz", &mounts, &labels);
        assert_eq!(drives.len(), 1);
        assert_eq!(drives[0].display_label, "MY STICK");
        assert_eq!(drives[0].filesystem_kind, Some(FilesystemKind::Fat32));
        assert_eq!(drives[0].device_path.as_deref(), Some("/dev/sdz"));
        assert_eq!(drives[0].total_bytes, 0);
    }

    #[test]
    #[ignore = "requires actual Linux system with /proc/mounts"]
    fn test_filesystem_of_root() {
        assert!(filesystem_of(Path::new("/")).is_ok());
    }

    #[test]
    #[ignore = "requires actual Linux system with /sys/block"]
    fn test_list_drives_excludes_system() {
        let drives = list_drives().unwrap();
        for drive in drives {
            assert!(!is_system_mount_point(&drive.mount_path.to_string_lossy()));
        }
    }
}
