//! Drive descriptors handed to the test engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Label used for restoration when the drive had none
pub const FALLBACK_LABEL: &str = "USB_DRIVE";

/// How the drive is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum InterfaceKind {
    /// USB connected drive
    Usb,
    /// SD card (via built-in or USB reader)
    SdCard,
    /// `NVMe` enclosure
    Nvme,
    /// SATA drive
    Sata,
    /// Other/unknown connection type
    #[default]
    Other,
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceKind::Usb => write!(f, "USB"),
            InterfaceKind::SdCard => write!(f, "SD Card"),
            InterfaceKind::Nvme => write!(f, "NVMe"),
            InterfaceKind::Sata => write!(f, "SATA"),
            InterfaceKind::Other => write!(f, "Other"),
        }
    }
}

/// Filesystem found on a mounted volume
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FilesystemKind {
    /// FAT32 (`vfat`/`msdos`)
    #[default]
    Fat32,
    /// exFAT
    ExFat,
    /// NTFS
    Ntfs,
    /// ext4
    Ext4,
    /// HFS+
    Hfs,
    /// APFS
    Apfs,
    /// Anything else, with the name the OS reported
    Other(String),
}

impl FilesystemKind {
    /// Map an OS-reported filesystem name onto a known kind
    pub fn from_os_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "vfat" | "fat32" | "fat" | "msdos" | "fat16" => FilesystemKind::Fat32,
            "exfat" => FilesystemKind::ExFat,
            "ntfs" | "ntfs3" | "fuseblk" => FilesystemKind::Ntfs,
            "ext4" => FilesystemKind::Ext4,
            "hfs" | "hfs+" | "hfsplus" | "jhfs+" => FilesystemKind::Hfs,
            "apfs" => FilesystemKind::Apfs,
            other => FilesystemKind::Other(other.to_string()),
        }
    }

    /// Whether the restoration step can create this filesystem on the
    /// current host
    pub fn is_formattable(&self) -> bool {
        self.is_formattable_on(std::env::consts::OS)
    }

    /// Whether `os` (as in [`std::env::consts::OS`]) ships a formatter for
    /// this filesystem
    pub fn is_formattable_on(&self, os: &str) -> bool {
        match self {
            FilesystemKind::Fat32 | FilesystemKind::ExFat => {
                matches!(os, "linux" | "macos" | "windows")
            }
            FilesystemKind::Ntfs => matches!(os, "linux" | "windows"),
            FilesystemKind::Ext4 => os == "linux",
            FilesystemKind::Hfs => matches!(os, "linux" | "macos"),
            FilesystemKind::Apfs => os == "macos",
            FilesystemKind::Other(_) => false,
        }
    }

    /// Maximum volume label length this filesystem accepts
    pub fn max_label_len(&self) -> usize {
        match self {
            FilesystemKind::Fat32 | FilesystemKind::ExFat => 11,
            FilesystemKind::Ext4 => 16,
            FilesystemKind::Ntfs => 32,
            FilesystemKind::Hfs | FilesystemKind::Apfs | FilesystemKind::Other(_) => 255,
        }
    }
}

impl fmt::Display for FilesystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilesystemKind::Fat32 => write!(f, "FAT32"),
            FilesystemKind::ExFat => write!(f, "exFAT"),
            FilesystemKind::Ntfs => write!(f, "NTFS"),
            FilesystemKind::Ext4 => write!(f, "ext4"),
            FilesystemKind::Hfs => write!(f, "HFS+"),
            FilesystemKind::Apfs => write!(f, "APFS"),
            FilesystemKind::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Snapshot of a mounted removable drive taken at scan time.
///
/// The snapshot goes stale if the drive is replugged; rescan before
/// destructive phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveDescriptor {
    /// Where the volume is mounted (e.g. `/media/user/USB`, `E:\`)
    pub mount_path: PathBuf,

    /// Volume label, or a name derived from the mount path
    pub display_label: String,

    /// Size of the volume in bytes
    pub total_bytes: u64,

    /// Model name if available
    pub model: Option<String>,

    /// Serial number if available
    pub serial: Option<String>,

    /// How the drive is attached
    pub interface_kind: InterfaceKind,

    /// Filesystem at scan time
    pub filesystem_kind: Option<FilesystemKind>,

    /// Block device backing the mount (e.g. `/dev/sdb1`), when known
    pub device_path: Option<String>,
}

impl DriveDescriptor {
    /// Create a descriptor for a mount path with everything else unknown
    pub fn new(mount_path: impl Into<PathBuf>) -> Self {
        let mount_path = mount_path.into();
        let display_label = label_from_path(&mount_path);
        Self {
            mount_path,
            display_label,
            total_bytes: 0,
            model: None,
            serial: None,
            interface_kind: InterfaceKind::Other,
            filesystem_kind: None,
            device_path: None,
        }
    }

    /// Builder: set the label
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.display_label = label.into();
        self
    }

    /// Builder: set the size
    #[must_use]
    pub fn with_total_bytes(mut self, total_bytes: u64) -> Self {
        self.total_bytes = total_bytes;
        self
    }

    /// Builder: set the model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Builder: set the serial number
    #[must_use]
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    /// Builder: set the interface kind
    #[must_use]
    pub fn with_interface(mut self, interface_kind: InterfaceKind) -> Self {
        self.interface_kind = interface_kind;
        self
    }

    /// Builder: set the filesystem
    #[must_use]
    pub fn with_filesystem(mut self, filesystem_kind: FilesystemKind) -> Self {
        self.filesystem_kind = Some(filesystem_kind);
        self
    }

    /// Builder: set the backing block device
    #[must_use]
    pub fn with_device_path(mut self, device_path: impl Into<String>) -> Self {
        self.device_path = Some(device_path.into());
        self
    }

    /// Label to restore after destructive testing
    pub fn restore_label(&self) -> &str {
        let label = self.display_label.trim();
        if label.is_empty() || label.eq_ignore_ascii_case("unknown") {
            FALLBACK_LABEL
        } else {
            label
        }
    }

    /// Whether this descriptor refers to the given mount path
    pub fn matches_target(&self, target: &str) -> bool {
        let target = target.trim_end_matches(['/', '\\']);
        let mount = self.mount_path.to_string_lossy();
        let mount = mount.trim_end_matches(['/', '\\']);
        mount == target
            || self.display_label == target
            || self.device_path.as_deref() == Some(target)
    }
}

fn label_from_path(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
