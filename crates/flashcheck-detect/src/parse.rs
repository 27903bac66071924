//! Parsers for the text that platform tools emit
//!
//! Everything here is pure string handling so it can be tested and fuzzed on
//! any host, regardless of which platform backend is compiled in.

use std::collections::HashMap;
use std::path::Path;

// ============================================================================
// /proc/mounts
// ============================================================================

/// Pseudo filesystems that never back a removable volume
const PSEUDO_FILESYSTEMS: &[&str] = &[
    "devtmpfs",
    "sysfs",
    "proc",
    "tmpfs",
    "securityfs",
    "cgroup2",
    "devpts",
    "autofs",
];

/// One entry of a mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Source device, e.g. `/dev/sdb1`
    pub device: String,
    /// Mount point with octal escapes decoded
    pub mount_point: String,
    /// Filesystem type, `None` for pseudo filesystems
    pub filesystem: Option<String>,
}

/// Parse a single line from /proc/mounts
///
/// Format: device `mount_point` filesystem options dump pass
#[must_use]
pub fn parse_mount_line(line: &str) -> Option<MountEntry> {
    let mut parts = line.split_whitespace();
    let device = parts.next()?;
    let mount_point = parts.next()?;
    let filesystem = parts.next()?;

    let filesystem = if PSEUDO_FILESYSTEMS.contains(&filesystem) {
        None
    } else {
        Some(filesystem.to_string())
    };

    Some(MountEntry {
        device: device.to_string(),
        mount_point: unescape_mount_path(mount_point),
        filesystem,
    })
}

/// Parse a whole mount table, skipping malformed lines
#[must_use]
pub fn parse_mounts(content: &str) -> Vec<MountEntry> {
    content.lines().filter_map(parse_mount_line).collect()
}

/// Decode the octal escapes the kernel uses for whitespace in mount points
/// (`\040` for space, `\011` for tab, `\012` for newline, `\134` for backslash)
#[must_use]
pub fn unescape_mount_path(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_triplet(&bytes[i + 1..i + 4]) {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal_triplet(digits: &[u8]) -> bool {
    digits.len() == 3 && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}

/// Find the mount entry whose mount point is the longest prefix of `path`
#[must_use]
pub fn mount_for_path<'a>(entries: &'a [MountEntry], path: &Path) -> Option<&'a MountEntry> {
    entries
        .iter()
        .filter(|entry| path.starts_with(&entry.mount_point))
        .max_by_key(|entry| entry.mount_point.len())
}

/// Decode a `/dev/disk/by-label` entry name (handles `\x20` style escapes)
#[must_use]
pub fn decode_label(label: &str) -> String {
    let mut result = String::new();
    let mut chars = label.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'x') {
            chars.next();
            let hex: String = chars.by_ref().take(2).collect();
            if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                result.push(char::from(byte));
            } else {
                result.push_str("\\x");
                result.push_str(&hex);
            }
        } else {
            result.push(c);
        }
    }

    result
}

/// Block devices that are never candidates for testing
#[must_use]
pub fn should_skip_device(name: &str) -> bool {
    ["loop", "ram", "dm-", "zram", "sr", "fd", "md"]
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Mount roots used by desktop automounters for removable media
#[must_use]
pub fn is_automount_path(mount_point: &str) -> bool {
    ["/media/", "/run/media/", "/mnt/"]
        .iter()
        .any(|root| mount_point.starts_with(root))
}

// ============================================================================
// diskutil property lists
// ============================================================================

/// Extract the `<string>` items of the array stored under `key`
///
/// Only the first array following the key is read; nested dictionaries are
/// flattened, which is what `diskutil list -plist` needs for `WholeDisks`
/// and `AllDisks`.
#[must_use]
pub fn parse_plist_array(plist: &str, key: &str) -> Vec<String> {
    let marker = format!("<key>{key}</key>");
    let Some(start) = plist.find(&marker) else {
        return Vec::new();
    };
    let rest = &plist[start + marker.len()..];

    let Some(open) = rest.find("<array>") else {
        return Vec::new();
    };
    // the array must directly follow the key
    if !rest[..open].trim().is_empty() {
        return Vec::new();
    }
    let body = &rest[open + "<array>".len()..];
    let body = body.find("</array>").map_or(body, |end| &body[..end]);

    let mut items = Vec::new();
    let mut cursor = body;
    while let Some(s) = cursor.find("<string>") {
        let after = &cursor[s + "<string>".len()..];
        let Some(e) = after.find("</string>") else {
            break;
        };
        items.push(unescape_xml(after[..e].trim()));
        cursor = &after[e + "</string>".len()..];
    }
    items
}

/// Flatten a `diskutil info -plist` dictionary into key/value strings
///
/// Booleans become `"true"`/`"false"`, integers keep their digits, and
/// nested structures are skipped.
#[must_use]
pub fn parse_plist_dict(plist: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut current_key: Option<String> = None;

    for line in plist.lines() {
        let line = line.trim();

        if let Some(key) = element_text(line, "key") {
            current_key = Some(unescape_xml(key));
            continue;
        }

        let Some(key) = current_key.take() else {
            continue;
        };

        let value = if let Some(v) = element_text(line, "string") {
            Some(unescape_xml(v))
        } else if let Some(v) = element_text(line, "integer") {
            Some(v.to_string())
        } else if line == "<true/>" {
            Some("true".to_string())
        } else if line == "<false/>" {
            Some("false".to_string())
        } else {
            None
        };

        if let Some(value) = value {
            map.insert(key, value);
        }
    }

    map
}

fn element_text<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    line.strip_prefix(&format!("<{tag}>"))?
        .strip_suffix(&format!("</{tag}>"))
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ============================================================================
// PowerShell CSV
// ============================================================================

/// Split one CSV line, honouring quotes and doubled quotes inside them
#[must_use]
pub fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);

    fields
}

/// Parse `ConvertTo-Csv` output into header-keyed rows
#[must_use]
pub fn parse_csv_rows(csv: &str) -> Vec<HashMap<String, String>> {
    let mut lines = csv
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("#TYPE"));

    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let headers = parse_csv_line(header);

    lines
        .map(|line| {
            headers
                .iter()
                .cloned()
                .zip(parse_csv_line(line))
                .collect::<HashMap<_, _>>()
        })
        .collect()
}

/// A row of `Win32_LogicalDisk`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalDisk {
    /// Drive letter with colon, e.g. `E:`
    pub device_id: String,
    /// `DriveType` code, 2 for removable
    pub drive_type: u32,
    /// Volume label, empty when unset
    pub volume_name: String,
    /// Filesystem name, e.g. `FAT32`
    pub filesystem: Option<String>,
    /// Volume size in bytes
    pub size: u64,
}

impl LogicalDisk {
    /// `DriveType` reported for removable media
    pub const REMOVABLE: u32 = 2;

    /// Whether Windows classifies the disk as removable
    #[must_use]
    pub const fn is_removable(&self) -> bool {
        self.drive_type == Self::REMOVABLE
    }
}

/// Parse the CSV output of the logical disk query
#[must_use]
pub fn parse_logical_disks(csv: &str) -> Vec<LogicalDisk> {
    parse_csv_rows(csv)
        .into_iter()
        .filter_map(|row| {
            let device_id = row.get("DeviceID")?.trim().to_string();
            if device_id.is_empty() {
                return None;
            }
            Some(LogicalDisk {
                device_id,
                drive_type: row
                    .get("DriveType")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0),
                volume_name: row.get("VolumeName").map(|v| v.trim().to_string()).unwrap_or_default(),
                filesystem: row
                    .get("FileSystem")
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty()),
                size: row
                    .get("Size")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0),
            })
        })
        .collect()
}

// ============================================================================
// UNIT TESTS
// ============================================================================
