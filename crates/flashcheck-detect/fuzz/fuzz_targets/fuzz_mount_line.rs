//! Fuzz test for /proc/mounts parsing
//!
//! Mount lines and octal escapes must never panic, and every parsed entry
//! must carry a device and a mount point.

#![no_main]

use flashcheck_detect::parse::{mount_for_path, parse_mount_line, parse_mounts, unescape_mount_path};
use libfuzzer_sys::fuzz_target;
use std::path::Path;

fuzz_target!(|data: &str| {
    for line in data.lines() {
        if let Some(entry) = parse_mount_line(line) {
            assert!(!entry.device.is_empty());
        }
        assert!(unescape_mount_path(line).len() <= line.len());
    }

    let mounts = parse_mounts(data);
    if let Some(first) = mounts.first() {
        let hit = mount_for_path(&mounts, Path::new(&first.mount_point));
        assert!(hit.is_some());
    }
});
