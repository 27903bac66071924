//! Fuzz test for PowerShell CSV parsing
//!
//! Field splitting must never panic and must return at least one field.

#![no_main]

use flashcheck_detect::parse::{parse_csv_line, parse_logical_disks};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    for line in data.lines() {
        assert!(!parse_csv_line(line).is_empty());
    }

    for disk in parse_logical_disks(data) {
        assert!(!disk.device_id.is_empty());
        let _ = disk.is_removable();
    }
});
