//! Fuzz test for volume label sanitizing and format command building
//!
//! Any label must yield a non-empty label within the filesystem's limit, and
//! building command lines must never panic.

#![no_main]

use arbitrary::Arbitrary;
use flashcheck_core::FilesystemKind;
use flashcheck_platform::{
    format_commands_linux, format_commands_macos, format_commands_windows, sanitize_label,
    FormatRequest,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    label: String,
    mount: String,
    device: Option<String>,
    filesystem: u8,
}

fuzz_target!(|input: Input| {
    let filesystem = match input.filesystem % 7 {
        0 => FilesystemKind::Fat32,
        1 => FilesystemKind::ExFat,
        2 => FilesystemKind::Ntfs,
        3 => FilesystemKind::Ext4,
        4 => FilesystemKind::Hfs,
        5 => FilesystemKind::Apfs,
        _ => FilesystemKind::Other(input.label.clone()),
    };

    let label = sanitize_label(&input.label, &filesystem);
    assert!(!label.is_empty());
    assert!(label.chars().count() <= filesystem.max_label_len());

    let mut request = FormatRequest::new(input.mount.as_str(), filesystem, &input.label);
    if let Some(device) = input.device {
        request = request.with_device(device);
    }
    let _ = format_commands_linux(&request);
    let _ = format_commands_macos(&request);
    let _ = format_commands_windows(&request);
});
