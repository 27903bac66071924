//! Fuzz test for size string parsing
//!
//! Size parsing must never panic, and accepted sizes must format back to
//! something non-empty.

#![no_main]

use flashcheck_core::{format_size, parse_size};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(size) = parse_size(data) {
        assert!(!format_size(size).is_empty());
    }

    for suffix in ["", "B", "K", "KB", "KiB", "M", "MB", "G", "GB", "k", "m", "g"] {
        let input = format!("{}{}", data.trim(), suffix);
        let _ = parse_size(&input);
    }

    let _ = parse_size(&format!("  {}  ", data));
});
