//! Fuzz test for pattern and digest name parsing

#![no_main]

use flashcheck_core::{DigestAlgorithm, TestPattern};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    if let Ok(pattern) = data.parse::<TestPattern>() {
        // Canonical names parse back to the same pattern
        assert_eq!(pattern.name().parse::<TestPattern>().ok(), Some(pattern));
    }

    if let Ok(algorithm) = data.parse::<DigestAlgorithm>() {
        assert!(algorithm.byte_length() >= 32);
    }
});
