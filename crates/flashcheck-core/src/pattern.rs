//! Test data patterns.
//!
//! Every integrity unit and capacity block is filled from one of these
//! patterns. Constant patterns catch stuck bits, `Incremental` catches
//! address-line faults, and `Random` defeats controllers that compress or
//! deduplicate.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Named byte pattern used to fill test data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestPattern {
    /// Every byte is 0x00
    Zeros,
    /// Every byte is 0xFF
    Ones,
    /// Every byte is 0xAA (10101010)
    Alternating,
    /// Fresh uniformly random bytes on every call
    Random,
    /// Byte `i` is `i mod 256`
    Incremental,
}

impl TestPattern {
    /// All patterns, in the order integrity runs visit them
    pub fn all() -> &'static [TestPattern] {
        &[
            TestPattern::Zeros,
            TestPattern::Ones,
            TestPattern::Alternating,
            TestPattern::Random,
            TestPattern::Incremental,
        ]
    }

    /// Lowercase name used in file names and reports
    pub fn name(&self) -> &'static str {
        match self {
            TestPattern::Zeros => "zeros",
            TestPattern::Ones => "ones",
            TestPattern::Alternating => "alternating",
            TestPattern::Random => "random",
            TestPattern::Incremental => "incremental",
        }
    }

    /// Fill byte for the constant patterns
    pub fn fill_byte(&self) -> Option<u8> {
        match self {
            TestPattern::Zeros => Some(0x00),
            TestPattern::Ones => Some(0xFF),
            TestPattern::Alternating => Some(0xAA),
            TestPattern::Random | TestPattern::Incremental => None,
        }
    }
}

impl std::fmt::Display for TestPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for TestPattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "zeros" | "zero" => Ok(TestPattern::Zeros),
            "ones" | "one" => Ok(TestPattern::Ones),
            "alternating" | "alt" => Ok(TestPattern::Alternating),
            "random" => Ok(TestPattern::Random),
            "incremental" | "inc" => Ok(TestPattern::Incremental),
            _ => Err(Error::InvalidConfig(format!(
                "Unknown pattern '{}'. Use: zeros, ones, alternating, random, or incremental",
                s
            ))),
        }
    }
}

/// Generate exactly `size` bytes of `pattern`
pub fn generate(pattern: TestPattern, size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; size];
    fill(pattern, &mut buf);
    buf
}

/// Fill an existing buffer with `pattern`
pub fn fill(pattern: TestPattern, buf: &mut [u8]) {
    match pattern {
        TestPattern::Random => rand::thread_rng().fill_bytes(buf),
        TestPattern::Incremental => {
            for (i, byte) in buf.iter_mut().enumerate() {
                *byte = (i % 256) as u8;
            }
        }
        TestPattern::Zeros | TestPattern::Ones | TestPattern::Alternating => {
            buf.fill(pattern.fill_byte().unwrap_or_default());
        }
    }
}
