//! Runtime configuration threaded into every test phase

use crate::digest::DigestAlgorithm;
use crate::error::{Error, Result};
use crate::pattern::TestPattern;
use crate::units::{GIB, KIB, MIB};
use std::time::Duration;

/// Default block size for the speed probe (10 MB)
pub const DEFAULT_SPEED_BLOCK_SIZE: usize = 10 * MIB as usize;

/// Default size of each integrity test file (1 MB)
pub const DEFAULT_INTEGRITY_FILE_SIZE: usize = MIB as usize;

/// Default block size for the fast capacity check (1 MB)
pub const DEFAULT_FAST_BLOCK_SIZE: usize = MIB as usize;

/// Default block size for the full capacity check (100 MB)
pub const DEFAULT_FULL_BLOCK_SIZE: usize = 100 * MIB as usize;

/// Upper bound on the fast capacity test size (1 GB)
pub const DEFAULT_FAST_MAX_BYTES: u64 = GIB;

/// Smallest sub-block used for random access probing
pub const MIN_RANDOM_BLOCK_SIZE: usize = 4 * KIB as usize;

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Block size for sequential speed trials
    pub speed_block_size: usize,

    /// Number of sequential read/write trials
    pub speed_iterations: u32,

    /// Pause between speed trials
    pub trial_pause: Duration,

    /// Number of random-offset writes and reads
    pub random_ops: u32,

    /// Number of single-byte access time samples
    pub access_samples: u32,

    /// Size of each integrity test file
    pub integrity_file_size: usize,

    /// Files written per pattern
    pub files_per_pattern: u32,

    /// Patterns visited by the integrity verifier
    pub patterns: Vec<TestPattern>,

    /// Block size for the fast capacity check
    pub fast_block_size: usize,

    /// Block size for the full capacity check
    pub full_block_size: usize,

    /// Fraction of free space used by the fast capacity check
    pub fast_fraction: f64,

    /// Upper bound on the fast capacity test size
    pub fast_max_bytes: u64,

    /// Fraction of free space used by the full capacity check
    pub full_fraction: f64,

    /// Optional extra cap on capacity test size
    pub capacity_size_limit: Option<u64>,

    /// Capacity writes are fsynced at least this often
    pub sync_interval: u64,

    /// Digest used for integrity and capacity verification
    pub digest_algorithm: DigestAlgorithm,

    /// Delete on-device artifacts when a phase ends
    pub delete_temp_files: bool,

    /// Reformat the drive after a destructive run
    pub restore_after_test: bool,

    /// Upper bound on how long a format command may run
    pub format_timeout: Duration,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            speed_block_size: DEFAULT_SPEED_BLOCK_SIZE,
            speed_iterations: 5,
            trial_pause: Duration::from_millis(100),
            random_ops: 10,
            access_samples: 100,
            integrity_file_size: DEFAULT_INTEGRITY_FILE_SIZE,
            files_per_pattern: 3,
            patterns: TestPattern::all().to_vec(),
            fast_block_size: DEFAULT_FAST_BLOCK_SIZE,
            full_block_size: DEFAULT_FULL_BLOCK_SIZE,
            fast_fraction: 0.10,
            fast_max_bytes: DEFAULT_FAST_MAX_BYTES,
            full_fraction: 0.90,
            capacity_size_limit: None,
            sync_interval: 64 * MIB,
            digest_algorithm: DigestAlgorithm::Sha256,
            delete_temp_files: true,
            restore_after_test: true,
            format_timeout: Duration::from_secs(120),
        }
    }
}

impl TestConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the speed probe block size
    pub fn speed_block_size(mut self, size: usize) -> Self {
        self.speed_block_size = size;
        self
    }

    /// Set the number of speed trials
    pub fn speed_iterations(mut self, iterations: u32) -> Self {
        self.speed_iterations = iterations;
        self
    }

    /// Set the pause between speed trials
    pub fn trial_pause(mut self, pause: Duration) -> Self {
        self.trial_pause = pause;
        self
    }

    /// Set the number of random-offset operations
    pub fn random_ops(mut self, ops: u32) -> Self {
        self.random_ops = ops;
        self
    }

    /// Set the number of access time samples
    pub fn access_samples(mut self, samples: u32) -> Self {
        self.access_samples = samples;
        self
    }

    /// Set the integrity file size
    pub fn integrity_file_size(mut self, size: usize) -> Self {
        self.integrity_file_size = size;
        self
    }

    /// Set the number of files written per pattern
    pub fn files_per_pattern(mut self, files: u32) -> Self {
        self.files_per_pattern = files;
        self
    }

    /// Restrict the integrity verifier to these patterns
    pub fn patterns(mut self, patterns: Vec<TestPattern>) -> Self {
        self.patterns = patterns;
        self
    }

    /// Set the fast capacity block size
    pub fn fast_block_size(mut self, size: usize) -> Self {
        self.fast_block_size = size;
        self
    }

    /// Set the full capacity block size
    pub fn full_block_size(mut self, size: usize) -> Self {
        self.full_block_size = size;
        self
    }

    /// Set the fast capacity upper bound
    pub fn fast_max_bytes(mut self, bytes: u64) -> Self {
        self.fast_max_bytes = bytes;
        self
    }

    /// Cap the capacity test size
    pub fn capacity_size_limit(mut self, limit: Option<u64>) -> Self {
        self.capacity_size_limit = limit;
        self
    }

    /// Set how often capacity writes are fsynced
    pub fn sync_interval(mut self, bytes: u64) -> Self {
        self.sync_interval = bytes;
        self
    }

    /// Set the digest algorithm
    pub fn digest_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = algorithm;
        self
    }

    /// Set whether on-device artifacts are deleted
    pub fn delete_temp_files(mut self, delete: bool) -> Self {
        self.delete_temp_files = delete;
        self
    }

    /// Set whether the drive is reformatted after destructive runs
    pub fn restore_after_test(mut self, restore: bool) -> Self {
        self.restore_after_test = restore;
        self
    }

    /// Set the format command timeout
    pub fn format_timeout(mut self, timeout: Duration) -> Self {
        self.format_timeout = timeout;
        self
    }

    /// Sub-block size used by random access probing
    pub fn random_block_size(&self) -> usize {
        (self.speed_block_size / 10).max(MIN_RANDOM_BLOCK_SIZE)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.speed_block_size == 0
            || self.integrity_file_size == 0
            || self.fast_block_size == 0
            || self.full_block_size == 0
        {
            return Err(Error::InvalidConfig(
                "Block and file sizes must be non-zero".to_string(),
            ));
        }

        if self.speed_iterations == 0 {
            return Err(Error::InvalidConfig(
                "Speed iterations must be at least 1".to_string(),
            ));
        }

        if self.files_per_pattern == 0 || self.patterns.is_empty() {
            return Err(Error::InvalidConfig(
                "Integrity check needs at least one pattern and one file".to_string(),
            ));
        }

        for (name, fraction) in [
            ("fast_fraction", self.fast_fraction),
            ("full_fraction", self.full_fraction),
        ] {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(Error::InvalidConfig(format!(
                    "{} must be in (0, 1], got {}",
                    name, fraction
                )));
            }
        }

        Ok(())
    }
}
