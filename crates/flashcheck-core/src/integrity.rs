//! Integrity verifier.
//!
//! Writes every configured pattern to several files, digests the data before
//! writing, reads each file back and compares digests. A mismatch is a data
//! point, not an error, and an I/O error on one file is recorded the same
//! way: the run continues with the remaining files.

use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::artifact::{artifact_path, ArtifactGuard, ArtifactKind};
use crate::config::TestConfig;
use crate::digest::{digest, Checksum, DigestAlgorithm};
use crate::error::Result;
use crate::pattern::{generate, TestPattern};
use crate::phase::{report, CancelToken, Phase, PhaseOutcome, PhaseProgress, ProgressCallback};
use crate::units::duration_serde;
use crate::volume::Volume;

/// Counts collected by the integrity verifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityResult {
    /// Patterns visited
    pub patterns_tested: u32,
    /// Files successfully written and synced
    pub files_created: u32,
    /// Files whose read-back digest matched
    pub verification_passed: u32,
    /// Files that mismatched, read short, or hit an I/O error
    pub verification_failed: u32,
    /// One line per failed file
    pub error_messages: Vec<String>,
    /// Size of each test file in bytes
    pub file_size: u64,
    /// Digest used for comparison
    pub digest_algorithm: DigestAlgorithm,
    /// Total run duration
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
}

impl IntegrityResult {
    fn new(file_size: u64, digest_algorithm: DigestAlgorithm) -> Self {
        Self {
            patterns_tested: 0,
            files_created: 0,
            verification_passed: 0,
            verification_failed: 0,
            error_messages: Vec::new(),
            file_size,
            digest_algorithm,
            elapsed: Duration::ZERO,
        }
    }

    /// Files that were read back and judged
    pub fn files_verified(&self) -> u32 {
        self.verification_passed + self.verification_failed
    }

    /// Whether every verified file matched
    pub fn is_clean(&self) -> bool {
        self.verification_failed == 0 && self.error_messages.is_empty()
    }
}

enum UnitCheck {
    Match,
    Mismatch {
        expected: Checksum,
        actual: Checksum,
        bytes_read: usize,
    },
}

/// Runs the integrity check against a volume
pub struct IntegrityVerifier<'a> {
    volume: &'a dyn Volume,
    config: TestConfig,
    cancel: CancelToken,
    progress_callback: Option<ProgressCallback>,
}

impl<'a> IntegrityVerifier<'a> {
    /// Create a verifier for `volume`
    pub fn new(volume: &'a dyn Volume, config: TestConfig) -> Self {
        Self {
            volume,
            config,
            cancel: CancelToken::new(),
            progress_callback: None,
        }
    }

    /// Share an existing cancellation token
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set progress callback
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&PhaseProgress) + Send + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Get a handle to cancel the run
    pub fn cancel_handle(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the integrity check.
    ///
    /// Every unit is judged even when some hit I/O errors; such a run comes
    /// back as `Partial` carrying the error list. Cancellation also yields
    /// `Partial`, and `Failed` means the run directory could not be created.
    pub fn run(&mut self) -> PhaseOutcome<IntegrityResult> {
        if let Err(e) = self.config.validate() {
            return PhaseOutcome::Failed(e);
        }

        let volume = self.volume;
        let dir = artifact_path(volume, ArtifactKind::IntegrityDir);
        if let Err(e) = volume.create_dir(&dir) {
            tracing::error!("Could not create {}: {}", dir.display(), e);
            return PhaseOutcome::Failed(e);
        }
        let guard = ArtifactGuard::dir(volume, dir, self.config.delete_temp_files);

        let start = Instant::now();
        let patterns = self.config.patterns.clone();
        let files_per_pattern = self.config.files_per_pattern;
        let total_units = patterns.len() as u64 * u64::from(files_per_pattern);
        let mut result = IntegrityResult::new(
            self.config.integrity_file_size as u64,
            self.config.digest_algorithm,
        );
        let mut cancelled = false;
        let mut io_errors = false;

        tracing::info!(
            "Starting integrity test: {} patterns x {} files of {} bytes",
            patterns.len(),
            files_per_pattern,
            self.config.integrity_file_size
        );

        'patterns: for pattern in patterns {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            result.patterns_tested += 1;

            for n in 0..files_per_pattern {
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    break 'patterns;
                }

                let name = format!("{}_test_{}.dat", pattern, n);
                let path = guard.path().join(&name);
                match self.verify_unit(&path, pattern, &mut result.files_created) {
                    Ok(UnitCheck::Match) => {
                        result.verification_passed += 1;
                        tracing::debug!("{} verified", name);
                    }
                    Ok(UnitCheck::Mismatch {
                        expected,
                        actual,
                        bytes_read,
                    }) => {
                        result.verification_failed += 1;
                        let message = format!(
                            "Hash mismatch in {}: expected {}, got {} ({} of {} bytes read back)",
                            name,
                            expected.short_hex(),
                            actual.short_hex(),
                            bytes_read,
                            self.config.integrity_file_size
                        );
                        tracing::error!("{}", message);
                        result.error_messages.push(message);
                    }
                    Err(e) => {
                        result.verification_failed += 1;
                        let message = format!("Error testing {}: {}", name, e);
                        tracing::error!("{}", message);
                        result.error_messages.push(message);
                        io_errors = true;
                    }
                }

                report(
                    &mut self.progress_callback,
                    PhaseProgress {
                        phase: Phase::Integrity,
                        completed: u64::from(result.files_verified()),
                        total: total_units,
                        bytes: u64::from(result.files_created) * result.file_size * 2,
                        elapsed: start.elapsed(),
                        step: name,
                    },
                );
            }
        }

        result.elapsed = start.elapsed();
        drop(guard);

        tracing::info!(
            "Integrity test finished: {} passed, {} failed",
            result.verification_passed,
            result.verification_failed
        );

        if cancelled || io_errors {
            PhaseOutcome::Partial { result, cancelled }
        } else {
            PhaseOutcome::Complete(result)
        }
    }

    /// Write, sync, read back and compare one file
    fn verify_unit(
        &self,
        path: &Path,
        pattern: TestPattern,
        files_created: &mut u32,
    ) -> Result<UnitCheck> {
        let algorithm = self.config.digest_algorithm;
        let data = generate(pattern, self.config.integrity_file_size);
        let expected = digest(algorithm, &data);

        let mut file = self.volume.create_file(path)?;
        file.write_all(&data)?;
        file.sync()?;
        drop(file);
        *files_created += 1;

        let mut read_back = Vec::with_capacity(data.len());
        self.volume.open_file(path)?.read_to_end(&mut read_back)?;
        let actual = digest(algorithm, &read_back);

        if actual.matches(&expected) {
            Ok(UnitCheck::Match)
        } else {
            Ok(UnitCheck::Mismatch {
                expected,
                actual,
                bytes_read: read_back.len(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{Fault, MemoryVolume};

    fn small_config() -> TestConfig {
        TestConfig::new().integrity_file_size(4096)
    }

    #[test]
    fn test_all_units_pass() {
        let vol = MemoryVolume::new("/mnt/mem", 1024 * 1024);
        let outcome = IntegrityVerifier::new(&vol, small_config()).run();

        let result = match outcome {
            PhaseOutcome::Complete(result) => result,
            other => panic!("unexpected outcome: {}", other.status()),
        };
        assert_eq!(result.patterns_tested, 5);
        assert_eq!(result.files_created, 15);
        assert_eq!(result.verification_passed, 15);
        assert_eq!(result.verification_failed, 0);
        assert!(result.is_clean());
    }

    #[test]
    fn test_corrupted_file_is_counted_and_run_continues() {
        let vol = MemoryVolume::new("/mnt/mem", 1024 * 1024).with_fault(Fault::ZeroRange {
            file: "ones_test_1.dat".to_string(),
            range: 100..101,
        });
        let outcome = IntegrityVerifier::new(&vol, small_config()).run();

        assert!(outcome.is_complete());
        let result = outcome.into_result().unwrap();
        assert_eq!(result.verification_passed, 14);
        assert_eq!(result.verification_failed, 1);
        assert_eq!(result.error_messages.len(), 1);
        assert!(result.error_messages[0].contains("Hash mismatch in ones_test_1.dat"));
    }

    #[test]
    fn test_truncated_read_is_a_failure() {
        let vol = MemoryVolume::new("/mnt/mem", 1024 * 1024).with_fault(Fault::Truncate {
            file: "random_test_2.dat".to_string(),
            len: 1000,
        });
        let result = IntegrityVerifier::new(&vol, small_config())
            .run()
            .into_result()
            .unwrap();
        assert_eq!(result.verification_failed, 1);
        assert!(result.error_messages[0].contains("1000 of 4096 bytes"));
    }

    #[test]
    fn test_zero_pattern_corruption_is_invisible() {
        // Zeroing data that is already zero cannot be detected
        let vol = MemoryVolume::new("/mnt/mem", 1024 * 1024).with_fault(Fault::ZeroRange {
            file: "zeros_test_0.dat".to_string(),
            range: 0..4096,
        });
        let result = IntegrityVerifier::new(&vol, small_config())
            .run()
            .into_result()
            .unwrap();
        assert_eq!(result.verification_failed, 0);
    }

    #[test]
    fn test_io_error_is_recorded_and_remaining_units_run() {
        let vol = MemoryVolume::new("/mnt/mem", 1024 * 1024).with_fault(Fault::FailWrites {
            file: "zeros_test_1".to_string(),
            after: 0,
        });
        let outcome = IntegrityVerifier::new(&vol, small_config()).run();

        match outcome {
            PhaseOutcome::Partial { result, cancelled } => {
                assert!(!cancelled);
                assert_eq!(result.patterns_tested, 5);
                assert_eq!(result.files_verified(), 15);
                assert_eq!(result.verification_passed, 14);
                assert_eq!(result.verification_failed, 1);
                assert_eq!(result.files_created, 14);
                assert_eq!(result.error_messages.len(), 1);
                assert!(result.error_messages[0].starts_with("Error testing zeros_test_1.dat"));
            }
            other => panic!("unexpected outcome: {}", other.status()),
        }
    }

    #[test]
    fn test_io_errors_in_several_patterns_are_all_reported() {
        let vol = MemoryVolume::new("/mnt/mem", 1024 * 1024)
            .with_fault(Fault::FailWrites {
                file: "alternating_test_0".to_string(),
                after: 0,
            })
            .with_fault(Fault::FailWrites {
                file: "incremental_test_2".to_string(),
                after: 0,
            });
        let result = IntegrityVerifier::new(&vol, small_config())
            .run()
            .into_result()
            .unwrap();

        assert_eq!(result.files_verified(), 15);
        assert_eq!(result.verification_failed, 2);
        assert!(!result.is_clean());
    }

    #[test]
    fn test_cancel_stops_between_units() {
        let vol = MemoryVolume::new("/mnt/mem", 1024 * 1024);
        let verifier = IntegrityVerifier::new(&vol, small_config());
        let cancel = verifier.cancel_handle();
        let mut verifier = verifier.on_progress(move |p| {
            if p.completed == 4 {
                cancel.cancel();
            }
        });

        match verifier.run() {
            PhaseOutcome::Partial { result, cancelled } => {
                assert!(cancelled);
                assert_eq!(result.files_verified(), 4);
                assert!(result.error_messages.is_empty());
            }
            other => panic!("unexpected outcome: {}", other.status()),
        }
    }

    #[test]
    fn test_directory_removed_after_run() {
        let vol = MemoryVolume::new("/mnt/mem", 1024 * 1024);
        IntegrityVerifier::new(&vol, small_config()).run();
        assert!(vol.file_paths().is_empty());
    }

    #[test]
    fn test_directory_kept_when_configured() {
        let vol = MemoryVolume::new("/mnt/mem", 1024 * 1024);
        IntegrityVerifier::new(&vol, small_config().delete_temp_files(false)).run();

        let paths = vol.file_paths();
        assert_eq!(paths.len(), 15);
        let parent = paths[0].parent().unwrap().file_name().unwrap();
        assert!(parent.to_string_lossy().starts_with("integrity_test_"));
    }

    #[test]
    fn test_back_to_back_kept_runs_do_not_collide() {
        let vol = MemoryVolume::new("/mnt/mem", 1024 * 1024);
        let config = small_config().delete_temp_files(false);

        assert!(IntegrityVerifier::new(&vol, config.clone()).run().is_complete());
        assert!(IntegrityVerifier::new(&vol, config).run().is_complete());

        let paths = vol.file_paths();
        assert_eq!(paths.len(), 30);
        let dirs: std::collections::HashSet<_> = paths.iter().filter_map(|p| p.parent()).collect();
        assert_eq!(dirs.len(), 2);
    }

    #[test]
    fn test_run_fails_without_directory() {
        let vol = MemoryVolume::new("/mnt/mem", 1024).with_fault(Fault::FailCreate {
            file: "integrity_test_".to_string(),
        });
        let outcome = IntegrityVerifier::new(&vol, small_config()).run();
        assert!(matches!(outcome, PhaseOutcome::Failed(_)));
    }
}
