//! Capacity verifier, the fake-capacity detector.
//!
//! Counterfeit drives report more space than they have and silently drop or
//! wrap writes past their real size. Filling a large share of free space and
//! reading it back exposes them.
//!
//! - **Fast**: min(10% of free space, 1 GB) in 1 MB blocks, one random block
//!   reused for every write, then a verify pass comparing per-block digests.
//! - **Full**: 90% of free space in 100 MB blocks of fresh random data.
//!   There is no verify pass in this mode.

use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::artifact::{artifact_path, ArtifactGuard, ArtifactKind};
use crate::config::TestConfig;
use crate::digest::{digest, read_full, Checksum};
use crate::phase::{report, CancelToken, Phase, PhaseOutcome, PhaseProgress, ProgressCallback};
use crate::pattern::{fill, generate, TestPattern};
use crate::units::{duration_serde, throughput_mb_s};
use crate::volume::{Volume, VolumeFile};

/// Which capacity check to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityMode {
    /// Bounded write with verify pass
    Fast,
    /// Near-total write without verify pass
    Full,
}

impl CapacityMode {
    fn artifact_kind(self) -> ArtifactKind {
        match self {
            CapacityMode::Fast => ArtifactKind::CapacityFile,
            CapacityMode::Full => ArtifactKind::FullCapacityFile,
        }
    }
}

impl std::fmt::Display for CapacityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapacityMode::Fast => write!(f, "fast"),
            CapacityMode::Full => write!(f, "full"),
        }
    }
}

/// How much a capacity run will write, derived from free space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityPlan {
    /// Mode the plan was made for
    pub mode: CapacityMode,
    /// Free space observed when planning
    pub free_space: u64,
    /// Bytes the run is allowed to use
    pub test_size: u64,
    /// Block size in bytes
    pub block_size: u64,
    /// Whole blocks that fit in `test_size`
    pub blocks: u64,
}

impl CapacityPlan {
    /// Plan a run for `free_space` bytes
    pub fn new(mode: CapacityMode, free_space: u64, config: &TestConfig) -> Self {
        let (fraction, block_size) = match mode {
            CapacityMode::Fast => (config.fast_fraction, config.fast_block_size as u64),
            CapacityMode::Full => (config.full_fraction, config.full_block_size as u64),
        };

        let mut test_size = (free_space as f64 * fraction).floor() as u64;
        if mode == CapacityMode::Fast {
            test_size = test_size.min(config.fast_max_bytes);
        }
        if let Some(limit) = config.capacity_size_limit {
            test_size = test_size.min(limit);
        }

        let blocks = if block_size == 0 {
            0
        } else {
            test_size / block_size
        };

        Self {
            mode,
            free_space,
            test_size,
            block_size,
            blocks,
        }
    }
}

/// Measurements from a capacity run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityResult {
    /// Mode that ran
    pub mode: CapacityMode,
    /// Bytes the plan allowed
    pub planned_bytes: u64,
    /// Bytes actually written
    pub total_bytes_tested: u64,
    /// Block size in bytes
    pub block_size: u64,
    /// Blocks the plan called for
    pub blocks_planned: u64,
    /// Blocks written and flushed
    pub blocks_written: u64,
    /// Blocks read back with a matching digest
    pub blocks_verified: u64,
    /// Write throughput in MB/s
    pub write_speed_mb_s: f64,
    /// Read-back throughput in MB/s
    pub verify_speed_mb_s: f64,
    /// Whether a verify pass ran
    pub verify_performed: bool,
    /// One line per failed block or aborted step
    pub error_messages: Vec<String>,
    /// Total run duration
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
}

impl CapacityResult {
    fn from_plan(plan: &CapacityPlan) -> Self {
        Self {
            mode: plan.mode,
            planned_bytes: plan.test_size,
            total_bytes_tested: 0,
            block_size: plan.block_size,
            blocks_planned: plan.blocks,
            blocks_written: 0,
            blocks_verified: 0,
            write_speed_mb_s: 0.0,
            verify_speed_mb_s: 0.0,
            verify_performed: false,
            error_messages: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Written blocks that failed verification
    pub fn blocks_failed(&self) -> u64 {
        if self.verify_performed {
            self.blocks_written.saturating_sub(self.blocks_verified)
        } else {
            0
        }
    }

    /// Whether the run found no problems
    pub fn is_clean(&self) -> bool {
        self.error_messages.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Finished,
    Cancelled,
    Aborted,
}

/// Runs a capacity check against a volume
pub struct CapacityVerifier<'a> {
    volume: &'a dyn Volume,
    config: TestConfig,
    mode: CapacityMode,
    cancel: CancelToken,
    progress_callback: Option<ProgressCallback>,
}

impl<'a> CapacityVerifier<'a> {
    /// Create a verifier for `volume`
    pub fn new(volume: &'a dyn Volume, config: TestConfig, mode: CapacityMode) -> Self {
        Self {
            volume,
            config,
            mode,
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

    /// Plan the run from the volume's current free space
    pub fn plan(&self) -> crate::Result<CapacityPlan> {
        let free = self.volume.free_space()?;
        Ok(CapacityPlan::new(self.mode, free, &self.config))
    }

    /// Run the capacity check
    pub fn run(&mut self) -> PhaseOutcome<CapacityResult> {
        if let Err(e) = self.config.validate() {
            return PhaseOutcome::Failed(e);
        }

        let plan = match self.plan() {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!("Could not read free space: {}", e);
                return PhaseOutcome::Failed(e);
            }
        };

        let start = Instant::now();
        let mut result = CapacityResult::from_plan(&plan);

        if plan.blocks == 0 {
            tracing::info!(
                "Free space ({} bytes) is smaller than one {} byte block, nothing to test",
                plan.free_space,
                plan.block_size
            );
            return PhaseOutcome::Complete(result);
        }

        let volume = self.volume;
        let guard = ArtifactGuard::file(
            volume,
            artifact_path(volume, self.mode.artifact_kind()),
            self.config.delete_temp_files,
        );

        tracing::info!(
            "Starting {} capacity test: {} blocks of {} bytes ({} of {} bytes free)",
            self.mode,
            plan.blocks,
            plan.block_size,
            plan.test_size,
            plan.free_space
        );

        let mut file = match volume.create_file(guard.path()) {
            Ok(file) => file,
            Err(e) => {
                tracing::error!("Could not create {}: {}", guard.path().display(), e);
                return PhaseOutcome::Failed(e);
            }
        };

        let reference = match self.mode {
            CapacityMode::Fast => Some(generate(TestPattern::Random, plan.block_size as usize)),
            CapacityMode::Full => None,
        };

        let mut stop = self.write_pass(file.as_mut(), &plan, reference.as_deref(), &mut result);
        drop(file);

        if stop == Stop::Finished {
            if let Some(reference) = reference.as_deref() {
                stop = self.verify_pass(guard.path(), &plan, reference, &mut result);
            }
        }

        result.elapsed = start.elapsed();
        drop(guard);

        tracing::info!(
            "Capacity test finished: {} blocks written, {} verified, {} errors",
            result.blocks_written,
            result.blocks_verified,
            result.error_messages.len()
        );

        match stop {
            Stop::Finished => PhaseOutcome::Complete(result),
            Stop::Cancelled => PhaseOutcome::Partial {
                result,
                cancelled: true,
            },
            Stop::Aborted => PhaseOutcome::Partial {
                result,
                cancelled: false,
            },
        }
    }

    fn write_pass(
        &mut self,
        file: &mut dyn VolumeFile,
        plan: &CapacityPlan,
        reference: Option<&[u8]>,
        result: &mut CapacityResult,
    ) -> Stop {
        let mut scratch = match reference {
            Some(_) => Vec::new(),
            None => vec![0u8; plan.block_size as usize],
        };
        let start = Instant::now();
        let mut since_sync = 0u64;
        let mut stop = Stop::Finished;

        for index in 0..plan.blocks {
            if self.cancel.is_cancelled() {
                tracing::warn!("Capacity write cancelled at block {}", index);
                stop = Stop::Cancelled;
                break;
            }

            let block: &[u8] = match reference {
                Some(block) => block,
                None => {
                    fill(TestPattern::Random, &mut scratch);
                    &scratch
                }
            };

            if let Err(e) = file.write_all(block).and_then(|()| file.flush()) {
                let message = format!("Write failed at block {}: {}", index, e);
                tracing::error!("{}", message);
                result.error_messages.push(message);
                stop = Stop::Aborted;
                break;
            }
            result.blocks_written += 1;
            since_sync += plan.block_size;

            if since_sync >= self.config.sync_interval {
                if let Err(e) = file.sync() {
                    let message = format!("Sync failed after block {}: {}", index, e);
                    tracing::error!("{}", message);
                    result.error_messages.push(message);
                    stop = Stop::Aborted;
                    break;
                }
                since_sync = 0;
            }

            report(
                &mut self.progress_callback,
                PhaseProgress {
                    phase: Phase::CapacityWrite,
                    completed: result.blocks_written,
                    total: plan.blocks,
                    bytes: result.blocks_written * plan.block_size,
                    elapsed: start.elapsed(),
                    step: format!("block {}", index),
                },
            );
        }

        if stop == Stop::Finished && since_sync > 0 {
            if let Err(e) = file.sync() {
                let message = format!("Final sync failed: {}", e);
                tracing::error!("{}", message);
                result.error_messages.push(message);
                stop = Stop::Aborted;
            }
        }

        result.total_bytes_tested = result.blocks_written * plan.block_size;
        result.write_speed_mb_s = throughput_mb_s(result.total_bytes_tested, start.elapsed());
        stop
    }

    fn verify_pass(
        &mut self,
        path: &Path,
        plan: &CapacityPlan,
        reference: &[u8],
        result: &mut CapacityResult,
    ) -> Stop {
        let expected: Checksum = digest(self.config.digest_algorithm, reference);
        result.verify_performed = true;

        let mut file = match self.volume.open_file(path) {
            Ok(file) => file,
            Err(e) => {
                let message = format!("Could not reopen {}: {}", path.display(), e);
                tracing::error!("{}", message);
                result.error_messages.push(message);
                return Stop::Aborted;
            }
        };

        let mut buf = vec![0u8; plan.block_size as usize];
        let start = Instant::now();
        let mut bytes_read = 0u64;
        let mut stop = Stop::Finished;

        for index in 0..result.blocks_written {
            if self.cancel.is_cancelled() {
                tracing::warn!("Capacity verify cancelled at block {}", index);
                stop = Stop::Cancelled;
                break;
            }

            match read_full(file.as_mut(), &mut buf) {
                Ok(n) if n == buf.len() => {
                    bytes_read += n as u64;
                    let actual = digest(self.config.digest_algorithm, &buf);
                    if actual.matches(&expected) {
                        result.blocks_verified += 1;
                    } else {
                        let message = format!(
                            "Verification failed at block {}: expected {}, got {}",
                            index,
                            expected.short_hex(),
                            actual.short_hex()
                        );
                        tracing::error!("{}", message);
                        result.error_messages.push(message);
                    }
                }
                Ok(n) => {
                    bytes_read += n as u64;
                    let message = format!(
                        "Verification failed at block {}: short read of {} bytes",
                        index, n
                    );
                    tracing::error!("{}", message);
                    result.error_messages.push(message);
                }
                Err(e) => {
                    let message = format!("Read failed at block {}: {}", index, e);
                    tracing::error!("{}", message);
                    result.error_messages.push(message);
                    stop = Stop::Aborted;
                    break;
                }
            }

            report(
                &mut self.progress_callback,
                PhaseProgress {
                    phase: Phase::CapacityVerify,
                    completed: index + 1,
                    total: result.blocks_written,
                    bytes: bytes_read,
                    elapsed: start.elapsed(),
                    step: format!("block {}", index),
                },
            );
        }

        result.verify_speed_mb_s = throughput_mb_s(bytes_read, start.elapsed());
        stop
    }
}
