//! Speed probe for mounted drives.
//!
//! Measures sequential write and read throughput, random-offset throughput
//! and single-byte access latency using one temporary file on the drive.
//! Writes are synced before the clock stops so the numbers reflect the
//! device rather than the page cache. Reads may still be served from cache;
//! that is a known limitation of probing through a mounted filesystem.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::artifact::{artifact_path, ArtifactGuard, ArtifactKind};
use crate::config::TestConfig;
use crate::digest::read_full;
use crate::error::{Error, Result};
use crate::pattern::{generate, TestPattern};
use crate::phase::{report, CancelToken, Phase, PhaseOutcome, PhaseProgress, ProgressCallback};
use crate::units::{duration_serde, mean, throughput_mb_s};
use crate::volume::Volume;

/// Averages measured by the speed probe (MB/s, MB = 2^20 bytes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedResult {
    /// Mean sequential write throughput
    pub sequential_write_avg: f64,
    /// Mean sequential read throughput
    pub sequential_read_avg: f64,
    /// Throughput derived from mean random write latency
    pub random_write_avg: f64,
    /// Throughput derived from mean random read latency
    pub random_read_avg: f64,
    /// Mean open-and-read-one-byte latency in milliseconds
    pub access_time_avg_ms: f64,
    /// Sequential block size in bytes
    pub block_size: u64,
    /// Random access sub-block size in bytes
    pub random_block_size: u64,
    /// Number of sequential trials
    pub iterations: u32,
    /// Total probe duration
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
}

/// Runs the speed probe against a volume
pub struct SpeedProber<'a> {
    volume: &'a dyn Volume,
    config: TestConfig,
    cancel: CancelToken,
    progress_callback: Option<ProgressCallback>,
}

impl<'a> SpeedProber<'a> {
    /// Create a prober for `volume`
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

    /// Get a handle to cancel the probe
    pub fn cancel_handle(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the probe.
    ///
    /// Partial speed numbers are misleading, so any I/O error or a
    /// cancellation yields [`PhaseOutcome::Failed`].
    pub fn run(&mut self) -> PhaseOutcome<SpeedResult> {
        if let Err(e) = self.config.validate() {
            return PhaseOutcome::Failed(e);
        }

        let volume = self.volume;
        let guard = ArtifactGuard::file(
            volume,
            artifact_path(volume, ArtifactKind::SpeedFile),
            self.config.delete_temp_files,
        );
        tracing::info!(
            "Starting speed test on {} ({} x {} byte blocks)",
            volume.root().display(),
            self.config.speed_iterations,
            self.config.speed_block_size
        );

        match self.probe(guard.path()) {
            Ok(result) => {
                tracing::info!(
                    "Speed test complete: write {:.2} MB/s, read {:.2} MB/s",
                    result.sequential_write_avg,
                    result.sequential_read_avg
                );
                PhaseOutcome::Complete(result)
            }
            Err(Error::Cancelled) => {
                tracing::warn!("Speed test cancelled");
                PhaseOutcome::Failed(Error::Cancelled)
            }
            Err(e) => {
                tracing::error!("Speed test failed: {}", e);
                PhaseOutcome::Failed(e)
            }
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn probe(&mut self, path: &Path) -> Result<SpeedResult> {
        let start = Instant::now();
        let iterations = self.config.speed_iterations;
        let total_steps = u64::from(iterations) + 2;
        let block = generate(TestPattern::Random, self.config.speed_block_size);
        let mut read_buf = vec![0u8; block.len()];

        let mut write_speeds = Vec::with_capacity(iterations as usize);
        let mut read_speeds = Vec::with_capacity(iterations as usize);
        let mut bytes_moved = 0u64;

        for trial in 1..=iterations {
            self.check_cancelled()?;

            let timer = Instant::now();
            let mut file = self.volume.create_file(path)?;
            file.write_all(&block)?;
            file.sync()?;
            drop(file);
            write_speeds.push(throughput_mb_s(block.len() as u64, timer.elapsed()));

            self.check_cancelled()?;

            let timer = Instant::now();
            let mut file = self.volume.open_file(path)?;
            let n = read_full(&mut file, &mut read_buf)?;
            read_speeds.push(throughput_mb_s(n as u64, timer.elapsed()));
            bytes_moved += (block.len() + n) as u64;

            tracing::debug!(
                "Trial {}/{}: write {:.2} MB/s, read {:.2} MB/s",
                trial,
                iterations,
                write_speeds.last().copied().unwrap_or_default(),
                read_speeds.last().copied().unwrap_or_default()
            );

            report(
                &mut self.progress_callback,
                PhaseProgress {
                    phase: Phase::Speed,
                    completed: u64::from(trial),
                    total: total_steps,
                    bytes: bytes_moved,
                    elapsed: start.elapsed(),
                    step: format!("sequential trial {}/{}", trial, iterations),
                },
            );

            if trial < iterations && !self.config.trial_pause.is_zero() {
                std::thread::sleep(self.config.trial_pause);
            }
        }

        self.check_cancelled()?;
        let (random_write_avg, random_read_avg) = self.random_access(path)?;
        report(
            &mut self.progress_callback,
            PhaseProgress {
                phase: Phase::Speed,
                completed: total_steps - 1,
                total: total_steps,
                bytes: bytes_moved,
                elapsed: start.elapsed(),
                step: "random access".to_string(),
            },
        );

        self.check_cancelled()?;
        let access_time_avg_ms = self.access_time(path)?;
        report(
            &mut self.progress_callback,
            PhaseProgress {
                phase: Phase::Speed,
                completed: total_steps,
                total: total_steps,
                bytes: bytes_moved,
                elapsed: start.elapsed(),
                step: "access time".to_string(),
            },
        );

        Ok(SpeedResult {
            sequential_write_avg: mean(&write_speeds),
            sequential_read_avg: mean(&read_speeds),
            random_write_avg,
            random_read_avg,
            access_time_avg_ms,
            block_size: block.len() as u64,
            random_block_size: self.config.random_block_size() as u64,
            iterations,
            elapsed: start.elapsed(),
        })
    }

    /// Write a 100-sub-block file, then time random-offset writes and reads
    fn random_access(&self, path: &Path) -> Result<(f64, f64)> {
        let sub_block = self.config.random_block_size();
        let file_size = sub_block * 100;
        let max_offset = (file_size - sub_block) as u64;
        let mut rng = rand::thread_rng();

        let mut file = self.volume.create_file(path)?;
        file.write_all(&generate(TestPattern::Random, file_size))?;
        file.sync()?;
        drop(file);

        let data = generate(TestPattern::Random, sub_block);
        let mut write_times = Vec::with_capacity(self.config.random_ops as usize);
        for _ in 0..self.config.random_ops {
            self.check_cancelled()?;
            let offset = rng.gen_range(0..=max_offset);
            let timer = Instant::now();
            let mut file = self.volume.open_file(path)?;
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&data)?;
            file.sync()?;
            write_times.push(timer.elapsed().as_secs_f64());
        }

        let mut buf = vec![0u8; sub_block];
        let mut read_times = Vec::with_capacity(self.config.random_ops as usize);
        for _ in 0..self.config.random_ops {
            self.check_cancelled()?;
            let offset = rng.gen_range(0..=max_offset);
            let timer = Instant::now();
            let mut file = self.volume.open_file(path)?;
            file.seek(SeekFrom::Start(offset))?;
            read_full(&mut file, &mut buf)?;
            read_times.push(timer.elapsed().as_secs_f64());
        }

        let per_op = |times: &[f64]| {
            let avg = mean(times);
            if avg > 0.0 {
                throughput_mb_s(sub_block as u64, Duration::from_secs_f64(avg))
            } else {
                0.0
            }
        };

        Ok((per_op(&write_times), per_op(&read_times)))
    }

    /// Mean latency of opening the file and reading one byte, in ms
    fn access_time(&self, path: &Path) -> Result<f64> {
        let file_size = self.config.random_block_size() as u64 * 100;
        let mut rng = rand::thread_rng();
        let mut samples = Vec::with_capacity(self.config.access_samples as usize);
        let mut byte = [0u8; 1];

        for _ in 0..self.config.access_samples {
            self.check_cancelled()?;
            let offset = rng.gen_range(0..file_size);
            let timer = Instant::now();
            let mut file = self.volume.open_file(path)?;
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut byte)?;
            samples.push(timer.elapsed().as_secs_f64() * 1000.0);
        }

        Ok(mean(&samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{Fault, MemoryVolume};
    use std::sync::{Arc, Mutex};

    fn quick_config() -> TestConfig {
        TestConfig::new()
            .speed_block_size(64 * 1024)
            .speed_iterations(3)
            .trial_pause(Duration::ZERO)
            .random_ops(4)
            .access_samples(10)
    }

    #[test]
    fn test_speed_probe_completes() {
        let vol = MemoryVolume::new("/mnt/mem", 64 * 1024 * 1024);
        let outcome = SpeedProber::new(&vol, quick_config()).run();

        let result = match outcome {
            PhaseOutcome::Complete(result) => result,
            other => panic!("unexpected outcome: {}", other.status()),
        };
        assert!(result.sequential_write_avg > 0.0);
        assert!(result.sequential_read_avg > 0.0);
        assert!(result.random_write_avg > 0.0);
        assert!(result.random_read_avg > 0.0);
        assert!(result.access_time_avg_ms >= 0.0);
        assert_eq!(result.iterations, 3);
        assert_eq!(result.block_size, 64 * 1024);
        assert_eq!(result.random_block_size, 6553);
    }

    #[test]
    fn test_speed_probe_cleans_up() {
        let vol = MemoryVolume::new("/mnt/mem", 64 * 1024 * 1024);
        SpeedProber::new(&vol, quick_config()).run();
        assert!(vol.file_paths().is_empty());
    }

    #[test]
    fn test_speed_probe_keeps_file_when_configured() {
        let vol = MemoryVolume::new("/mnt/mem", 64 * 1024 * 1024);
        SpeedProber::new(&vol, quick_config().delete_temp_files(false)).run();

        let paths = vol.file_paths();
        assert_eq!(paths.len(), 1);
        let name = paths[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("speed_test_"));
        assert!(name.ends_with(".tmp"));
    }

    #[test]
    fn test_speed_probe_syncs_writes() {
        let vol = MemoryVolume::new("/mnt/mem", 64 * 1024 * 1024);
        SpeedProber::new(&vol, quick_config()).run();
        // 3 sequential trials, 1 random file fill, 4 random writes
        assert_eq!(vol.sync_count(), 8);
    }

    #[test]
    fn test_speed_probe_io_error_fails() {
        let vol = MemoryVolume::new("/mnt/mem", 64 * 1024 * 1024).with_fault(Fault::FailWrites {
            file: "speed_test".to_string(),
            after: 1024,
        });
        let outcome = SpeedProber::new(&vol, quick_config()).run();
        assert!(matches!(outcome, PhaseOutcome::Failed(Error::Io(_))));
        assert!(vol.file_paths().is_empty());
    }

    #[test]
    fn test_speed_probe_cancelled() {
        let vol = MemoryVolume::new("/mnt/mem", 64 * 1024 * 1024);
        let prober = SpeedProber::new(&vol, quick_config());
        let cancel = prober.cancel_handle();
        let mut prober = prober.on_progress(move |_| cancel.cancel());

        let outcome = prober.run();
        assert!(outcome.is_cancelled());
        assert!(outcome.result().is_none());
    }

    #[test]
    fn test_speed_probe_reports_progress() {
        let vol = MemoryVolume::new("/mnt/mem", 64 * 1024 * 1024);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        let mut prober = SpeedProber::new(&vol, quick_config())
            .on_progress(move |p| seen_cb.lock().unwrap().push(p.completed));

        assert!(prober.run().is_complete());
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_speed_probe_invalid_config() {
        let vol = MemoryVolume::new("/mnt/mem", 1024);
        let outcome = SpeedProber::new(&vol, quick_config().speed_iterations(0)).run();
        assert!(matches!(outcome, PhaseOutcome::Failed(Error::InvalidConfig(_))));
    }
}
