//! Comprehensive runs: speed, then integrity, then capacity.
//!
//! Each phase only starts if the one before it produced a result and nobody
//! cancelled. A run that finishes without cancellation is exported to the
//! configured [`ReportSink`] and, if a destructive phase ran, the drive is
//! restored through [`DriveTools`].

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::capacity::{CapacityMode, CapacityVerifier};
use crate::config::TestConfig;
use crate::drive::DriveDescriptor;
use crate::integrity::IntegrityVerifier;
use crate::phase::{CancelToken, PhaseOutcome, PhaseProgress, ProgressCallback};
use crate::report::{ComprehensiveResult, ReportSink, TestType};
use crate::restore::{capture_filesystem, restore, DriveTools};
use crate::speed::SpeedProber;
use crate::volume::Volume;

/// Which comprehensive variant to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComprehensiveMode {
    /// Fast capacity check with verification
    Fast,
    /// Full capacity check
    Detailed,
}

impl ComprehensiveMode {
    /// Capacity variant this mode runs
    pub fn capacity_mode(self) -> CapacityMode {
        match self {
            ComprehensiveMode::Fast => CapacityMode::Fast,
            ComprehensiveMode::Detailed => CapacityMode::Full,
        }
    }

    /// Report label for this mode
    pub fn test_type(self) -> TestType {
        match self {
            ComprehensiveMode::Fast => TestType::ComprehensiveFast,
            ComprehensiveMode::Detailed => TestType::ComprehensiveDetailed,
        }
    }
}

/// Result of a comprehensive run plus the report files it produced
#[derive(Debug, Clone)]
pub struct ComprehensiveRun {
    /// Aggregated phase results
    pub result: ComprehensiveResult,
    /// Files written by the report sink
    pub report_files: Vec<PathBuf>,
}

type SharedProgress = Arc<Mutex<ProgressCallback>>;

/// Sequences the three phases against one drive
pub struct ComprehensiveRunner<'a> {
    volume: &'a dyn Volume,
    config: TestConfig,
    tools: Option<&'a dyn DriveTools>,
    sink: Option<&'a dyn ReportSink>,
    cancel: CancelToken,
    progress_callback: Option<SharedProgress>,
}

impl<'a> ComprehensiveRunner<'a> {
    /// Create a runner writing to `volume`
    pub fn new(volume: &'a dyn Volume, config: TestConfig) -> Self {
        Self {
            volume,
            config,
            tools: None,
            sink: None,
            cancel: CancelToken::new(),
            progress_callback: None,
        }
    }

    /// Drive tooling used for filesystem capture and restoration
    pub fn with_tools(mut self, tools: &'a dyn DriveTools) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Where finished runs are exported
    pub fn with_sink(mut self, sink: &'a dyn ReportSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Share an existing cancellation token
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set progress callback, called for every phase
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&PhaseProgress) + Send + 'static,
    {
        self.progress_callback = Some(Arc::new(Mutex::new(Box::new(callback))));
        self
    }

    /// Get a handle to cancel the run
    pub fn cancel_handle(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run every phase against `drive`
    pub fn run(&mut self, drive: &DriveDescriptor, mode: ComprehensiveMode) -> ComprehensiveRun {
        let mut result = ComprehensiveResult::new(drive.clone(), mode.test_type());
        let filesystem_before = self.tools.and_then(|tools| capture_filesystem(tools, drive));

        tracing::info!(
            "Starting {} run on {}",
            mode.test_type(),
            drive.mount_path.display()
        );

        let outcome = SpeedProber::new(self.volume, self.config.clone())
            .with_cancel(self.cancel.clone())
            .on_progress(forward(self.progress_callback.clone()))
            .run();
        result.speed = outcome.keep_noted("Speed test", &mut result.phase_notes);

        if self.may_continue(result.speed.is_some(), "Integrity test", &mut result) {
            let outcome = IntegrityVerifier::new(self.volume, self.config.clone())
                .with_cancel(self.cancel.clone())
                .on_progress(forward(self.progress_callback.clone()))
                .run();
            result.integrity = outcome.keep_noted("Integrity test", &mut result.phase_notes);
        }

        if self.may_continue(result.integrity.is_some(), "Capacity test", &mut result) {
            let outcome =
                CapacityVerifier::new(self.volume, self.config.clone(), mode.capacity_mode())
                    .with_cancel(self.cancel.clone())
                    .on_progress(forward(self.progress_callback.clone()))
                    .run();
            result.capacity = outcome.keep_noted("Capacity test", &mut result.phase_notes);
        }

        result.cancelled = self.cancel.is_cancelled();
        let mut report_files = Vec::new();

        if result.cancelled {
            tracing::warn!("Run cancelled; skipping report export and restoration");
            return ComprehensiveRun {
                result,
                report_files,
            };
        }

        if let Some(sink) = self.sink {
            match sink.export(&result) {
                Ok(files) => report_files = files,
                Err(e) => {
                    tracing::warn!("Could not export report: {}", e);
                    result.phase_notes.push(format!("Report export failed: {}", e));
                }
            }
        }

        let destructive_ran = result.integrity.is_some() || result.capacity.is_some();
        if let Some(tools) = self.tools.filter(|_| destructive_ran) {
            if self.config.restore_after_test {
                result.restoration = Some(restore(tools, drive, filesystem_before.as_ref()));
            } else {
                tracing::info!("Restoration disabled; drive left as tested");
            }
        }

        tracing::info!(
            "{} run finished: {}",
            mode.test_type(),
            result.overall_status()
        );

        ComprehensiveRun {
            result,
            report_files,
        }
    }

    fn may_continue(
        &self,
        prior_has_result: bool,
        next: &str,
        result: &mut ComprehensiveResult,
    ) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if !prior_has_result {
            result
                .phase_notes
                .push(format!("{} skipped: previous phase produced no result", next));
            return false;
        }
        true
    }
}

fn forward(shared: Option<SharedProgress>) -> impl FnMut(&PhaseProgress) + Send + 'static {
    move |progress| {
        if let Some(callback) = &shared {
            if let Ok(mut callback) = callback.lock() {
                let callback = &mut *callback;
                callback(progress);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::FilesystemKind;
    use crate::error::Result;
    use crate::phase::Phase;
    use crate::units::MIB;
    use crate::volume::{Fault, MemoryVolume};
    use mockall::mock;
    use mockall::predicate::eq;
    use std::path::Path;
    use std::time::Duration;

    mock! {
        Tools {}
        impl DriveTools for Tools {
            fn scan(&self) -> Result<Vec<DriveDescriptor>>;
            fn filesystem_of(&self, mount: &Path) -> Result<FilesystemKind>;
            fn format(&self, mount: &Path, filesystem: &FilesystemKind, label: &str) -> Result<()>;
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        exported: Mutex<Vec<ComprehensiveResult>>,
    }

    impl ReportSink for RecordingSink {
        fn export(&self, result: &ComprehensiveResult) -> Result<Vec<PathBuf>> {
            if let Ok(mut exported) = self.exported.lock() {
                exported.push(result.clone());
            }
            Ok(vec![PathBuf::from("/reports/test_report.json")])
        }
    }

    impl RecordingSink {
        fn count(&self) -> usize {
            self.exported.lock().map(|e| e.len()).unwrap_or(0)
        }
    }

    fn config() -> TestConfig {
        TestConfig::new()
            .speed_block_size(64 * 1024)
            .speed_iterations(2)
            .trial_pause(Duration::ZERO)
            .access_samples(10)
            .integrity_file_size(4096)
            .fast_block_size(64 * 1024)
            .full_block_size(MIB as usize)
    }

    fn drive() -> DriveDescriptor {
        DriveDescriptor::new("/mnt/mem").with_label("STICK")
    }

    fn tools_expecting_format(times: usize) -> MockTools {
        let mut tools = MockTools::new();
        tools
            .expect_filesystem_of()
            .returning(|_| Ok(FilesystemKind::ExFat));
        tools
            .expect_format()
            .with(eq(Path::new("/mnt/mem")), eq(FilesystemKind::ExFat), eq("STICK"))
            .times(times)
            .returning(|_, _, _| Ok(()));
        tools
    }

    #[test]
    fn test_fast_run_all_phases() {
        let vol = MemoryVolume::new("/mnt/mem", 100 * MIB);
        let tools = tools_expecting_format(1);
        let sink = RecordingSink::default();

        let run = ComprehensiveRunner::new(&vol, config())
            .with_tools(&tools)
            .with_sink(&sink)
            .run(&drive(), ComprehensiveMode::Fast);

        let result = run.result;
        assert_eq!(result.test_type, TestType::ComprehensiveFast);
        assert!(result.speed.is_some());
        assert_eq!(result.integrity.as_ref().map(|r| r.verification_passed), Some(15));
        let capacity = result.capacity.as_ref().unwrap();
        assert!(capacity.verify_performed);
        assert_eq!(capacity.blocks_verified, capacity.blocks_written);
        assert!(!result.cancelled);
        assert!(result.phase_notes.is_empty(), "{:?}", result.phase_notes);
        assert!(result.restoration.as_ref().is_some_and(|r| r.succeeded));
        assert_eq!(sink.count(), 1);
        assert_eq!(run.report_files.len(), 1);
        assert!(vol.file_paths().is_empty());
    }

    #[test]
    fn test_detailed_run_uses_full_capacity() {
        let vol = MemoryVolume::new("/mnt/mem", 20 * MIB);
        let run = ComprehensiveRunner::new(&vol, config()).run(&drive(), ComprehensiveMode::Detailed);

        assert_eq!(run.result.test_type, TestType::ComprehensiveDetailed);
        let capacity = run.result.capacity.unwrap();
        assert_eq!(capacity.mode, CapacityMode::Full);
        assert!(!capacity.verify_performed);
        assert!(run.result.restoration.is_none());
    }

    #[test]
    fn test_cancel_skips_later_phases_export_and_restore() {
        let vol = MemoryVolume::new("/mnt/mem", 100 * MIB);
        let tools = tools_expecting_format(0);
        let sink = RecordingSink::default();

        let runner = ComprehensiveRunner::new(&vol, config())
            .with_tools(&tools)
            .with_sink(&sink);
        let cancel = runner.cancel_handle();
        let mut runner = runner.on_progress(move |p| {
            if p.phase == Phase::Integrity && p.completed == 3 {
                cancel.cancel();
            }
        });

        let result = runner.run(&drive(), ComprehensiveMode::Fast).result;
        assert!(result.cancelled);
        assert!(result.speed.is_some());
        assert_eq!(result.integrity.as_ref().map(|r| r.files_verified()), Some(3));
        assert!(result.capacity.is_none());
        assert!(result.restoration.is_none());
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_speed_failure_skips_remaining_phases() {
        let vol = MemoryVolume::new("/mnt/mem", 100 * MIB).with_fault(Fault::FailCreate {
            file: "speed_test".to_string(),
        });
        let tools = tools_expecting_format(0);
        let sink = RecordingSink::default();

        let result = ComprehensiveRunner::new(&vol, config())
            .with_tools(&tools)
            .with_sink(&sink)
            .run(&drive(), ComprehensiveMode::Fast)
            .result;

        assert!(result.is_empty());
        assert!(!result.cancelled);
        assert_eq!(result.phase_notes.len(), 3);
        assert!(result.phase_notes[0].starts_with("Speed test failed"));
        assert!(result.phase_notes[1].starts_with("Integrity test skipped"));
        assert!(result.phase_notes[2].starts_with("Capacity test skipped"));
        assert!(result.restoration.is_none());
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn test_restore_disabled() {
        let vol = MemoryVolume::new("/mnt/mem", 100 * MIB);
        let tools = tools_expecting_format(0);

        let result = ComprehensiveRunner::new(&vol, config().restore_after_test(false))
            .with_tools(&tools)
            .run(&drive(), ComprehensiveMode::Fast)
            .result;

        assert!(result.capacity.is_some());
        assert!(result.restoration.is_none());
    }

    #[test]
    fn test_progress_spans_all_phases() {
        let vol = MemoryVolume::new("/mnt/mem", 100 * MIB);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        ComprehensiveRunner::new(&vol, config())
            .on_progress(move |p| {
                if let Ok(mut seen) = seen_clone.lock() {
                    if seen.last() != Some(&p.phase) {
                        seen.push(p.phase);
                    }
                }
            })
            .run(&drive(), ComprehensiveMode::Fast);

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                Phase::Speed,
                Phase::Integrity,
                Phase::CapacityWrite,
                Phase::CapacityVerify
            ]
        );
    }
}
