//! # Flashcheck Core
//!
//! Test engine for removable storage: throughput, bit-level integrity and
//! fake-capacity detection against a mounted drive.
//!
//! ## Modules
//!
//! - `pattern`: Test data patterns
//! - `speed`: Sequential and random throughput, access latency
//! - `integrity`: Write, hash, read back and compare pattern files
//! - `capacity`: Fill free space and verify it, the fake-capacity detector
//! - `restore`: Reformat the drive after destructive phases
//! - `report`: Aggregate phase results and export reports
//! - `orchestrator`: Run all phases in sequence
//! - `volume`: Storage seam, with an in-memory implementation for simulations
//! - `config`: Runtime configuration
//! - `settings`: Persistent user settings from configuration file
//!
//! ## Example
//!
//! ```ignore
//! use flashcheck_core::{IntegrityVerifier, MemoryVolume, TestConfig};
//!
//! let volume = MemoryVolume::new("/mnt/sim", 64 * 1024 * 1024);
//! let mut verifier = IntegrityVerifier::new(&volume, TestConfig::new())
//!     .on_progress(|p| println!("{:.1}% - {}", p.percentage(), p.step));
//!
//! let outcome = verifier.run();
//! if let Some(result) = outcome.result() {
//!     println!("{} passed, {} failed", result.verification_passed, result.verification_failed);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifact;
pub mod capacity;
pub mod config;
pub mod digest;
pub mod drive;
pub mod error;
pub mod integrity;
pub mod orchestrator;
pub mod pattern;
pub mod phase;
pub mod report;
pub mod restore;
pub mod settings;
pub mod speed;
pub mod units;
pub mod volume;

pub use capacity::{CapacityMode, CapacityPlan, CapacityResult, CapacityVerifier};
pub use config::TestConfig;
pub use digest::{Checksum, DigestAlgorithm};
pub use drive::{DriveDescriptor, FilesystemKind, InterfaceKind, FALLBACK_LABEL};
pub use error::{Error, Result};
pub use integrity::{IntegrityResult, IntegrityVerifier};
pub use orchestrator::{ComprehensiveMode, ComprehensiveRun, ComprehensiveRunner};
pub use pattern::{generate, TestPattern};
pub use phase::{CancelToken, Phase, PhaseOutcome, PhaseProgress, ProgressCallback};
pub use report::{
    list_reports, ComprehensiveResult, OverallStatus, ReportExporter, ReportSink, TestType,
};
pub use restore::{capture_filesystem, restore, DriveTools, RestorationOutcome};
pub use settings::{
    BehaviorSettings, CapacitySettings, IntegritySettings, ReportSettings, Settings,
    SettingsError, SpeedSettings,
};
pub use speed::{SpeedProber, SpeedResult};
pub use units::{format_duration, format_mb_s, format_size, parse_size};
pub use volume::{Fault, MemoryVolume, Volume, VolumeFile};
