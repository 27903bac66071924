//! Integration tests for flashcheck-platform
//!
//! Every phase runs against a real temporary directory through
//! [`MountedVolume`]. Tests that reformat real media are marked with #[ignore].

use flashcheck_core::{
    CapacityMode, CapacityVerifier, FilesystemKind, IntegrityVerifier, SpeedProber, TestConfig,
    Volume,
};
use flashcheck_platform::*;
use std::time::Duration;
use tempfile::TempDir;

const MIB: u64 = 1024 * 1024;

fn small_config() -> TestConfig {
    TestConfig::new()
        .speed_block_size(256 * 1024)
        .speed_iterations(2)
        .trial_pause(Duration::ZERO)
        .access_samples(10)
        .integrity_file_size(16 * 1024)
        .fast_block_size(MIB as usize)
        .capacity_size_limit(Some(4 * MIB))
}

fn leftover_entries(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).unwrap().count()
}

// ============================================================================
// Phases on a real filesystem
// ============================================================================

#[test]
fn test_speed_probe_on_tempdir() {
    let temp = TempDir::new().unwrap();
    let volume = MountedVolume::open(temp.path()).unwrap();

    let result = SpeedProber::new(&volume, small_config())
        .run()
        .into_result()
        .unwrap();

    assert_eq!(result.iterations, 2);
    assert!(result.sequential_write_avg >= 0.0);
    assert_eq!(leftover_entries(&temp), 0);
}

#[test]
fn test_integrity_on_tempdir() {
    let temp = TempDir::new().unwrap();
    let volume = MountedVolume::open(temp.path()).unwrap();

    let result = IntegrityVerifier::new(&volume, small_config())
        .run()
        .into_result()
        .unwrap();

    assert_eq!(result.verification_passed, 15);
    assert_eq!(result.verification_failed, 0);
    assert_eq!(leftover_entries(&temp), 0);
}

#[test]
fn test_integrity_keeps_files_when_asked() {
    let temp = TempDir::new().unwrap();
    let volume = MountedVolume::open(temp.path()).unwrap();
    let config = small_config().delete_temp_files(false);

    IntegrityVerifier::new(&volume, config)
        .run()
        .into_result()
        .unwrap();

    assert_eq!(leftover_entries(&temp), 1);
}

#[test]
fn test_capacity_fast_on_tempdir() {
    let temp = TempDir::new().unwrap();
    let volume = MountedVolume::open(temp.path()).unwrap();
    assert!(volume.free_space().unwrap() > 40 * MIB);

    let result = CapacityVerifier::new(&volume, small_config(), CapacityMode::Fast)
        .run()
        .into_result()
        .unwrap();

    assert_eq!(result.blocks_written, 4);
    assert_eq!(result.blocks_verified, 4);
    assert!(result.verify_performed);
    assert!(result.is_clean());
    assert_eq!(leftover_entries(&temp), 0);
}

// ============================================================================
// Formatting
// ============================================================================

#[test]
fn test_format_request_for_every_platform() {
    let request = FormatRequest::new("/media/user/my usb", FilesystemKind::Fat32, "my usb")
        .with_device("/dev/sdc1")
        .with_timeout(Duration::from_secs(30));

    assert_eq!(request.label, "MY USB");
    assert_eq!(format_commands_linux(&request).unwrap().len(), 3);
    assert_eq!(format_commands_macos(&request).unwrap().len(), 1);
    assert!(format_commands_windows(&request).is_err());
}

#[test]
#[ignore = "requires root and a scratch removable drive at FLASHCHECK_SCRATCH_MOUNT"]
fn test_format_twice_is_idempotent() {
    let mount = std::env::var("FLASHCHECK_SCRATCH_MOUNT").unwrap();
    let device = std::env::var("FLASHCHECK_SCRATCH_DEVICE").unwrap_or_default();
    let request = FormatRequest::new(&mount, FilesystemKind::Fat32, "SCRATCH").with_device(device);

    format_volume(&request).unwrap();
    let first = free_space(std::path::Path::new(&mount)).unwrap();
    format_volume(&request).unwrap();
    let second = free_space(std::path::Path::new(&mount)).unwrap();

    assert_eq!(first, second);
}
