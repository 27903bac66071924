//! Naming and cleanup of the files phases leave on the drive.

use crate::volume::Volume;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// Timestamp format embedded in artifact and report names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Kinds of on-drive artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Single file used by the speed probe
    SpeedFile,
    /// Directory holding integrity test files
    IntegrityDir,
    /// Growing file used by the fast capacity check
    CapacityFile,
    /// Growing file used by the full capacity check
    FullCapacityFile,
}

impl ArtifactKind {
    fn prefix(self) -> &'static str {
        match self {
            ArtifactKind::SpeedFile => "speed_test",
            ArtifactKind::IntegrityDir => "integrity_test",
            ArtifactKind::CapacityFile => "capacity_test",
            ArtifactKind::FullCapacityFile => "full_capacity_test",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ArtifactKind::IntegrityDir => "",
            _ => ".tmp",
        }
    }
}

/// Format a timestamp the way artifact and report names embed it
pub fn timestamp_tag(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Name of an artifact created at `at`, e.g. `speed_test_20240101_120000.tmp`
pub fn artifact_name(kind: ArtifactKind, at: &DateTime<Local>) -> String {
    format!("{}_{}{}", kind.prefix(), timestamp_tag(at), kind.extension())
}

/// Path of a fresh artifact under the volume root
pub fn artifact_path(volume: &dyn Volume, kind: ArtifactKind) -> PathBuf {
    unused_artifact_path(volume, kind, &Local::now())
}

/// First free artifact path for `at`. Names already taken on the volume,
/// such as kept files from a run started in the same second, get a
/// `_2`, `_3`, ... suffix.
pub fn unused_artifact_path(
    volume: &dyn Volume,
    kind: ArtifactKind,
    at: &DateTime<Local>,
) -> PathBuf {
    let path = volume.root().join(artifact_name(kind, at));
    if !volume.exists(&path) {
        return path;
    }

    let stem = format!("{}_{}", kind.prefix(), timestamp_tag(at));
    (2u32..)
        .map(|n| volume.root().join(format!("{}_{}{}", stem, n, kind.extension())))
        .find(|candidate| !volume.exists(candidate))
        .unwrap_or(path)
}

/// Removes (or deliberately keeps) an artifact when dropped, so cleanup
/// runs on success, failure and cancellation alike.
pub(crate) struct ArtifactGuard<'a> {
    volume: &'a dyn Volume,
    path: PathBuf,
    is_dir: bool,
    delete: bool,
}

impl<'a> ArtifactGuard<'a> {
    pub(crate) fn file(volume: &'a dyn Volume, path: PathBuf, delete: bool) -> Self {
        Self {
            volume,
            path,
            is_dir: false,
            delete,
        }
    }

    pub(crate) fn dir(volume: &'a dyn Volume, path: PathBuf, delete: bool) -> Self {
        Self {
            volume,
            path,
            is_dir: true,
            delete,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArtifactGuard<'_> {
    fn drop(&mut self) {
        if !self.volume.exists(&self.path) {
            return;
        }

        if !self.delete {
            tracing::info!("Test artifact preserved at {}", self.path.display());
            return;
        }

        let result = if self.is_dir {
            self.volume.remove_dir_all(&self.path)
        } else {
            self.volume.remove_file(&self.path)
        };

        match result {
            Ok(()) => tracing::debug!("Removed test artifact {}", self.path.display()),
            Err(e) => tracing::warn!(
                "Could not remove test artifact {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}
