//! Storage seam between the test engine and the drive under test.
//!
//! Phases never touch `std::fs` directly; they go through [`Volume`], which
//! the platform crate implements for real mount paths. [`MemoryVolume`] is
//! an in-memory implementation with fault injection, used to simulate
//! corrupting and fake-capacity drives.

use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// An open file on a volume
pub trait VolumeFile: Read + Write + Seek + Send {
    /// Flush buffered data and force it to stable storage
    fn sync(&mut self) -> Result<()>;
}

/// A mounted filesystem the engine can write test artifacts to
pub trait Volume: Send + Sync {
    /// Mount path every artifact lives under
    fn root(&self) -> &Path;

    /// Bytes currently available to unprivileged writers
    fn free_space(&self) -> Result<u64>;

    /// Create (or truncate) a file for reading and writing
    fn create_file(&self, path: &Path) -> Result<Box<dyn VolumeFile>>;

    /// Open an existing file for reading and writing
    fn open_file(&self, path: &Path) -> Result<Box<dyn VolumeFile>>;

    /// Create a directory
    fn create_dir(&self, path: &Path) -> Result<()>;

    /// Delete a file
    fn remove_file(&self, path: &Path) -> Result<()>;

    /// Delete a directory and everything in it
    fn remove_dir_all(&self, path: &Path) -> Result<()>;

    /// Whether a file or directory exists
    fn exists(&self, path: &Path) -> bool;
}

// ============================================================================
// In-memory volume
// ============================================================================

/// A fault injected into a [`MemoryVolume`]
#[derive(Debug, Clone)]
pub enum Fault {
    /// Reads of `range` from files whose name contains `file` return zeros
    ZeroRange {
        /// File name fragment to match
        file: String,
        /// Byte range that reads back as zeros
        range: Range<u64>,
    },
    /// Reads from matching files end after `len` bytes
    Truncate {
        /// File name fragment to match
        file: String,
        /// Apparent file length
        len: u64,
    },
    /// Writes to matching files fail once they would pass `after` bytes
    FailWrites {
        /// File name fragment to match
        file: String,
        /// Offset where writes start failing
        after: u64,
    },
    /// Creating matching files or directories fails with permission denied
    FailCreate {
        /// Name fragment to match
        file: String,
    },
}

impl Fault {
    fn applies_to(&self, path: &Path) -> bool {
        let fragment = match self {
            Fault::ZeroRange { file, .. }
            | Fault::Truncate { file, .. }
            | Fault::FailWrites { file, .. }
            | Fault::FailCreate { file } => file,
        };
        path.file_name()
            .is_some_and(|name| name.to_string_lossy().contains(fragment.as_str()))
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    files: HashMap<PathBuf, Vec<u8>>,
    dirs: HashSet<PathBuf>,
    capacity: u64,
    fake_capacity: Option<u64>,
    faults: Vec<Fault>,
    syncs: u64,
}

impl MemoryState {
    fn used(&self) -> u64 {
        self.files.values().map(|f| f.len() as u64).sum()
    }

    fn check_create(&self, root: &Path, path: &Path) -> io::Result<()> {
        let denied = self
            .faults
            .iter()
            .any(|f| matches!(f, Fault::FailCreate { .. }) && f.applies_to(path));
        if denied {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("cannot create {}", path.display()),
            ));
        }
        if !self.parent_exists(root, path) {
            return Err(not_found(path));
        }
        Ok(())
    }

    fn parent_exists(&self, root: &Path, path: &Path) -> bool {
        match path.parent() {
            Some(parent) => parent == root || self.dirs.contains(parent),
            None => false,
        }
    }
}

/// In-memory volume with configurable free space and injectable faults
#[derive(Debug, Clone)]
pub struct MemoryVolume {
    root: PathBuf,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryVolume {
    /// Create an empty volume rooted at `root` with `capacity` bytes free
    pub fn new(root: impl Into<PathBuf>, capacity: u64) -> Self {
        Self {
            root: root.into(),
            state: Arc::new(Mutex::new(MemoryState {
                capacity,
                ..Default::default()
            })),
        }
    }

    /// Builder: inject a fault
    #[must_use]
    pub fn with_fault(self, fault: Fault) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.faults.push(fault);
        }
        self
    }

    /// Builder: simulate a counterfeit drive that only stores the first
    /// `real_bytes` of each file and reads zeros past that point
    #[must_use]
    pub fn with_fake_capacity(self, real_bytes: u64) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fake_capacity = Some(real_bytes);
        }
        self
    }

    /// Names of the files currently stored, sorted
    pub fn file_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .state
            .lock()
            .map(|s| s.files.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }

    /// Length of a stored file
    pub fn file_len(&self, path: &Path) -> Option<u64> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.files.get(path).map(|f| f.len() as u64))
    }

    /// Number of `sync` calls made on files of this volume
    pub fn sync_count(&self) -> u64 {
        self.state.lock().map(|s| s.syncs).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| Error::Io(poisoned()))
    }

    fn open(&self, path: &Path, truncate: bool) -> Result<Box<dyn VolumeFile>> {
        let mut state = self.lock()?;
        if truncate {
            state.check_create(&self.root, path)?;
            state.files.insert(path.to_path_buf(), Vec::new());
        } else if !state.files.contains_key(path) {
            return Err(Error::Io(not_found(path)));
        }
        Ok(Box::new(MemoryFile {
            state: Arc::clone(&self.state),
            path: path.to_path_buf(),
            pos: 0,
        }))
    }
}

impl Volume for MemoryVolume {
    fn root(&self) -> &Path {
        &self.root
    }

    fn free_space(&self) -> Result<u64> {
        let state = self.lock()?;
        Ok(state.capacity.saturating_sub(state.used()))
    }

    fn create_file(&self, path: &Path) -> Result<Box<dyn VolumeFile>> {
        self.open(path, true)
    }

    fn open_file(&self, path: &Path) -> Result<Box<dyn VolumeFile>> {
        self.open(path, false)
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        let mut state = self.lock()?;
        state.check_create(&self.root, path)?;
        state.dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut state = self.lock()?;
        state
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::Io(not_found(path)))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.lock()?;
        if !state.dirs.remove(path) {
            return Err(Error::Io(not_found(path)));
        }
        state.files.retain(|p, _| !p.starts_with(path));
        state.dirs.retain(|p| !p.starts_with(path));
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.state
            .lock()
            .is_ok_and(|s| s.files.contains_key(path) || s.dirs.contains(path))
    }
}

struct MemoryFile {
    state: Arc<Mutex<MemoryState>>,
    path: PathBuf,
    pos: u64,
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        let data = state
            .files
            .get(&self.path)
            .ok_or_else(|| not_found(&self.path))?;

        let mut end = data.len() as u64;
        for fault in state.faults.iter().filter(|f| f.applies_to(&self.path)) {
            if let Fault::Truncate { len, .. } = fault {
                end = end.min(*len);
            }
        }
        if self.pos >= end {
            return Ok(0);
        }

        let n = (buf.len() as u64).min(end - self.pos) as usize;
        let start = self.pos as usize;
        buf[..n].copy_from_slice(&data[start..start + n]);

        let read_range = self.pos..self.pos + n as u64;
        for fault in state.faults.iter().filter(|f| f.applies_to(&self.path)) {
            if let Fault::ZeroRange { range, .. } = fault {
                zero_overlap(&mut buf[..n], &read_range, range);
            }
        }
        if let Some(real) = state.fake_capacity {
            zero_overlap(&mut buf[..n], &read_range, &(real..u64::MAX));
        }

        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        let end = self.pos + buf.len() as u64;

        for fault in state.faults.iter().filter(|f| f.applies_to(&self.path)) {
            if let Fault::FailWrites { after, .. } = fault {
                if end > *after {
                    return Err(io::Error::other("simulated device write failure"));
                }
            }
        }

        let current_len = state
            .files
            .get(&self.path)
            .ok_or_else(|| not_found(&self.path))?
            .len() as u64;
        let growth = end.saturating_sub(current_len);
        if state.used() + growth > state.capacity {
            return Err(io::Error::other("No space left on device"));
        }

        let data = state
            .files
            .get_mut(&self.path)
            .ok_or_else(|| not_found(&self.path))?;
        if (data.len() as u64) < end {
            data.resize(end as usize, 0);
        }
        data[self.pos as usize..end as usize].copy_from_slice(buf);
        self.pos = end;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self
            .state
            .lock()
            .map_err(|_| poisoned())?
            .files
            .get(&self.path)
            .map_or(0, |f| f.len() as u64);

        let new_pos = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        self.pos = new_pos.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
        })?;
        Ok(self.pos)
    }
}

impl VolumeFile for MemoryFile {
    fn sync(&mut self) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| Error::Io(poisoned()))?;
        state.syncs += 1;
        Ok(())
    }
}

fn zero_overlap(buf: &mut [u8], read: &Range<u64>, zeroed: &Range<u64>) {
    let start = read.start.max(zeroed.start);
    let end = read.end.min(zeroed.end);
    if start < end {
        let from = (start - read.start) as usize;
        let to = (end - read.start) as usize;
        buf[from..to].fill(0);
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found", path.display()),
    )
}

fn poisoned() -> io::Error {
    io::Error::other("memory volume lock poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume() -> MemoryVolume {
        MemoryVolume::new("/mnt/mem", 1024 * 1024)
    }

    #[test]
    fn test_write_then_read_back() {
        let vol = volume();
        let path = vol.root().join("a.dat");
        let mut file = vol.create_file(&path).unwrap();
        file.write_all(b"hello flash").unwrap();
        file.sync().unwrap();

        let mut file = vol.open_file(&path).unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello flash");
        assert_eq!(vol.sync_count(), 1);
        assert_eq!(vol.free_space().unwrap(), 1024 * 1024 - 11);
    }

    #[test]
    fn test_create_requires_parent_dir() {
        let vol = volume();
        let dir = vol.root().join("run");
        assert!(vol.create_file(&dir.join("x.dat")).is_err());
        vol.create_dir(&dir).unwrap();
        assert!(vol.create_file(&dir.join("x.dat")).is_ok());
        vol.remove_dir_all(&dir).unwrap();
        assert!(!vol.exists(&dir.join("x.dat")));
        assert!(!vol.exists(&dir));
    }

    #[test]
    fn test_write_past_capacity_fails() {
        let vol = MemoryVolume::new("/mnt/mem", 100);
        let mut file = vol.create_file(Path::new("/mnt/mem/big")).unwrap();
        file.write_all(&[1u8; 100]).unwrap();
        assert!(file.write_all(&[1u8; 1]).is_err());
    }

    #[test]
    fn test_zero_range_fault() {
        let vol = volume().with_fault(Fault::ZeroRange {
            file: "bad".to_string(),
            range: 4..8,
        });
        let path = vol.root().join("bad.dat");
        vol.create_file(&path).unwrap().write_all(&[9u8; 12]).unwrap();

        let mut out = Vec::new();
        vol.open_file(&path).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, [9, 9, 9, 9, 0, 0, 0, 0, 9, 9, 9, 9]);
    }

    #[test]
    fn test_truncate_fault() {
        let vol = volume().with_fault(Fault::Truncate {
            file: "short".to_string(),
            len: 5,
        });
        let path = vol.root().join("short.dat");
        vol.create_file(&path).unwrap().write_all(&[1u8; 50]).unwrap();

        let mut out = Vec::new();
        vol.open_file(&path).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn test_fake_capacity_reads_zeros() {
        let vol = volume().with_fake_capacity(3);
        let path = vol.root().join("cap.tmp");
        vol.create_file(&path).unwrap().write_all(&[5u8; 6]).unwrap();

        let mut out = Vec::new();
        vol.open_file(&path).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, [5, 5, 5, 0, 0, 0]);
    }

    #[test]
    fn test_seek_and_overwrite() {
        let vol = volume();
        let path = vol.root().join("seek.dat");
        let mut file = vol.create_file(&path).unwrap();
        file.write_all(&[0u8; 10]).unwrap();
        file.seek(SeekFrom::Start(4)).unwrap();
        file.write_all(&[7u8; 2]).unwrap();
        assert_eq!(file.seek(SeekFrom::End(0)).unwrap(), 10);
        assert!(file.seek(SeekFrom::Current(-11)).is_err());

        let mut out = Vec::new();
        vol.open_file(&path).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, [0, 0, 0, 0, 7, 7, 0, 0, 0, 0]);
    }
}
