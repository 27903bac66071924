//! [`Volume`] on a real mount path

use flashcheck_core::{Error, Result, Volume, VolumeFile};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A mounted filesystem accessed through `std::fs`
///
/// Paths handed to the volume must live under [`Volume::root`]; anything
/// else is rejected so a test phase can never write outside the drive.
#[derive(Debug, Clone)]
pub struct MountedVolume {
    root: PathBuf,
}

impl MountedVolume {
    /// Wrap an existing, writable directory
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if `root` is not a directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::DeviceNotFound(root.display().to_string()));
        }
        Ok(Self { root })
    }

    fn check(&self, path: &Path) -> Result<()> {
        if path.starts_with(&self.root) {
            Ok(())
        } else {
            Err(Error::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!(
                    "{} is outside the volume at {}",
                    path.display(),
                    self.root.display()
                ),
            )))
        }
    }
}

struct MountedFile(File);

impl Read for MountedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for MountedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Seek for MountedFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.seek(pos)
    }
}

impl VolumeFile for MountedFile {
    fn sync(&mut self) -> Result<()> {
        self.0.flush()?;
        self.0.sync_all()?;
        Ok(())
    }
}

impl Volume for MountedVolume {
    fn root(&self) -> &Path {
        &self.root
    }

    fn free_space(&self) -> Result<u64> {
        Ok(crate::free_space(&self.root)?)
    }

    fn create_file(&self, path: &Path) -> Result<Box<dyn VolumeFile>> {
        self.check(path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(MountedFile(file)))
    }

    fn open_file(&self, path: &Path) -> Result<Box<dyn VolumeFile>> {
        self.check(path)?;
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Box::new(MountedFile(file)))
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        self.check(path)?;
        fs::create_dir(path)?;
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.check(path)?;
        fs::remove_file(path)?;
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.check(path)?;
        fs::remove_dir_all(path)?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.starts_with(&self.root) && path.exists()
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
