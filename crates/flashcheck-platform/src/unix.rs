//! Calls shared by the Unix backends

use crate::{PlatformError, Result};
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Free bytes for unprivileged writers, from statvfs
pub(crate) fn free_space(path: &Path) -> Result<u64> {
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        PlatformError::DeviceNotFound(format!("Path contains NUL: {}", path.display()))
    })?;

    // SAFETY: statvfs is all-integer plain data, so zeroed is a valid value.
    #[allow(unsafe_code)]
    let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };

    // SAFETY: c_path is a valid NUL-terminated string and stats points to
    // writable memory of the right type for the duration of the call.
    #[allow(unsafe_code)]
    let result = unsafe { libc::statvfs(c_path.as_ptr(), &mut stats) };
    if result != 0 {
        return Err(PlatformError::Io(std::io::Error::last_os_error()));
    }

    // field widths differ between libc targets
    #[allow(clippy::unnecessary_cast, clippy::useless_conversion)]
    let free = u64::from(stats.f_bavail).saturating_mul(u64::from(stats.f_frsize));
    Ok(free)
}

/// Whether the effective user is root
pub(crate) fn is_root() -> bool {
    // SAFETY: geteuid() has no preconditions and cannot fail.
    #[allow(unsafe_code)]
    unsafe {
        libc::geteuid() == 0
    }
}
