//! Windows platform implementation
//!
//! Free space via `GetDiskFreeSpaceExW`, formatting via PowerShell
//! `Format-Volume`, elevation via the process token.

use crate::format::{format_commands_windows, run_with_timeout, FormatRequest};
use crate::{PlatformError, PlatformOps, Result};
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::ptr;
use tracing::info;
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
use windows_sys::Win32::Storage::FileSystem::GetDiskFreeSpaceExW;

/// Windows platform implementation
pub struct WindowsPlatform;

impl PlatformOps for WindowsPlatform {
    fn free_space(path: &Path) -> Result<u64> {
        let wide: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        let mut free_to_caller: u64 = 0;

        // SAFETY: wide is NUL-terminated and outlives the call; the output
        // pointer is a valid u64 and the unused outputs may be null.
        #[allow(unsafe_code)]
        let ok = unsafe {
            GetDiskFreeSpaceExW(
                wide.as_ptr(),
                &mut free_to_caller,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(PlatformError::Io(std::io::Error::last_os_error()));
        }
        Ok(free_to_caller)
    }

    fn format_volume(request: &FormatRequest) -> Result<()> {
        info!(
            "Formatting {} as {} with label {}",
            request.mount_path.display(),
            request.filesystem,
            request.label
        );
        for command in format_commands_windows(request)? {
            run_with_timeout(&command, request.timeout)?;
        }
        Ok(())
    }

    fn has_elevated_privileges() -> bool {
        is_elevated()
    }
}

/// Check if running with elevated privileges (Administrator)
fn is_elevated() -> bool {
    use windows_sys::Win32::Security::{
        GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY,
    };
    use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

    // SAFETY: the token handle is closed before returning and the elevation
    // buffer matches the size passed to GetTokenInformation.
    #[allow(unsafe_code)]
    unsafe {
        let mut token: HANDLE = 0;
        if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) == 0 {
            return false;
        }

        let mut elevation: TOKEN_ELEVATION = std::mem::zeroed();
        let mut size: u32 = 0;
        let result = GetTokenInformation(
            token,
            TokenElevation,
            ptr::addr_of_mut!(elevation).cast(),
            u32::try_from(std::mem::size_of::<TOKEN_ELEVATION>()).unwrap_or(u32::MAX),
            &mut size,
        );
        CloseHandle(token);

        result != 0 && elevation.TokenIsElevated != 0
    }
}
