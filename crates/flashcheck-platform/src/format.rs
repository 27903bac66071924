//! Reformatting through the platform's own tools
//!
//! Command lines are built by pure functions so every platform's recipe can
//! be checked on any host; [`run_with_timeout`] executes them with a hard
//! time budget.

use crate::{PlatformError, Result};
use flashcheck_core::{FilesystemKind, FALLBACK_LABEL};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default budget for a format command
pub const DEFAULT_FORMAT_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Characters FAT rejects in volume labels
const FAT_FORBIDDEN: &str = "\"*+,./:;<=>?[\\]|";

/// Characters exFAT rejects in volume labels
const EXFAT_FORBIDDEN: &str = "\"*/:<>?\\|";

/// What to format and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatRequest {
    /// Where the volume is mounted now, and where it is remounted
    pub mount_path: PathBuf,
    /// Backing block device, required on Linux
    pub device_path: Option<String>,
    /// Filesystem to create
    pub filesystem: FilesystemKind,
    /// Label, already sanitized for `filesystem`
    pub label: String,
    /// Budget for each external command
    pub timeout: Duration,
}

impl FormatRequest {
    /// Create a request; the label is sanitized for the filesystem
    pub fn new(mount_path: impl Into<PathBuf>, filesystem: FilesystemKind, label: &str) -> Self {
        let label = sanitize_label(label, &filesystem);
        Self {
            mount_path: mount_path.into(),
            device_path: None,
            filesystem,
            label,
            timeout: DEFAULT_FORMAT_TIMEOUT,
        }
    }

    /// Builder: set the backing block device
    #[must_use]
    pub fn with_device(mut self, device_path: impl Into<String>) -> Self {
        self.device_path = Some(device_path.into());
        self
    }

    /// Builder: set the per-command timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Make a label acceptable to the target filesystem
///
/// FAT labels are upper-cased ASCII; every filesystem drops the characters
/// it forbids and is truncated to its maximum length. An empty result falls
/// back to [`FALLBACK_LABEL`].
#[must_use]
pub fn sanitize_label(label: &str, filesystem: &FilesystemKind) -> String {
    let cleaned: String = match filesystem {
        FilesystemKind::Fat32 => label
            .chars()
            .filter(|c| c.is_ascii() && !c.is_ascii_control() && !FAT_FORBIDDEN.contains(*c))
            .map(|c| c.to_ascii_uppercase())
            .collect(),
        FilesystemKind::ExFat | FilesystemKind::Ntfs => label
            .chars()
            .filter(|c| !c.is_control() && !EXFAT_FORBIDDEN.contains(*c))
            .collect(),
        _ => label.chars().filter(|c| !c.is_control()).collect(),
    };

    let truncated: String = cleaned
        .trim()
        .chars()
        .take(filesystem.max_label_len())
        .collect();
    let truncated = truncated.trim_end();

    if truncated.is_empty() {
        FALLBACK_LABEL.to_string()
    } else {
        truncated.to_string()
    }
}

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name
    pub program: String,
    /// Arguments in order
    pub args: Vec<String>,
}

impl CommandSpec {
    fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

fn unsupported(filesystem: &FilesystemKind, os: &str) -> PlatformError {
    PlatformError::NotSupported(format!("Cannot create {filesystem} on {os}"))
}

// ============================================================================
// Linux
// ============================================================================

/// Unmount, mkfs, mount
///
/// # Errors
///
/// Fails when the request has no block device or the filesystem has no
/// mkfs tool.
pub fn format_commands_linux(request: &FormatRequest) -> Result<Vec<CommandSpec>> {
    let device = request.device_path.as_deref().ok_or_else(|| {
        PlatformError::DeviceNotFound(format!(
            "No block device known for {}",
            request.mount_path.display()
        ))
    })?;
    let mount = request.mount_path.to_string_lossy().into_owned();
    let label = request.label.as_str();

    let mkfs = match request.filesystem {
        FilesystemKind::Fat32 => CommandSpec::new("mkfs.vfat", ["-F", "32", "-n", label, device]),
        FilesystemKind::ExFat => CommandSpec::new("mkfs.exfat", ["-L", label, device]),
        FilesystemKind::Ntfs => CommandSpec::new("mkfs.ntfs", ["-f", "-L", label, device]),
        FilesystemKind::Ext4 => CommandSpec::new("mkfs.ext4", ["-F", "-L", label, device]),
        FilesystemKind::Hfs => CommandSpec::new("mkfs.hfsplus", ["-v", label, device]),
        ref other => return Err(unsupported(other, "Linux")),
    };

    Ok(vec![
        CommandSpec::new("umount", [mount.as_str()]),
        mkfs,
        CommandSpec::new("mount", [device, mount.as_str()]),
    ])
}

// ============================================================================
// macOS
// ============================================================================

/// `diskutil eraseVolume`, which remounts on its own
///
/// # Errors
///
/// Fails for filesystems `diskutil` cannot create.
pub fn format_commands_macos(request: &FormatRequest) -> Result<Vec<CommandSpec>> {
    let personality = match request.filesystem {
        FilesystemKind::Fat32 => "MS-DOS FAT32",
        FilesystemKind::ExFat => "ExFAT",
        FilesystemKind::Hfs => "JHFS+",
        FilesystemKind::Apfs => "APFS",
        ref other => return Err(unsupported(other, "macOS")),
    };

    Ok(vec![CommandSpec::new(
        "diskutil",
        [
            "eraseVolume".to_string(),
            personality.to_string(),
            request.label.clone(),
            request.mount_path.to_string_lossy().into_owned(),
        ],
    )])
}

// ============================================================================
// Windows
// ============================================================================

/// PowerShell `Format-Volume` against the drive letter
///
/// # Errors
///
/// Fails when the mount path has no drive letter or the filesystem is not
/// one Windows formats.
pub fn format_commands_windows(request: &FormatRequest) -> Result<Vec<CommandSpec>> {
    let letter = drive_letter(&request.mount_path).ok_or_else(|| {
        PlatformError::DeviceNotFound(format!(
            "{} is not a drive letter",
            request.mount_path.display()
        ))
    })?;

    let filesystem = match request.filesystem {
        FilesystemKind::Fat32 => "FAT32",
        FilesystemKind::ExFat => "exFAT",
        FilesystemKind::Ntfs => "NTFS",
        ref other => return Err(unsupported(other, "Windows")),
    };

    let script = format!(
        "Format-Volume -DriveLetter {letter} -FileSystem {filesystem} \
         -NewFileSystemLabel '{}' -Confirm:$false -Force | Out-Null",
        request.label.replace('\'', "''")
    );

    Ok(vec![CommandSpec::new(
        "powershell",
        ["-NoProfile".to_string(), "-Command".to_string(), script],
    )])
}

fn drive_letter(path: &Path) -> Option<char> {
    let text = path.to_string_lossy();
    let mut chars = text.chars();
    let letter = chars.next()?;
    (letter.is_ascii_alphabetic() && chars.next() == Some(':'))
        .then_some(letter.to_ascii_uppercase())
}

// ============================================================================
// Execution
// ============================================================================

/// Run a command, killing it if it outlives `timeout`
///
/// # Errors
///
/// - [`PlatformError::Timeout`] when the budget is exceeded
/// - [`PlatformError::PermissionDenied`] when the tool reports missing privileges
/// - [`PlatformError::CommandFailed`] for spawn failures and non-zero exits
pub fn run_with_timeout(spec: &CommandSpec, timeout: Duration) -> Result<()> {
    debug!("Running {spec}");

    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| PlatformError::CommandFailed(format!("Cannot start {}: {e}", spec.program)))?;

    // drained on its own thread so a chatty tool cannot fill the pipe and stall
    let stderr_reader = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut text = String::new();
            let _ = pipe.read_to_string(&mut text);
            text
        })
    });

    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            if status.success() {
                return Ok(());
            }

            let stderr = stderr_reader
                .and_then(|reader| reader.join().ok())
                .unwrap_or_default();
            let stderr = stderr.trim();
            let lowered = stderr.to_lowercase();
            if lowered.contains("permission denied")
                || lowered.contains("must be root")
                || lowered.contains("access denied")
            {
                return Err(PlatformError::PermissionDenied(format!("{spec}: {stderr}")));
            }
            return Err(PlatformError::CommandFailed(format!(
                "{spec} exited with {status}: {stderr}"
            )));
        }

        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            // the reader is left detached: a grandchild may still hold the pipe
            return Err(PlatformError::Timeout {
                command: spec.program.clone(),
                seconds: timeout.as_secs(),
            });
        }

        thread::sleep(POLL_INTERVAL);
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_label_fat() {
        assert_eq!(sanitize_label("my drive", &FilesystemKind::Fat32), "MY DRIVE");
        assert_eq!(sanitize_label("a/b:c*d", &FilesystemKind::Fat32), "ABCD");
        assert_eq!(
            sanitize_label("VERYLONGLABELNAME", &FilesystemKind::Fat32),
            "VERYLONGLAB"
        );
    }

    #[test]
    fn test_sanitize_label_fallback() {
        assert_eq!(sanitize_label("", &FilesystemKind::Fat32), FALLBACK_LABEL);
        assert_eq!(sanitize_label("???", &FilesystemKind::Fat32), FALLBACK_LABEL);
        assert_eq!(sanitize_label("   ", &FilesystemKind::Ext4), FALLBACK_LABEL);
    }

    #[test]
    fn test_sanitize_label_keeps_case_outside_fat() {
        assert_eq!(sanitize_label("Photos", &FilesystemKind::ExFat), "Photos");
        assert_eq!(sanitize_label("Backup Disk", &FilesystemKind::Ntfs), "Backup Disk");
    }

    #[test]
    fn test_request_sanitizes_label() {
        let request = FormatRequest::new("/media/usb", FilesystemKind::Fat32, "sandisk");
        assert_eq!(request.label, "SANDISK");
        assert_eq!(request.timeout, DEFAULT_FORMAT_TIMEOUT);
    }

    #[test]
    fn test_linux_commands_fat32() {
        let request = FormatRequest::new("/media/user/USB", FilesystemKind::Fat32, "USB")
            .with_device("/dev/sdb1");
        let commands = format_commands_linux(&request).unwrap();

        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].to_string(), "umount /media/user/USB");
        assert_eq!(commands[1].to_string(), "mkfs.vfat -F 32 -n USB /dev/sdb1");
        assert_eq!(commands[2].to_string(), "mount /dev/sdb1 /media/user/USB");
    }

    #[test]
    fn test_linux_commands_need_device() {
        let request = FormatRequest::new("/media/user/USB", FilesystemKind::Ext4, "USB");
        assert!(matches!(
            format_commands_linux(&request),
            Err(PlatformError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_linux_commands_reject_apfs() {
        let request = FormatRequest::new("/media/x", FilesystemKind::Apfs, "X").with_device("/dev/sdb1");
        assert!(matches!(
            format_commands_linux(&request),
            Err(PlatformError::NotSupported(_))
        ));
    }

    #[test]
    fn test_macos_command() {
        let request = FormatRequest::new("/Volumes/KINGSTON", FilesystemKind::ExFat, "KINGSTON");
        let commands = format_commands_macos(&request).unwrap();
        assert_eq!(
            commands[0].args,
            vec!["eraseVolume", "ExFAT", "KINGSTON", "/Volumes/KINGSTON"]
        );
        assert!(format_commands_macos(&FormatRequest::new("/Volumes/X", FilesystemKind::Ntfs, "X")).is_err());
    }

    #[test]
    fn test_windows_command() {
        let request = FormatRequest::new("e:\\", FilesystemKind::Ntfs, "Bob's");
        let commands = format_commands_windows(&request).unwrap();
        let script = &commands[0].args[2];
        assert!(script.contains("-DriveLetter E"));
        assert!(script.contains("-FileSystem NTFS"));
        assert!(script.contains("'Bob''s'"));
    }

    #[test]
    fn test_windows_command_requires_letter() {
        let request = FormatRequest::new("/media/usb", FilesystemKind::Fat32, "USB");
        assert!(format_commands_windows(&request).is_err());
    }

    #[test]
    fn test_command_display_quotes_spaces() {
        let spec = CommandSpec::new("diskutil", ["eraseVolume", "MS-DOS FAT32"]);
        assert_eq!(spec.to_string(), "diskutil eraseVolume \"MS-DOS FAT32\"");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_with_timeout_success_and_failure() {
        assert!(run_with_timeout(&CommandSpec::new("true", Vec::<String>::new()), Duration::from_secs(5)).is_ok());
        assert!(matches!(
            run_with_timeout(&CommandSpec::new("false", Vec::<String>::new()), Duration::from_secs(5)),
            Err(PlatformError::CommandFailed(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_with_timeout_kills_slow_command() {
        let started = Instant::now();
        let err = run_with_timeout(&CommandSpec::new("sleep", ["5"]), Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(err, PlatformError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_with_timeout_reads_large_stderr() {
        let script = "head -c 262144 /dev/zero | tr '\\000' x >&2; echo 'mkfs: device busy' >&2; exit 3";
        let started = Instant::now();
        let err = run_with_timeout(&CommandSpec::new("sh", ["-c", script]), Duration::from_secs(20))
            .unwrap_err();

        match err {
            PlatformError::CommandFailed(message) => {
                assert!(message.contains("mkfs: device busy"));
                assert!(message.len() > 262_144);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_run_with_timeout_missing_program() {
        let spec = CommandSpec::new("flashcheck-no-such-tool", Vec::<String>::new());
        assert!(matches!(
            run_with_timeout(&spec, Duration::from_secs(1)),
            Err(PlatformError::CommandFailed(_))
        ));
    }
}
