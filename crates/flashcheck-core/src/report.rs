//! Cross-phase result aggregation and report export.
//!
//! A [`ComprehensiveResult`] collects whatever phases ran against one drive.
//! [`ReportExporter`] writes it as JSON, plain text and a one-row CSV
//! summary.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::artifact::timestamp_tag;
use crate::capacity::{CapacityMode, CapacityResult};
use crate::drive::DriveDescriptor;
use crate::error::{Error, Result};
use crate::integrity::IntegrityResult;
use crate::restore::RestorationOutcome;
use crate::speed::SpeedResult;
use crate::units::{format_duration, format_mb_s, format_size, GIB, MIB};

/// Application directory name under the platform data dir
const APP_NAME: &str = "flashcheck";

/// Column header of the CSV summary
pub const CSV_HEADER: &str = "Drive,Path,Size_GB,Test_Type,Timestamp,Seq_Write_MBs,Seq_Read_MBs,\
Random_Write_MBs,Random_Read_MBs,Access_Time_ms,Integrity_Patterns,Integrity_Files,\
Integrity_Passed,Integrity_Failed,Capacity_Size_MB,Capacity_Write_MBs,Capacity_Verify_MBs,\
Overall_Status";

/// What kind of run produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    /// Speed probe only
    Speed,
    /// Integrity check only
    Integrity,
    /// Fast capacity check only
    CapacityFast,
    /// Full capacity check only
    CapacityFull,
    /// Speed, integrity and fast capacity
    ComprehensiveFast,
    /// Speed, integrity and full capacity
    ComprehensiveDetailed,
}

impl TestType {
    /// Tag used in file names and the CSV summary
    pub fn tag(&self) -> &'static str {
        match self {
            TestType::Speed => "speed",
            TestType::Integrity => "integrity",
            TestType::CapacityFast => "capacity_fast",
            TestType::CapacityFull => "capacity_full",
            TestType::ComprehensiveFast => "comprehensive_fast",
            TestType::ComprehensiveDetailed => "comprehensive_detailed",
        }
    }

    /// Test type for a standalone capacity run
    pub fn for_capacity(mode: CapacityMode) -> Self {
        match mode {
            CapacityMode::Fast => TestType::CapacityFast,
            CapacityMode::Full => TestType::CapacityFull,
        }
    }
}

impl std::fmt::Display for TestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Verdict over every phase that ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverallStatus {
    /// No integrity failures and no capacity errors
    Pass,
    /// At least one integrity failure or capacity error
    Fail,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallStatus::Pass => write!(f, "PASS"),
            OverallStatus::Fail => write!(f, "FAIL"),
        }
    }
}

/// Results of every phase run against one drive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensiveResult {
    /// Drive snapshot the run was started with
    pub drive: DriveDescriptor,
    /// Kind of run
    pub test_type: TestType,
    /// When the run started
    pub timestamp: DateTime<Local>,
    /// Speed probe result, if it ran
    pub speed: Option<SpeedResult>,
    /// Integrity result, if it ran
    pub integrity: Option<IntegrityResult>,
    /// Capacity result, if it ran
    pub capacity: Option<CapacityResult>,
    /// Whether the user cancelled the run
    pub cancelled: bool,
    /// Why phases failed or were skipped
    pub phase_notes: Vec<String>,
    /// Restoration outcome, if restoration ran
    pub restoration: Option<RestorationOutcome>,
}

impl ComprehensiveResult {
    /// Start an empty result for `drive`
    pub fn new(drive: DriveDescriptor, test_type: TestType) -> Self {
        Self {
            drive,
            test_type,
            timestamp: Local::now(),
            speed: None,
            integrity: None,
            capacity: None,
            cancelled: false,
            phase_notes: Vec::new(),
            restoration: None,
        }
    }

    /// PASS unless integrity failed somewhere, capacity recorded errors, or
    /// no phase produced a result at all
    pub fn overall_status(&self) -> OverallStatus {
        let integrity_failed = self
            .integrity
            .as_ref()
            .is_some_and(|r| r.verification_failed > 0);
        let capacity_failed = self
            .capacity
            .as_ref()
            .is_some_and(|r| !r.error_messages.is_empty());

        if self.is_empty() || integrity_failed || capacity_failed {
            OverallStatus::Fail
        } else {
            OverallStatus::Pass
        }
    }

    /// Every problem worth showing the user
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.is_empty() {
            issues.push("No test produced a result".to_string());
        }
        if let Some(integrity) = &self.integrity {
            issues.extend(integrity.error_messages.iter().cloned());
        }
        if let Some(capacity) = &self.capacity {
            issues.extend(capacity.error_messages.iter().cloned());
        }
        issues.extend(self.phase_notes.iter().cloned());
        if let Some(restoration) = self.restoration.as_ref().filter(|r| !r.succeeded) {
            issues.push(restoration.message.clone());
        }
        issues
    }

    /// Whether no phase produced a result
    pub fn is_empty(&self) -> bool {
        self.speed.is_none() && self.integrity.is_none() && self.capacity.is_none()
    }
}

// ============================================================================
// Rendering
// ============================================================================

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    result: &'a ComprehensiveResult,
    overall_status: OverallStatus,
    issues: Vec<String>,
}

/// Render a result as pretty JSON, including status and issues
pub fn render_json(result: &ComprehensiveResult) -> Result<String> {
    let report = JsonReport {
        result,
        overall_status: result.overall_status(),
        issues: result.issues(),
    };
    serde_json::to_string_pretty(&report).map_err(|e| Error::Report(e.to_string()))
}

/// Render a human readable text report
pub fn render_text(result: &ComprehensiveResult) -> String {
    let mut out = String::new();
    let drive = &result.drive;

    let _ = writeln!(out, "FLASHCHECK TEST REPORT");
    let _ = writeln!(out, "{}", "=".repeat(60));
    let _ = writeln!(out, "Drive:      {}", drive.display_label);
    let _ = writeln!(out, "Path:       {}", drive.mount_path.display());
    let _ = writeln!(out, "Size:       {}", format_size(drive.total_bytes));
    if let Some(model) = &drive.model {
        let _ = writeln!(out, "Model:      {}", model);
    }
    if let Some(fs) = &drive.filesystem_kind {
        let _ = writeln!(out, "Filesystem: {}", fs);
    }
    let _ = writeln!(out, "Test type:  {}", result.test_type);
    let _ = writeln!(
        out,
        "Timestamp:  {}",
        result.timestamp.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(out, "Status:     {}", result.overall_status());
    if result.cancelled {
        let _ = writeln!(out, "Cancelled:  yes");
    }

    if let Some(speed) = &result.speed {
        section(&mut out, "Speed");
        let _ = writeln!(
            out,
            "Sequential write:  {}",
            format_mb_s(speed.sequential_write_avg)
        );
        let _ = writeln!(
            out,
            "Sequential read:   {}",
            format_mb_s(speed.sequential_read_avg)
        );
        let _ = writeln!(out, "Random write:      {}", format_mb_s(speed.random_write_avg));
        let _ = writeln!(out, "Random read:       {}", format_mb_s(speed.random_read_avg));
        let _ = writeln!(out, "Access time:       {:.2} ms", speed.access_time_avg_ms);
        let _ = writeln!(
            out,
            "Block size:        {} ({} trials)",
            format_size(speed.block_size),
            speed.iterations
        );
    }

    if let Some(integrity) = &result.integrity {
        section(&mut out, "Integrity");
        let _ = writeln!(out, "Patterns tested:   {}", integrity.patterns_tested);
        let _ = writeln!(out, "Files created:     {}", integrity.files_created);
        let _ = writeln!(out, "Passed:            {}", integrity.verification_passed);
        let _ = writeln!(out, "Failed:            {}", integrity.verification_failed);
        let _ = writeln!(out, "Digest:            {}", integrity.digest_algorithm);
        let _ = writeln!(out, "Duration:          {}", format_duration(integrity.elapsed));
    }

    if let Some(capacity) = &result.capacity {
        section(&mut out, "Capacity");
        let _ = writeln!(out, "Mode:              {}", capacity.mode);
        let _ = writeln!(
            out,
            "Tested:            {} of {} planned",
            format_size(capacity.total_bytes_tested),
            format_size(capacity.planned_bytes)
        );
        let _ = writeln!(out, "Blocks written:    {}", capacity.blocks_written);
        if capacity.verify_performed {
            let _ = writeln!(out, "Blocks verified:   {}", capacity.blocks_verified);
        } else {
            let _ = writeln!(out, "Blocks verified:   not verified in this mode");
        }
        let _ = writeln!(
            out,
            "Write speed:       {}",
            format_mb_s(capacity.write_speed_mb_s)
        );
        if capacity.verify_performed {
            let _ = writeln!(
                out,
                "Verify speed:      {}",
                format_mb_s(capacity.verify_speed_mb_s)
            );
        }
    }

    if let Some(restoration) = &result.restoration {
        section(&mut out, "Restoration");
        let _ = writeln!(out, "{}", restoration.message);
    }

    let issues = result.issues();
    if !issues.is_empty() {
        section(&mut out, "Issues");
        for issue in issues {
            let _ = writeln!(out, "- {}", issue);
        }
    }

    out
}

fn section(out: &mut String, title: &str) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", "-".repeat(title.len()));
}

/// Render the CSV summary row matching [`CSV_HEADER`]
pub fn render_csv_row(result: &ComprehensiveResult) -> String {
    let drive = &result.drive;
    let speed = result.speed.as_ref();
    let integrity = result.integrity.as_ref();
    let capacity = result.capacity.as_ref();

    let opt = |value: Option<String>| value.unwrap_or_default();

    let fields = [
        csv_escape(&drive.display_label),
        csv_escape(&drive.mount_path.display().to_string()),
        format!("{:.2}", drive.total_bytes as f64 / GIB as f64),
        result.test_type.tag().to_string(),
        result.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        opt(speed.map(|s| format!("{:.2}", s.sequential_write_avg))),
        opt(speed.map(|s| format!("{:.2}", s.sequential_read_avg))),
        opt(speed.map(|s| format!("{:.2}", s.random_write_avg))),
        opt(speed.map(|s| format!("{:.2}", s.random_read_avg))),
        opt(speed.map(|s| format!("{:.3}", s.access_time_avg_ms))),
        opt(integrity.map(|i| i.patterns_tested.to_string())),
        opt(integrity.map(|i| i.files_created.to_string())),
        opt(integrity.map(|i| i.verification_passed.to_string())),
        opt(integrity.map(|i| i.verification_failed.to_string())),
        opt(capacity.map(|c| format!("{:.1}", c.total_bytes_tested as f64 / MIB as f64))),
        opt(capacity.map(|c| format!("{:.2}", c.write_speed_mb_s))),
        opt(capacity.map(|c| format!("{:.2}", c.verify_speed_mb_s))),
        result.overall_status().to_string(),
    ];
    fields.join(",")
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

// ============================================================================
// Export
// ============================================================================

/// Somewhere finished results are delivered
pub trait ReportSink: Send + Sync {
    /// Persist `result`, returning the files written
    fn export(&self, result: &ComprehensiveResult) -> Result<Vec<PathBuf>>;
}

/// Writes JSON, text and CSV reports into a directory
#[derive(Debug, Clone)]
pub struct ReportExporter {
    dir: PathBuf,
}

impl ReportExporter {
    /// Export into `dir`, created on first export
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Export into the default reports directory
    pub fn with_default_dir() -> Result<Self> {
        default_report_dir()
            .map(Self::new)
            .ok_or_else(|| Error::Report("Could not determine data directory".to_string()))
    }

    /// Directory reports are written to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write(&self, name: String, contents: &str) -> Result<PathBuf> {
        let path = self.dir.join(name);
        std::fs::write(&path, contents)
            .map_err(|e| Error::Report(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Wrote report {}", path.display());
        Ok(path)
    }
}

impl ReportSink for ReportExporter {
    fn export(&self, result: &ComprehensiveResult) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Report(format!("{}: {}", self.dir.display(), e)))?;

        let stem = format!(
            "{}_{}",
            file_label(&result.drive.display_label),
            timestamp_tag(&result.timestamp)
        );

        let json = render_json(result)?;
        let csv = format!("{}\n{}\n", CSV_HEADER, render_csv_row(result));

        let paths = vec![
            self.write(format!("test_report_{}.json", stem), &json)?,
            self.write(format!("test_report_{}.txt", stem), &render_text(result))?,
            self.write(format!("test_summary_{}.csv", stem), &csv)?,
        ];

        tracing::info!("Reports saved to {}", self.dir.display());
        Ok(paths)
    }
}

/// Default reports directory, `<data_dir>/flashcheck/reports`
pub fn default_report_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_NAME).join("reports"))
}

/// Report files in `dir`, newest name last
pub fn list_reports(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let entries =
        std::fs::read_dir(dir).map_err(|e| Error::Report(format!("{}: {}", dir.display(), e)))?;

    let mut reports: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy())
                .is_some_and(|n| n.starts_with("test_report_") || n.starts_with("test_summary_"))
        })
        .collect();
    reports.sort();
    Ok(reports)
}

fn file_label(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "drive".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::DigestAlgorithm;
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::TempDir;

    fn integrity(failed: u32) -> IntegrityResult {
        IntegrityResult {
            patterns_tested: 5,
            files_created: 15,
            verification_passed: 15 - failed,
            verification_failed: failed,
            error_messages: (0..failed).map(|i| format!("Hash mismatch {}", i)).collect(),
            file_size: MIB,
            digest_algorithm: DigestAlgorithm::Sha256,
            elapsed: Duration::from_secs(3),
        }
    }

    fn sample() -> ComprehensiveResult {
        let drive = DriveDescriptor::new("/media/user/MY STICK")
            .with_total_bytes(16 * GIB)
            .with_model("Cruzer");
        let mut result = ComprehensiveResult::new(drive, TestType::ComprehensiveFast);
        result.timestamp = Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        result.integrity = Some(integrity(0));
        result
    }

    #[test]
    fn test_status_pass_and_fail() {
        let mut result = sample();
        assert_eq!(result.overall_status(), OverallStatus::Pass);

        result.integrity = Some(integrity(2));
        assert_eq!(result.overall_status(), OverallStatus::Fail);
        assert_eq!(result.issues().len(), 2);
    }

    #[test]
    fn test_run_without_results_fails_in_every_rendering() {
        let mut result = ComprehensiveResult::new(
            DriveDescriptor::new("/media/user/STICK"),
            TestType::Speed,
        );
        result
            .phase_notes
            .push("Speed test failed: simulated device write failure".to_string());

        assert_eq!(result.overall_status(), OverallStatus::Fail);
        assert_eq!(result.issues()[0], "No test produced a result");

        let value: serde_json::Value = serde_json::from_str(&render_json(&result).unwrap()).unwrap();
        assert_eq!(value["overall_status"], "FAIL");
        assert!(render_text(&result).contains("FAIL"));
        assert!(render_csv_row(&result).contains("FAIL"));
    }

    #[test]
    fn test_phase_notes_do_not_fail_run() {
        let mut result = sample();
        result.phase_notes.push("Speed test failed: IO error".to_string());
        assert_eq!(result.overall_status(), OverallStatus::Pass);
        assert_eq!(result.issues(), vec!["Speed test failed: IO error"]);
    }

    #[test]
    fn test_csv_row_matches_header() {
        let result = sample();
        let row = render_csv_row(&result);
        assert_eq!(
            row.split(',').count(),
            CSV_HEADER.split(',').count(),
            "row: {row}"
        );
        assert!(row.starts_with("MY STICK,/media/user/MY STICK,16.00,comprehensive_fast,"));
        assert!(row.ends_with(",5,15,15,0,,,,PASS"));
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("plain"), "plain");
    }

    #[test]
    fn test_text_report_lists_issues() {
        let mut result = sample();
        result.integrity = Some(integrity(1));
        let text = render_text(&result);
        assert!(text.contains("Status:     FAIL"));
        assert!(text.contains("Integrity"));
        assert!(text.contains("- Hash mismatch 0"));
        assert!(!text.contains("Capacity"));
    }

    #[test]
    fn test_json_report_has_status() {
        let json = render_json(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["overall_status"], "PASS");
        assert_eq!(value["test_type"], "comprehensive_fast");
        assert_eq!(value["integrity"]["verification_passed"], 15);
        assert!(value["speed"].is_null());
    }

    #[test]
    fn test_exporter_writes_three_files() {
        let temp = TempDir::new().unwrap();
        let exporter = ReportExporter::new(temp.path().join("reports"));
        let paths = exporter.export(&sample()).unwrap();

        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "test_report_MY_STICK_20240501_093000.json",
                "test_report_MY_STICK_20240501_093000.txt",
                "test_summary_MY_STICK_20240501_093000.csv",
            ]
        );

        let csv = std::fs::read_to_string(&paths[2]).unwrap();
        assert!(csv.starts_with(CSV_HEADER));
        assert_eq!(csv.lines().count(), 2);

        assert_eq!(list_reports(exporter.dir()).unwrap().len(), 3);
    }

    #[test]
    fn test_list_reports_missing_dir() {
        let reports = list_reports(Path::new("/nonexistent/flashcheck/reports")).unwrap();
        assert!(reports.is_empty());
    }

    #[test]
    fn test_file_label() {
        assert_eq!(file_label("MY STICK"), "MY_STICK");
        assert_eq!(file_label("  "), "drive");
        assert_eq!(file_label("E:\\"), "E__");
    }
}
