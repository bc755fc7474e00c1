//! EduAdapt group reports
//!
//! Summarizes the performance snapshots linked into a teacher's class group
//! and renders them as JSON or Markdown.
//!
//! # Types
//!
//! - [`GroupReport`] - One group's summary plus a row per linked snapshot
//! - [`GroupSummary`] - Aggregates over the rows
//! - [`StudentRow`] - A linked performance snapshot
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - Compact or pretty JSON
//! - [`MarkdownGenerator`] - Human-readable Markdown
//!
//! # Example
//!
//! ```rust
//! use eduadapt_report::{EngagementBand, GroupReport, MarkdownGenerator, StudentRow};
//!
//! let report = GroupReport::builder()
//!     .teacher("tina")
//!     .group_id("g-1")
//!     .group_label("5th B - North School")
//!     .student(StudentRow {
//!         student_name: "Alice".to_string(),
//!         school: Some("North School".to_string()),
//!         grade: Some("5th".to_string()),
//!         average_score: 30,
//!         completed_modules: 3,
//!         struggling_topic: "Algebra".to_string(),
//!         engagement_level: EngagementBand::Low,
//!     })
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(report.summary.students, 1);
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("# Group Report"));
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid report data.
    #[error("invalid report data: {0}")]
    InvalidData(String),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Engagement (local copy to avoid cross-crate dependency)
// ============================================================================

/// Engagement bucket of a linked snapshot.
///
/// Mirrors the core engagement level so this crate stays free of the core
/// crate's server dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngagementBand {
    /// Progress above 70.
    High,
    /// Progress above 30.
    Medium,
    /// Progress of 30 or less.
    Low,
}

impl std::fmt::Display for EngagementBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "High"),
            Self::Medium => write!(f, "Medium"),
            Self::Low => write!(f, "Low"),
        }
    }
}

// ============================================================================
// StudentRow
// ============================================================================

/// One linked performance snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    /// Student's full name.
    pub student_name: String,
    /// Student's school, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    /// Student's grade, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    /// Subject progress at link time, 0 to 100.
    pub average_score: u8,
    /// Topics completed at link time.
    pub completed_modules: u32,
    /// The student's primary weak area.
    pub struggling_topic: String,
    /// Engagement bucket at link time.
    pub engagement_level: EngagementBand,
}

// ============================================================================
// GroupSummary
// ============================================================================

/// Snapshot counts per engagement bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementCounts {
    /// Snapshots with high engagement.
    pub high: usize,
    /// Snapshots with medium engagement.
    pub medium: usize,
    /// Snapshots with low engagement.
    pub low: usize,
}

impl EngagementCounts {
    /// Returns the total number of snapshots counted.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.high + self.medium + self.low
    }
}

/// Aggregates over a group's rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    /// Number of linked snapshots.
    pub students: usize,
    /// Mean of `averageScore`, rounded to one decimal. `None` for an empty group.
    pub mean_score: Option<f64>,
    /// Sum of `completedModules`.
    pub total_completed_modules: u32,
    /// Distribution of engagement buckets.
    pub engagement: EngagementCounts,
    /// Most frequent struggling topic. Ties go to the topic linked first.
    pub top_struggling_topic: Option<String>,
}

impl GroupSummary {
    /// Computes the summary for `rows`.
    #[must_use]
    pub fn from_rows(rows: &[StudentRow]) -> Self {
        let mut engagement = EngagementCounts::default();
        for row in rows {
            match row.engagement_level {
                EngagementBand::High => engagement.high += 1,
                EngagementBand::Medium => engagement.medium += 1,
                EngagementBand::Low => engagement.low += 1,
            }
        }

        let mean_score = if rows.is_empty() {
            None
        } else {
            let total: f64 = rows.iter().map(|r| f64::from(r.average_score)).sum();
            #[allow(clippy::cast_precision_loss)]
            let mean = total / rows.len() as f64;
            Some((mean * 10.0).round() / 10.0)
        };

        Self {
            students: rows.len(),
            mean_score,
            total_completed_modules: rows.iter().map(|r| r.completed_modules).sum(),
            engagement,
            top_struggling_topic: most_frequent_topic(rows),
        }
    }
}

fn most_frequent_topic(rows: &[StudentRow]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for row in rows {
        *counts.entry(row.struggling_topic.as_str()).or_default() += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for row in rows {
        let topic = row.struggling_topic.as_str();
        let count = counts.get(topic).copied().unwrap_or_default();
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((topic, count));
        }
    }
    best.map(|(topic, _)| topic.to_string())
}

// ============================================================================
// GroupReport
// ============================================================================

/// A class group's performance report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupReport {
    /// Owning teacher's username.
    pub teacher: String,
    /// Group identifier.
    pub group_id: String,
    /// Display label of the group.
    pub group_label: String,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Aggregates over the rows.
    pub summary: GroupSummary,
    /// Linked snapshots, in link order.
    pub students: Vec<StudentRow>,
}

impl GroupReport {
    /// Creates a new report builder.
    #[must_use]
    pub fn builder() -> GroupReportBuilder {
        GroupReportBuilder::default()
    }

    /// File name stem shared by the Markdown and JSON outputs.
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!("group-report-{}", self.group_id)
    }

    /// Writes `group-report-<id>.md` and `.json` into `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Io`] if `dir` cannot be created or written, and
    /// [`ReportError::Serialization`] if JSON serialization fails.
    pub fn write_to_dir(&self, dir: &Path) -> Result<ReportFiles> {
        std::fs::create_dir_all(dir)?;
        let stem = self.file_stem();

        let markdown = dir.join(format!("{stem}.md"));
        std::fs::write(&markdown, MarkdownGenerator::new(self).generate())?;

        let json = dir.join(format!("{stem}.json"));
        json::JsonGenerator::new(self).write_to_file(&json, true)?;

        Ok(ReportFiles { markdown, json })
    }
}

/// Paths written by [`GroupReport::write_to_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFiles {
    /// The Markdown report.
    pub markdown: PathBuf,
    /// The JSON report.
    pub json: PathBuf,
}

// ============================================================================
// GroupReportBuilder
// ============================================================================

/// Builder for constructing [`GroupReport`] instances.
///
/// The summary is always computed from the rows.
#[derive(Debug, Clone, Default)]
pub struct GroupReportBuilder {
    teacher: Option<String>,
    group_id: Option<String>,
    group_label: Option<String>,
    generated_at: Option<DateTime<Utc>>,
    students: Vec<StudentRow>,
}

impl GroupReportBuilder {
    /// Sets the teacher's username.
    #[must_use]
    pub fn teacher(mut self, teacher: impl Into<String>) -> Self {
        self.teacher = Some(teacher.into());
        self
    }

    /// Sets the group id.
    #[must_use]
    pub fn group_id(mut self, id: impl Into<String>) -> Self {
        self.group_id = Some(id.into());
        self
    }

    /// Sets the group label.
    #[must_use]
    pub fn group_label(mut self, label: impl Into<String>) -> Self {
        self.group_label = Some(label.into());
        self
    }

    /// Sets the generation time. Defaults to now.
    #[must_use]
    pub const fn generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }

    /// Adds a row.
    #[must_use]
    pub fn student(mut self, row: StudentRow) -> Self {
        self.students.push(row);
        self
    }

    /// Sets all rows at once.
    #[must_use]
    pub fn students(mut self, rows: Vec<StudentRow>) -> Self {
        self.students = rows;
        self
    }

    /// Builds the report.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidData` if the teacher or group id is missing.
    pub fn build(self) -> Result<GroupReport> {
        let teacher = self
            .teacher
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ReportError::InvalidData("teacher is required".to_string()))?;

        let group_id = self
            .group_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ReportError::InvalidData("group_id is required".to_string()))?;

        let group_label = self.group_label.unwrap_or_else(|| group_id.clone());

        Ok(GroupReport {
            teacher,
            group_id,
            group_label,
            generated_at: self.generated_at.unwrap_or_else(Utc::now),
            summary: GroupSummary::from_rows(&self.students),
            students: self.students,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use chrono::TimeZone;

    use super::*;

    pub(crate) fn row(name: &str, score: u8, modules: u32, topic: &str, band: EngagementBand) -> StudentRow {
        StudentRow {
            student_name: name.to_string(),
            school: Some("North School".to_string()),
            grade: Some("5th".to_string()),
            average_score: score,
            completed_modules: modules,
            struggling_topic: topic.to_string(),
            engagement_level: band,
        }
    }

    pub(crate) fn sample_report() -> GroupReport {
        GroupReport::builder()
            .teacher("tina")
            .group_id("g-1")
            .group_label("5th B - North School")
            .generated_at(Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap())
            .student(row("Alice", 30, 3, "Algebra", EngagementBand::Low))
            .student(row("Bruno", 80, 8, "History", EngagementBand::High))
            .student(row("Chen", 45, 4, "Algebra", EngagementBand::Medium))
            .build()
            .unwrap()
    }

    #[test]
    fn test_summary_from_rows() {
        let summary = sample_report().summary;
        assert_eq!(summary.students, 3);
        assert_eq!(summary.mean_score, Some(51.7));
        assert_eq!(summary.total_completed_modules, 15);
        assert_eq!(
            summary.engagement,
            EngagementCounts {
                high: 1,
                medium: 1,
                low: 1
            }
        );
        assert_eq!(summary.engagement.total(), 3);
        assert_eq!(summary.top_struggling_topic.as_deref(), Some("Algebra"));
    }

    #[test]
    fn test_empty_group_summary() {
        let summary = GroupSummary::from_rows(&[]);
        assert_eq!(summary.students, 0);
        assert_eq!(summary.mean_score, None);
        assert_eq!(summary.top_struggling_topic, None);
    }

    #[test]
    fn test_topic_tie_goes_to_first_linked() {
        let rows = vec![
            row("A", 10, 1, "History", EngagementBand::Low),
            row("B", 10, 1, "Algebra", EngagementBand::Low),
        ];
        let summary = GroupSummary::from_rows(&rows);
        assert_eq!(summary.top_struggling_topic.as_deref(), Some("History"));
    }

    #[test]
    fn test_builder_requires_teacher_and_group() {
        let err = GroupReport::builder().group_id("g").build().unwrap_err();
        assert!(matches!(err, ReportError::InvalidData(ref m) if m.contains("teacher")));

        let err = GroupReport::builder().teacher("tina").group_id("  ").build().unwrap_err();
        assert!(matches!(err, ReportError::InvalidData(ref m) if m.contains("group_id")));
    }

    #[test]
    fn test_label_defaults_to_id() {
        let report = GroupReport::builder().teacher("tina").group_id("g-9").build().unwrap();
        assert_eq!(report.group_label, "g-9");
        assert_eq!(report.file_stem(), "group-report-g-9");
    }

    #[test]
    fn test_write_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports");
        let files = sample_report().write_to_dir(&out).unwrap();

        assert_eq!(files.markdown, out.join("group-report-g-1.md"));
        assert_eq!(files.json, out.join("group-report-g-1.json"));

        let markdown = std::fs::read_to_string(&files.markdown).unwrap();
        assert!(markdown.contains("Alice"));

        let parsed: GroupReport =
            serde_json::from_str(&std::fs::read_to_string(&files.json).unwrap()).unwrap();
        assert_eq!(parsed, sample_report());
    }
}
