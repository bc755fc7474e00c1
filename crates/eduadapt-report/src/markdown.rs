//! Markdown rendering of group reports.
//!
//! The document has a header table naming the teacher and group, a summary
//! table, and one table row per linked snapshot.

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::{GroupReport, StudentRow};

/// Generates Markdown from a [`GroupReport`].
pub struct MarkdownGenerator<'a> {
    report: &'a GroupReport,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a GroupReport) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown report.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_students(&mut output);
        self.write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Group Report: {}\n",
            escape_markdown(&self.report.group_label)
        );
        let _ = writeln!(output, "| Field | Value |");
        let _ = writeln!(output, "|-------|-------|");
        let _ = writeln!(
            output,
            "| Teacher | {} |",
            escape_markdown(&self.report.teacher)
        );
        let _ = writeln!(
            output,
            "| Group | {} |",
            escape_markdown(&self.report.group_id)
        );
        let _ = writeln!(output);
    }

    fn write_summary(&self, output: &mut String) {
        let summary = &self.report.summary;
        let engagement = summary.engagement;

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Students | {} |", summary.students);
        let _ = writeln!(
            output,
            "| Mean Score | {} |",
            summary
                .mean_score
                .map_or_else(|| "n/a".to_string(), |m| format!("{m:.1}"))
        );
        let _ = writeln!(
            output,
            "| Completed Modules | {} |",
            summary.total_completed_modules
        );
        let _ = writeln!(
            output,
            "| Engagement | {} high, {} medium, {} low |",
            engagement.high, engagement.medium, engagement.low
        );
        let _ = writeln!(
            output,
            "| Top Struggling Topic | {} |",
            summary
                .top_struggling_topic
                .as_deref()
                .map_or_else(|| "n/a".to_string(), escape_markdown)
        );
        let _ = writeln!(output);
    }

    fn write_students(&self, output: &mut String) {
        let _ = writeln!(output, "## Students\n");

        if self.report.students.is_empty() {
            let _ = writeln!(output, "*No students linked yet.*\n");
            return;
        }

        let _ = writeln!(
            output,
            "| Student | School | Grade | Score | Modules | Struggling Topic | Engagement |"
        );
        let _ = writeln!(
            output,
            "|---------|--------|-------|-------|---------|------------------|------------|"
        );
        for row in &self.report.students {
            write_row(output, row);
        }
        let _ = writeln!(output);
    }

    fn write_footer(&self, output: &mut String) {
        let _ = writeln!(output, "---");
        let timestamp = format_timestamp(&self.report.generated_at);
        let _ = writeln!(output, "*Generated by EduAdapt at {timestamp}*");
    }
}

fn write_row(output: &mut String, row: &StudentRow) {
    let _ = writeln!(
        output,
        "| {} | {} | {} | {} | {} | {} | {} |",
        escape_markdown(&row.student_name),
        optional_cell(row.school.as_deref()),
        optional_cell(row.grade.as_deref()),
        row.average_score,
        row.completed_modules,
        escape_markdown(&row.struggling_topic),
        row.engagement_level,
    );
}

// ============================================================================
// Helper Functions
// ============================================================================

fn optional_cell(value: Option<&str>) -> String {
    value.map_or_else(|| "-".to_string(), escape_markdown)
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escapes Markdown metacharacters so names render literally inside tables.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}
