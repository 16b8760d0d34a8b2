//! GPA aggregation and report rendering

use crate::state_machine::CourseEntry;
use serde::{Deserialize, Serialize};

/// Finished GPA calculation for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Courses in collection order
    pub entries: Vec<CourseEntry>,
    /// One formatted line per course, same order as `entries`
    pub lines: Vec<String>,
    pub total_credits: f64,
    pub total_points: f64,
    pub gpa: f64,
}

impl Report {
    /// GPA rounded to two decimals
    pub fn gpa_rounded(&self) -> f64 {
        (self.gpa * 100.0).round() / 100.0
    }

    /// Full user-facing text: breakdown, total credits and GPA
    pub fn render(&self) -> String {
        let mut out = String::from("Your grade breakdown:\n");
        for line in &self.lines {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&format!("Total credits: {}\n", format_number(self.total_credits)));
        out.push_str(&format!("GPA: {:.2}", self.gpa));
        out
    }
}

/// Compute the weighted GPA over the collected courses.
///
/// Zero total credits (including an empty list) yields a GPA of 0.0.
pub fn finalize(entries: &[CourseEntry]) -> Report {
    let total_credits: f64 = entries.iter().map(|e| e.credit).sum();
    let total_points: f64 = entries.iter().map(CourseEntry::weighted_points).sum();
    let gpa = if total_credits > 0.0 {
        total_points / total_credits
    } else {
        0.0
    };

    Report {
        entries: entries.to_vec(),
        lines: entries.iter().map(format_line).collect(),
        total_credits,
        total_points,
        gpa,
    }
}

/// `3. 4 cr - 70% → C (1.7)`
pub fn format_line(entry: &CourseEntry) -> String {
    format!(
        "{}. {} cr - {}% → {} ({:.1})",
        entry.index,
        format_number(entry.credit),
        format_number(entry.score),
        entry.letter,
        entry.point
    )
}

/// Shortest decimal form: `3.0` → `3`, `2.50` → `2.5`
pub fn format_number(value: f64) -> String {
    let text = format!("{value:.6}");
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
