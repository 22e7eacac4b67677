//! Run summaries
//!
//! This module collects per-page counters during a harvest and renders
//! them, together with the checkpoint contents, as text reports. A run
//! summary can also be written as JSON for scripts that drive the harvester.

use crate::harvest::PageOutcome;
use crate::progress::ProgressState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::RangeInclusive;
use std::path::Path;

/// Why a harvest run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunOutcome {
    /// The configured end page was reached
    Completed,
    /// The listing ran out of records
    EndOfData,
    /// Too many consecutive listing pages failed
    Halted,
    /// The progress file holds `max-records` completed units
    TargetReached,
}

impl RunOutcome {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Completed => "reached the configured end page",
            Self::EndOfData => "reached the end of the listing",
            Self::Halted => "halted after repeated page failures",
            Self::TargetReached => "reached the target record count",
        }
    }
}

/// Counters for one harvest run
#[derive(Debug, Clone, Serialize)]
pub struct HarvestSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Pages committed during this run
    pub pages_done: u64,

    /// Pages skipped because an earlier run committed them
    pub pages_skipped: u64,

    /// Pages whose listing could not be fetched or parsed
    pub pages_failed: Vec<u32>,

    /// Rows appended to the output
    pub units_stored: u64,

    /// Units skipped as already completed or duplicated
    pub units_skipped: u64,

    /// Units that failed permanently
    pub units_abandoned: u64,

    pub outcome: Option<RunOutcome>,
}

impl HarvestSummary {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            pages_done: 0,
            pages_skipped: 0,
            pages_failed: Vec::new(),
            units_stored: 0,
            units_skipped: 0,
            units_abandoned: 0,
            outcome: None,
        }
    }

    /// Adds the counters of a committed page
    pub fn record_page(&mut self, outcome: &PageOutcome) {
        self.pages_done += 1;
        self.units_stored += outcome.completed.len() as u64;
        self.units_abandoned += outcome.abandoned.len() as u64;
        self.units_skipped += outcome.skipped as u64;
    }

    pub fn finish(&mut self, outcome: RunOutcome) {
        self.finished_at = Some(Utc::now());
        self.outcome = Some(outcome);
    }

    pub fn duration_seconds(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

impl Default for HarvestSummary {
    fn default() -> Self {
        Self::new()
    }
}

/// Prints a run summary to stdout
pub fn print_summary(summary: &HarvestSummary) {
    println!("=== Harvest Summary ===\n");

    if let Some(outcome) = summary.outcome {
        println!("Outcome: {}", outcome.describe());
    }
    println!("Duration: {:.1}s", summary.duration_seconds());
    println!();

    println!("Pages:");
    println!("  Committed: {}", summary.pages_done);
    println!("  Already done: {}", summary.pages_skipped);
    println!("  Failed: {}", summary.pages_failed.len());
    if !summary.pages_failed.is_empty() {
        let pages: Vec<String> = summary.pages_failed.iter().map(u32::to_string).collect();
        println!("    {}", pages.join(", "));
    }
    println!();

    println!("Units:");
    println!("  Stored: {}", summary.units_stored);
    println!("  Skipped: {}", summary.units_skipped);
    println!("  Abandoned: {}", summary.units_abandoned);

    let duration = summary.duration_seconds();
    if duration > 0.0 && summary.units_stored > 0 {
        println!();
        println!(
            "Throughput: {:.2} units/sec",
            summary.units_stored as f64 / duration
        );
    }
}

/// Writes `summary` to `path` as pretty-printed JSON
pub fn write_summary_json(summary: &HarvestSummary, path: &Path) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Prints what a checkpoint says about a harvest
pub fn print_status(state: &ProgressState) {
    println!("=== Harvest Status ===\n");

    println!("Pages completed: {}", state.completed_pages.len());
    if let (Some(first), Some(last)) = (
        state.completed_pages.first(),
        state.completed_pages.last(),
    ) {
        println!("  Range: {} - {}", first, last);
        let gaps = missing_ranges(state);
        if !gaps.is_empty() {
            let ranges: Vec<String> = gaps
                .iter()
                .map(|gap| {
                    if gap.start() == gap.end() {
                        gap.start().to_string()
                    } else {
                        format!("{}-{}", gap.start(), gap.end())
                    }
                })
                .collect();
            println!("  Gaps: {}", ranges.join(", "));
        }
    }

    println!("Units completed: {}", state.completed_units.len());
    println!("Units abandoned: {}", state.abandoned_units.len());
    for (id, page) in &state.abandoned_units {
        println!("  - {} (page {})", id, page);
    }
}

/// Runs of uncompleted pages between the first and last completed page
///
/// Only neighbouring entries of the completed set are compared, so the cost
/// follows the number of completed pages, not the page numbers.
fn missing_ranges(state: &ProgressState) -> Vec<RangeInclusive<u32>> {
    state
        .completed_pages
        .iter()
        .zip(state.completed_pages.iter().skip(1))
        .filter(|&(&low, &high)| high - low > 1)
        .map(|(&low, &high)| low + 1..=high - 1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_page_counts() {
        let mut summary = HarvestSummary::new();
        summary.record_page(&PageOutcome {
            completed: vec!["a".to_string(), "b".to_string()],
            abandoned: vec!["c".to_string()],
            skipped: 4,
        });
        summary.record_page(&PageOutcome::default());

        assert_eq!(summary.pages_done, 2);
        assert_eq!(summary.units_stored, 2);
        assert_eq!(summary.units_abandoned, 1);
        assert_eq!(summary.units_skipped, 4);
    }

    #[test]
    fn test_finish_sets_outcome() {
        let mut summary = HarvestSummary::new();
        assert!(summary.outcome.is_none());

        summary.finish(RunOutcome::EndOfData);
        assert_eq!(summary.outcome, Some(RunOutcome::EndOfData));
        assert!(summary.finished_at.is_some());
        assert!(summary.duration_seconds() >= 0.0);
    }

    #[test]
    fn test_missing_ranges() {
        let mut state = ProgressState::new();
        state.record_page(1, &[], &[]);
        state.record_page(2, &[], &[]);
        state.record_page(5, &[], &[]);
        state.record_page(7, &[], &[]);

        assert_eq!(missing_ranges(&state), vec![3..=4, 6..=6]);
        assert!(missing_ranges(&ProgressState::new()).is_empty());
    }

    #[test]
    fn test_missing_ranges_with_far_apart_pages() {
        let mut state = ProgressState::new();
        state.record_page(2_000_000_000, &[], &[]);
        state.record_page(u32::MAX, &[], &[]);
        state.record_page(u32::MAX - 1, &[], &[]);

        assert_eq!(
            missing_ranges(&state),
            vec![2_000_000_001..=u32::MAX - 2]
        );
    }

    #[test]
    fn test_summary_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("summary.json");

        let mut summary = HarvestSummary::new();
        summary.record_page(&PageOutcome {
            completed: vec!["a".to_string()],
            abandoned: Vec::new(),
            skipped: 1,
        });
        summary.pages_failed.push(3);
        summary.finish(RunOutcome::TargetReached);

        write_summary_json(&summary, &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["outcome"], "target-reached");
        assert_eq!(value["pages_done"], 1);
        assert_eq!(value["units_stored"], 1);
        assert_eq!(value["pages_failed"], serde_json::json!([3]));
        assert!(value["started_at"].is_string());
        assert!(value["finished_at"].is_string());
    }
}
