//! Canonical representation of captured measurements
//!
//! This module defines the data that flows out of a capture session: one
//! [`QueryRecord`] per statement the connection logged, one [`RunResult`] per
//! execution of the captured block and a single [`Summary`] aggregated over
//! all runs of a session. These structures are display-agnostic; the handler
//! chain and printer decide how they end up on screen.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// One captured database statement.
pub struct QueryRecord {
    /// The SQL text as the connection logged it.
    pub sql: String,
    /// Execution duration of this statement as reported by the host log.
    pub duration: Duration,
    /// Query-plan output attached when explain capture is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<String>,
}

impl QueryRecord {
    /// Create a record with no plan attached.
    #[must_use]
    pub fn new(sql: impl Into<String>, duration: Duration) -> Self {
        Self {
            sql: sql.into(),
            duration,
            explain: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
/// Outcome of one execution of the captured block.
pub struct RunResult {
    /// One-based ordinal of this run within the session.
    pub index: u32,
    /// Number of statements captured during the run.
    pub count: usize,
    /// Wall-clock time from run start to run stop.
    pub duration: Duration,
    /// The statements captured during the run, in execution order.
    pub records: Vec<QueryRecord>,
}

#[derive(Debug, Clone, Serialize)]
/// Aggregate over every [`RunResult`] of a capture session.
///
/// Computed once, after the final run. `total_queries` is always the sum of
/// each run's `count`.
pub struct Summary {
    /// Id distinguishing this session from re-runs of the same setup.
    pub run_id: Uuid,
    /// Number of runs measured.
    pub runs: u32,
    /// Total statements captured across all runs.
    pub total_queries: usize,
    /// Sum of per-run wall-clock durations.
    pub total_duration: Duration,
    /// Median of the per-run wall-clock durations.
    pub median_run_duration: Duration,
    /// Backend product label, e.g. "sqlite" or "postgresql".
    pub vendor: String,
}

impl Summary {
    pub(crate) fn from_runs(run_id: Uuid, vendor: &str, runs: &[RunResult]) -> Self {
        let durations: Vec<Duration> = runs.iter().map(|run| run.duration).collect();
        Self {
            run_id,
            runs: u32::try_from(runs.len()).unwrap_or(u32::MAX),
            total_queries: runs.iter().map(|run| run.count).sum(),
            total_duration: durations.iter().sum(),
            median_run_duration: median(&durations),
            vendor: vendor.to_owned(),
        }
    }
}

/// Middle value of the sorted durations; mean of the two middle values when
/// the count is even. Zero for an empty slice.
fn median(durations: &[Duration]) -> Duration {
    if durations.is_empty() {
        return Duration::ZERO;
    }
    let mut sorted = durations.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use proptest::prelude::*;
    use uuid::Uuid;

    use super::{median, RunResult, Summary};
    use crate::record::QueryRecord;

    fn run(index: u32, count: usize, duration: Duration) -> RunResult {
        let records = (0..count)
            .map(|i| QueryRecord::new(format!("SELECT {i}"), Duration::from_millis(1)))
            .collect();
        RunResult {
            index,
            count,
            duration,
            records,
        }
    }

    #[test]
    fn median_of_equal_pair_is_the_value() {
        let durations = [Duration::from_millis(40), Duration::from_millis(40)];
        assert_eq!(median(&durations), Duration::from_millis(40));
    }

    #[test]
    fn median_of_odd_count_is_middle_value() {
        let durations = [
            Duration::from_millis(40),
            Duration::from_millis(60),
            Duration::from_millis(100),
        ];
        assert_eq!(median(&durations), Duration::from_millis(60));
    }

    #[test]
    fn median_of_even_count_averages_middles() {
        let durations = [
            Duration::from_millis(20),
            Duration::from_millis(40),
            Duration::from_millis(60),
            Duration::from_millis(200),
        ];
        assert_eq!(median(&durations), Duration::from_millis(50));
    }

    #[test]
    fn median_ignores_input_order() {
        let durations = [
            Duration::from_millis(100),
            Duration::from_millis(40),
            Duration::from_millis(60),
        ];
        assert_eq!(median(&durations), Duration::from_millis(60));
    }

    #[test]
    fn summary_totals_over_runs() {
        let runs = [
            run(1, 3, Duration::from_millis(40)),
            run(2, 5, Duration::from_millis(60)),
        ];
        let summary = Summary::from_runs(Uuid::new_v4(), "sqlite", &runs);

        assert_eq!(summary.runs, 2);
        assert_eq!(summary.total_queries, 8);
        assert_eq!(summary.total_duration, Duration::from_millis(100));
        assert_eq!(summary.median_run_duration, Duration::from_millis(50));
        assert_eq!(summary.vendor, "sqlite");
    }

    #[test]
    fn summary_of_no_runs_is_empty() {
        let summary = Summary::from_runs(Uuid::new_v4(), "sqlite", &[]);
        assert_eq!(summary.runs, 0);
        assert_eq!(summary.total_queries, 0);
        assert_eq!(summary.median_run_duration, Duration::ZERO);
    }

    proptest! {
        #[test]
        fn total_queries_is_sum_of_run_counts(counts in proptest::collection::vec(0usize..50, 1..16)) {
            let runs: Vec<RunResult> = counts
                .iter()
                .enumerate()
                .map(|(i, count)| {
                    let index = u32::try_from(i + 1).expect("few runs");
                    run(index, *count, Duration::from_millis(i as u64))
                })
                .collect();
            let summary = Summary::from_runs(Uuid::new_v4(), "sqlite", &runs);

            prop_assert_eq!(summary.total_queries, counts.iter().sum::<usize>());
        }

        #[test]
        fn median_is_bounded_by_extremes(millis in proptest::collection::vec(0u64..10_000, 1..32)) {
            let durations: Vec<Duration> = millis.iter().copied().map(Duration::from_millis).collect();
            let m = median(&durations);

            let min = *durations.iter().min().expect("non-empty by construction");
            let max = *durations.iter().max().expect("non-empty by construction");
            prop_assert!(min <= m && m <= max);
        }
    }
}
