//! Renders capture results as text lines
//!
//! Purely a side-effecting formatter over an injectable sink, stdout by
//! default. Verbosity gates which lines appear: `advanced_verb` gates the
//! per-run lines, `queries` gates the per-query blocks and `verbose` (or
//! `advanced_verb`) gates the closing single/summary line. Write failures
//! are cosmetic and logged, never propagated.

use std::io::Write;
use std::time::Duration;

use tracing::warn;

use crate::config::Config;
use crate::record::{QueryRecord, Summary};

pub(crate) struct Printer {
    vendor: String,
    verbose: bool,
    advanced_verb: bool,
    queries: bool,
    out: Box<dyn Write + Send>,
}

impl Printer {
    pub(crate) fn new(vendor: &str, config: &Config, out: Box<dyn Write + Send>) -> Self {
        Self {
            vendor: vendor.to_owned(),
            verbose: config.verbose,
            advanced_verb: config.advanced_verb,
            queries: config.queries,
            out,
        }
    }

    fn emit(&mut self, line: &str) {
        if let Err(err) = writeln!(self.out, "{line}") {
            warn!(%err, "failed to write capture output");
        }
    }

    /// One line per run, gated on `advanced_verb`.
    pub(crate) fn run_line(&mut self, index: u32, count: usize, duration: Duration) {
        if self.advanced_verb {
            let secs = duration.as_secs_f64();
            self.emit(&format!(
                "Test №{index} | Queries count: {count} | Execution time: {secs:.2}s"
            ));
        }
    }

    /// Closing line of the scoped single-run form.
    pub(crate) fn single_line(&mut self, count: usize, duration: Duration) {
        if self.verbose || self.advanced_verb {
            let secs = duration.as_secs_f64();
            let vendor = &self.vendor;
            self.emit(&format!(
                "Queries count: {count}  |  Execution time: {secs:.3}s  |  Vendor: {vendor}"
            ));
        }
    }

    /// Closing line of a multi-run session.
    pub(crate) fn summary_line(&mut self, summary: &Summary) {
        if self.verbose || self.advanced_verb {
            let runs = summary.runs;
            let total = summary.total_queries;
            let total_secs = summary.total_duration.as_secs_f64();
            let median_secs = summary.median_run_duration.as_secs_f64();
            let vendor = &self.vendor;
            self.emit(&format!(
                "Tests count: {runs}  |  Total queries count: {total}  |  \
                 Total execution time: {total_secs:.2}s  |  \
                 Median time one test is: {median_secs:.3}s  |  Vendor: {vendor}"
            ));
        }
    }

    /// The captured statements, one block per query, gated on `queries`.
    ///
    /// Records are expected to have been through the handler chain already;
    /// this renders whatever SQL and explain text they carry.
    pub(crate) fn query_blocks(&mut self, records: &[QueryRecord]) {
        if !self.queries || records.is_empty() {
            return;
        }
        let blocks: Vec<String> = records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let ordinal = i + 1;
                let secs = record.duration.as_secs_f64();
                let explain = record.explain.as_deref().unwrap_or("");
                let sql = &record.sql;
                format!("№[{ordinal}] time=[{secs:.3}]{explain}\n{sql}")
            })
            .collect();
        self.emit(&format!("\n\n{}\n", blocks.join("\n\n\n")));
    }
}
