//! Capture sessions: bracket user code with the connection's query log
//!
//! [`CaptureQueries`] is configured once and then consumed through one of
//! three entry points sharing a single session executor:
//!
//! * [`scoped`](CaptureQueries::scoped) — run a closure exactly once,
//!   the scoped context-manager equivalent;
//! * [`measure`](CaptureQueries::measure) / [`wrap`](CaptureQueries::wrap)
//!   — call a no-argument closure `number_runs` times, the decorator
//!   equivalent, eagerly or deferred;
//! * [`runs`](CaptureQueries::runs) — a lazy, finite, non-restartable
//!   iterator of run handles, one per run, with the caller's loop body as
//!   the captured block.
//!
//! Every run is bracketed by `Connection::start_capture` /
//! `Connection::stop_capture` and an `Instant` wall clock. A drop guard
//! releases the capture when the user's block panics, so the panic
//! propagates only after bookkeeping has finalized. Exceeding
//! `assert_q_count` panics after the final run with both counts in the
//! message, failing the enclosing test the way `assert!` does.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::connection::{self, Connection};
use crate::handlers::{self, Handler};
use crate::printer::Printer;
use crate::record::{QueryRecord, RunResult, Summary};
use crate::Error;

#[allow(missing_debug_implementations)]
/// Measures the number of database queries a block of code executes,
/// renders detail about the measurements and validates the query count.
pub struct CaptureQueries {
    config: Config,
    connection: Arc<dyn Connection>,
    handlers: Vec<Box<dyn Handler>>,
    writer: Box<dyn Write + Send>,
}

impl CaptureQueries {
    /// Create a session against the process-wide default connection, see
    /// [`connection::set_default`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoDefaultConnection`] when no default is registered,
    /// plus everything [`with_connection`](CaptureQueries::with_connection)
    /// returns.
    pub fn new(config: Config) -> Result<Self, Error> {
        let conn = connection::default()?;
        Self::with_connection(config, conn)
    }

    /// Create a session against an explicit connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroRuns`] or [`Error::InvalidExplainOption`] for a
    /// bad config and [`Error::LoggingUnavailable`] when the connection
    /// cannot record statements. All setup errors surface here, before any
    /// run executes.
    pub fn with_connection(config: Config, connection: Arc<dyn Connection>) -> Result<Self, Error> {
        config.validate()?;
        if !connection.log_available() {
            return Err(Error::LoggingUnavailable {
                vendor: connection.vendor().to_owned(),
            });
        }
        Ok(Self {
            config,
            connection,
            handlers: handlers::default_handlers(),
            writer: Box::new(io::stdout()),
        })
    }

    /// Replace the output-handler chain. An empty chain prints captured SQL
    /// verbatim.
    #[must_use]
    pub fn with_handlers(mut self, handlers: Vec<Box<dyn Handler>>) -> Self {
        self.handlers = handlers;
        self
    }

    /// Redirect output away from stdout, e.g. into a buffer under test.
    #[must_use]
    pub fn with_writer(mut self, writer: impl Write + Send + 'static) -> Self {
        self.writer = Box::new(writer);
        self
    }

    /// Run `block` exactly once and report on it; the scoped
    /// context-manager form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MultiRunScoped`] when the config asks for more than
    /// one run and [`Error::AutoCallScoped`] when it asks for auto-calling;
    /// both before `block` runs.
    ///
    /// # Panics
    ///
    /// Panics when the captured query count exceeds `assert_q_count`.
    pub fn scoped<F>(self, block: F) -> Result<Summary, Error>
    where
        F: FnOnce(),
    {
        if self.config.number_runs > 1 {
            return Err(Error::MultiRunScoped(self.config.number_runs));
        }
        if self.config.auto_call_func {
            return Err(Error::AutoCallScoped);
        }
        let mut session = Session::new(self);
        session.run_once(block);
        Ok(session.finalize_single())
    }

    /// Call `block` with no arguments exactly `number_runs` times,
    /// discarding its output; the auto-calling decorator form.
    ///
    /// # Panics
    ///
    /// Panics when the captured query count across all runs exceeds
    /// `assert_q_count`.
    pub fn measure<F>(self, mut block: F) -> Summary
    where
        F: FnMut(),
    {
        let number_runs = self.config.number_runs;
        let mut session = Session::new(self);
        for _ in 0..number_runs {
            session.run_once(&mut block);
        }
        session.finalize()
    }

    /// The deferred decorator form: nothing runs until the returned closure
    /// is invoked, which then behaves like
    /// [`measure`](CaptureQueries::measure).
    pub fn wrap<F>(self, block: F) -> impl FnOnce() -> Summary
    where
        F: FnMut(),
    {
        move || self.measure(block)
    }

    /// Drive the session as an iterator: one [`Run`] handle per run, the
    /// loop body being the captured block. The iteration that returns `None`
    /// finalizes the session.
    ///
    /// # Panics
    ///
    /// The finalizing iteration panics when the captured query count across
    /// all runs exceeds `assert_q_count`.
    #[must_use]
    pub fn runs(self) -> Runs {
        Runs {
            session: Session::new(self),
            next_index: 0,
            summary: None,
            done: false,
        }
    }
}

/// Handle for one run yielded by [`Runs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    index: u32,
}

impl Run {
    /// One-based ordinal of this run within the session.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }
}

#[allow(missing_debug_implementations)]
/// Lazy, finite, non-restartable sequence of capture runs.
pub struct Runs {
    session: Session,
    next_index: u32,
    summary: Option<Summary>,
    done: bool,
}

impl Runs {
    /// The session summary, available once iteration has finished.
    #[must_use]
    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }
}

impl Iterator for Runs {
    type Item = Run;

    fn next(&mut self) -> Option<Run> {
        if self.done {
            return None;
        }
        if self.next_index > 0 {
            // The caller's loop body just finished: close out that run.
            self.session.finish_run();
        }
        if self.next_index < self.session.config.number_runs {
            self.next_index += 1;
            self.session.begin_run();
            Some(Run {
                index: self.next_index,
            })
        } else {
            self.done = true;
            self.summary = Some(self.session.finalize());
            None
        }
    }
}

impl Drop for Runs {
    fn drop(&mut self) {
        // A loop body that broke out early (or panicked) leaves a run
        // in-flight; release the connection's log either way.
        self.session.abort_run();
    }
}

/// The shared run executor behind every entry point.
struct Session {
    config: Config,
    connection: Arc<dyn Connection>,
    handlers: Vec<Box<dyn Handler>>,
    printer: Printer,
    run_id: Uuid,
    results: Vec<RunResult>,
    started: Option<Instant>,
}

impl Session {
    fn new(capture: CaptureQueries) -> Self {
        let run_id = Uuid::new_v4();
        debug!(
            %run_id,
            vendor = capture.connection.vendor(),
            number_runs = capture.config.number_runs,
            "capture session started"
        );
        let printer = Printer::new(capture.connection.vendor(), &capture.config, capture.writer);
        Self {
            config: capture.config,
            connection: capture.connection,
            handlers: capture.handlers,
            printer,
            run_id,
            results: Vec::new(),
            started: None,
        }
    }

    fn begin_run(&mut self) {
        self.connection.start_capture();
        self.started = Some(Instant::now());
    }

    /// Close out the in-flight run: drain the log, attach plans, record the
    /// result and print the per-run line.
    fn finish_run(&mut self) {
        let mut records = self.connection.stop_capture();
        let duration = self
            .started
            .take()
            .map_or(Duration::ZERO, |started| started.elapsed());
        if self.config.explain {
            self.attach_plans(&mut records);
        }
        #[allow(clippy::cast_possible_truncation)]
        let index = self.results.len() as u32 + 1;
        debug!(run_id = %self.run_id, index, count = records.len(), "run finished");
        let result = RunResult {
            index,
            count: records.len(),
            duration,
            records,
        };
        self.printer.run_line(result.index, result.count, result.duration);
        self.results.push(result);
    }

    /// Run `block` bracketed by the capture. A panic inside `block` still
    /// releases the connection's log before propagating; the run is then
    /// lost, matching the contract that user errors pass through unchanged
    /// once bookkeeping has finalized.
    fn run_once<F>(&mut self, block: F)
    where
        F: FnOnce(),
    {
        self.begin_run();
        let guard = CaptureGuard {
            connection: &*self.connection,
            armed: true,
        };
        block();
        guard.disarm();
        self.finish_run();
    }

    /// Release an in-flight capture without recording a result.
    fn abort_run(&mut self) {
        if self.started.take().is_some() {
            let _ = self.connection.stop_capture();
        }
    }

    fn attach_plans(&mut self, records: &mut [QueryRecord]) {
        for record in records.iter_mut() {
            if record.sql.trim_start().to_lowercase().starts_with("select") {
                record.explain = self
                    .connection
                    .explain(&record.sql, &self.config.explain_opts);
            }
        }
    }

    fn print_queries(&mut self) {
        if !self.config.queries {
            return;
        }
        let all: Vec<QueryRecord> = self
            .results
            .iter()
            .flat_map(|run| run.records.iter().cloned())
            .collect();
        if let Some(records) = handlers::apply(&self.handlers, all) {
            self.printer.query_blocks(&records);
        }
    }

    /// Summary computation, display and threshold enforcement for the
    /// multi-run forms.
    fn finalize(&mut self) -> Summary {
        let summary = Summary::from_runs(self.run_id, self.connection.vendor(), &self.results);
        self.print_queries();
        self.printer.summary_line(&summary);
        self.enforce_threshold(summary.total_queries);
        summary
    }

    /// As [`finalize`](Session::finalize), with the scoped single-run line.
    fn finalize_single(&mut self) -> Summary {
        let summary = Summary::from_runs(self.run_id, self.connection.vendor(), &self.results);
        self.print_queries();
        self.printer
            .single_line(summary.total_queries, summary.total_duration);
        self.enforce_threshold(summary.total_queries);
        summary
    }

    /// Runs once, after the final run.
    fn enforce_threshold(&self, total: usize) {
        if let Some(allowed) = self.config.assert_q_count {
            assert!(
                total <= allowed,
                "{total} not less than or equal to {allowed} queries"
            );
        }
    }
}

struct CaptureGuard<'a> {
    connection: &'a dyn Connection,
    armed: bool,
}

impl CaptureGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.connection.stop_capture();
        }
    }
}
