//! The host query-log facility, as a trait
//!
//! This crate does not drive a database. The host driver or ORM already logs
//! executed statements when debug capture is enabled; [`Connection`] is the
//! seam through which a capture session reads that log. Implementations wrap
//! a real driver's instrumentation hook (a sqlite trace callback, an ORM
//! execute-wrapper and so on). [`MemoryConnection`] ships with the crate as
//! an implementation backed by a plain in-memory buffer, fed by whatever hook
//! the host exposes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;

use crate::record::QueryRecord;
use crate::Error;

/// A connection-like object exposing an executed-statement log.
pub trait Connection: Send + Sync {
    /// Backend product label reported in summaries, e.g. "sqlite".
    fn vendor(&self) -> &str;

    /// Whether the connection can record executed statements at all.
    ///
    /// Sessions check this once at setup and refuse to start when it is
    /// false, so the remaining methods may assume logging works.
    fn log_available(&self) -> bool {
        true
    }

    /// Begin recording executed statements. Any previously captured but
    /// undrained records are discarded.
    fn start_capture(&self);

    /// Stop recording and drain everything captured since
    /// [`start_capture`](Connection::start_capture), in execution order.
    fn stop_capture(&self) -> Vec<QueryRecord>;

    /// Produce a query plan for `sql`, if the backend supports plans.
    ///
    /// `opts` carries backend-specific EXPLAIN options; implementations are
    /// free to ignore them. The default implementation reports no plan.
    fn explain(&self, sql: &str, opts: &FxHashMap<String, String>) -> Option<String> {
        let _ = (sql, opts);
        None
    }
}

static DEFAULT_CONNECTION: OnceCell<Arc<dyn Connection>> = OnceCell::new();

/// Register the process-wide default connection used by
/// [`CaptureQueries::new`](crate::CaptureQueries::new).
///
/// # Errors
///
/// Returns [`Error::DefaultAlreadySet`] when a default was registered
/// before; the default is set once per process.
pub fn set_default(connection: Arc<dyn Connection>) -> Result<(), Error> {
    DEFAULT_CONNECTION
        .set(connection)
        .map_err(|_| Error::DefaultAlreadySet)
}

/// The registered process-wide default connection.
///
/// # Errors
///
/// Returns [`Error::NoDefaultConnection`] when [`set_default`] has not been
/// called.
pub fn default() -> Result<Arc<dyn Connection>, Error> {
    DEFAULT_CONNECTION
        .get()
        .cloned()
        .ok_or(Error::NoDefaultConnection)
}

#[derive(Debug, Default)]
struct CaptureState {
    capturing: bool,
    records: Vec<QueryRecord>,
}

#[derive(Debug)]
/// An in-memory [`Connection`] fed through [`log`](MemoryConnection::log).
///
/// Wire the host driver's statement hook to `log` and hand the connection to
/// a capture session. Also the rig this crate tests itself with.
pub struct MemoryConnection {
    vendor: String,
    available: bool,
    plan: Option<String>,
    state: Mutex<CaptureState>,
}

impl MemoryConnection {
    /// Create a connection reporting `vendor` in summaries.
    #[must_use]
    pub fn new(vendor: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            available: true,
            plan: None,
            state: Mutex::new(CaptureState::default()),
        }
    }

    /// Create a connection whose query log is unavailable. Sessions built on
    /// it fail with [`Error::LoggingUnavailable`].
    #[must_use]
    pub fn unavailable(vendor: impl Into<String>) -> Self {
        Self {
            available: false,
            ..Self::new(vendor)
        }
    }

    /// Attach a canned query plan returned for every SELECT statement.
    #[must_use]
    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }

    /// Record one executed statement. A no-op unless a capture is active,
    /// matching how debug cursors only log while enabled.
    pub fn log(&self, sql: impl Into<String>, duration: Duration) {
        let mut state = self.state.lock().expect("capture state poisoned");
        if state.capturing {
            state.records.push(QueryRecord::new(sql, duration));
        }
    }

    /// Whether a capture is currently active.
    pub fn is_capturing(&self) -> bool {
        self.state.lock().expect("capture state poisoned").capturing
    }
}

impl Connection for MemoryConnection {
    fn vendor(&self) -> &str {
        &self.vendor
    }

    fn log_available(&self) -> bool {
        self.available
    }

    fn start_capture(&self) {
        let mut state = self.state.lock().expect("capture state poisoned");
        state.capturing = true;
        state.records.clear();
    }

    fn stop_capture(&self) -> Vec<QueryRecord> {
        let mut state = self.state.lock().expect("capture state poisoned");
        state.capturing = false;
        std::mem::take(&mut state.records)
    }

    fn explain(&self, sql: &str, _opts: &FxHashMap<String, String>) -> Option<String> {
        if sql.trim_start().to_lowercase().starts_with("select") {
            self.plan.clone()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use rustc_hash::FxHashMap;

    use super::{Connection, MemoryConnection};

    #[test]
    fn logs_only_while_capturing() {
        let conn = MemoryConnection::new("sqlite");

        conn.log("SELECT 1", Duration::from_millis(1));
        assert!(conn.stop_capture().is_empty(), "not yet capturing");

        conn.start_capture();
        conn.log("SELECT 2", Duration::from_millis(1));
        conn.log("SELECT 3", Duration::from_millis(2));
        let records = conn.stop_capture();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sql, "SELECT 2");
        assert_eq!(records[1].sql, "SELECT 3");
    }

    #[test]
    fn stop_drains_and_disables() {
        let conn = MemoryConnection::new("sqlite");
        conn.start_capture();
        conn.log("SELECT 1", Duration::from_millis(1));

        assert_eq!(conn.stop_capture().len(), 1);
        assert!(!conn.is_capturing());
        assert!(conn.stop_capture().is_empty(), "drained on first stop");
    }

    #[test]
    fn start_discards_stale_records() {
        let conn = MemoryConnection::new("sqlite");
        conn.start_capture();
        conn.log("SELECT stale", Duration::from_millis(1));
        conn.start_capture();
        conn.log("SELECT fresh", Duration::from_millis(1));

        let records = conn.stop_capture();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sql, "SELECT fresh");
    }

    #[test]
    fn unavailable_connection_reports_it() {
        let conn = MemoryConnection::unavailable("postgresql");
        assert!(!conn.log_available());
        assert_eq!(conn.vendor(), "postgresql");
    }

    #[test]
    fn plan_is_returned_for_selects_only() {
        let conn = MemoryConnection::new("sqlite").with_plan("SCAN t");
        let opts = FxHashMap::default();

        assert_eq!(conn.explain("SELECT * FROM t", &opts), Some("SCAN t".to_owned()));
        assert_eq!(conn.explain("  select 1", &opts), Some("SCAN t".to_owned()));
        assert_eq!(conn.explain("UPDATE t SET a = 1", &opts), None);
    }
}
