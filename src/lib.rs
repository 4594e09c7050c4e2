//! Measure, print and assert on the database queries a block of code executes.
//!
//! This crate is a test-instrumentation helper: it brackets a block of user
//! code with the host connection's query log, counts the statements that ran,
//! measures wall-clock time, optionally repeats the block across several runs
//! and renders captured SQL (and query plans) through a configurable handler
//! chain. Test suites use it to pin an upper bound on query counts, catching
//! N+1 regressions before they ship.
//!
//! The host database driver is an external collaborator: anything that can
//! record executed statements implements [`connection::Connection`]. The
//! crate ships [`connection::MemoryConnection`] as an in-memory
//! implementation suitable for wiring up ORM hooks or writing tests against
//! this crate itself.
//!
//! There are three entry points, all sharing one run executor:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use capture_queries::{CaptureQueries, Config};
//!
//! // Scoped, single-run form.
//! let capture = CaptureQueries::with_connection(Config::default(), Arc::clone(&conn))?;
//! capture.scoped(|| {
//!     let _rows = client.get(url);
//! })?;
//! // >>> Queries count: 10  |  Execution time: 0.040s  |  Vendor: sqlite
//!
//! // Repeated-run form, driven as an iterator.
//! let config = Config { number_runs: 2, advanced_verb: true, ..Config::default() };
//! let mut runs = CaptureQueries::with_connection(config, Arc::clone(&conn))?.runs();
//! while let Some(_run) = runs.next() {
//!     let _rows = client.get(url);
//! }
//! // >>> Test №1 | Queries count: 10 | Execution time: 0.04s
//! // >>> Test №2 | Queries count: 10 | Execution time: 0.04s
//! // >>> Tests count: 2  |  Total queries count: 20  |  Total execution time: 0.08s  |  Median time one test is: 0.041s  |  Vendor: sqlite
//!
//! // Decorator-equivalent form: call the block `number_runs` times.
//! let config = Config { assert_q_count: Some(20), number_runs: 2, ..Config::default() };
//! CaptureQueries::with_connection(config, conn)?.measure(|| {
//!     let _rows = client.get(url);
//! });
//! ```
//!
//! A failed query budget panics exactly like `assert!` would, with both the
//! observed and allowed counts in the message, so it fails the enclosing
//! test:
//!
//! ```text
//! 20 not less than or equal to 10 queries
//! ```
//!
//! # Limitations
//!
//! The captured block runs synchronously on the caller's thread and the
//! connection's query log is a single shared resource. Concurrent test-runner
//! workers need external isolation, one connection per worker.

#![deny(clippy::all)]
#![deny(clippy::perf)]
#![deny(clippy::suspicious)]
#![deny(clippy::complexity)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![allow(clippy::multiple_crate_versions)]

pub mod capture;
pub mod config;
pub mod connection;
pub mod handlers;
mod printer;
pub mod record;

pub use capture::{CaptureQueries, Run, Runs};
pub use config::Config;
pub use connection::Connection;
pub use handlers::{default_handlers, Handler, HandlerError};
pub use record::{QueryRecord, RunResult, Summary};

/// Errors produced by [`CaptureQueries`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// `number_runs` must be at least 1.
    #[error("number_runs must be at least 1")]
    ZeroRuns,
    /// Scoped capture measures exactly one run.
    #[error("scoped capture measures a single run, got number_runs = {0}")]
    MultiRunScoped(u32),
    /// Auto-calling has no target inside scoped capture.
    #[error("auto_call_func is not supported by scoped capture")]
    AutoCallScoped,
    /// Explain option names are restricted to word characters and dashes.
    #[error("invalid explain option name: {0:?}")]
    InvalidExplainOption(String),
    /// The connection cannot record executed statements.
    #[error("query logging unavailable on {vendor} connection")]
    LoggingUnavailable {
        /// Vendor label of the offending connection.
        vendor: String,
    },
    /// No process-wide default connection has been registered.
    #[error("no default connection registered, call connection::set_default first")]
    NoDefaultConnection,
    /// A process-wide default connection was already registered.
    #[error("a default connection is already registered")]
    DefaultAlreadySet,
}
