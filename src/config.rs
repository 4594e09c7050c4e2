//! Options recognized by a capture session
//!
//! A [`Config`] is handed to [`CaptureQueries`](crate::CaptureQueries) at
//! construction and is immutable once the session starts. Bad combinations
//! are rejected at setup time, before any run executes.

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::Error;

// Mirrors the identifier rule for EXPLAIN options: word characters and
// dashes, with `--` rejected to keep comment injection out of the prefix.
static EXPLAIN_OPTION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w\-]+$").expect("explain option pattern is valid"));

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
/// Configuration of a capture session.
pub struct Config {
    /// Upper bound on the total query count across all runs. Exceeding it
    /// panics with both counts in the message, failing the enclosing test.
    #[serde(default)]
    pub assert_q_count: Option<usize>,
    /// How many times the captured block runs. Must be at least 1.
    #[serde(default = "default_number_runs")]
    pub number_runs: u32,
    /// Print the final summary line.
    #[serde(default = "default_verbose")]
    pub verbose: bool,
    /// Print one line per run.
    #[serde(default)]
    pub advanced_verb: bool,
    /// Historical decorator option. The split entry points subsume it:
    /// [`measure`](crate::CaptureQueries::measure) always calls the block,
    /// [`wrap`](crate::CaptureQueries::wrap) never does. Retained because
    /// scoped capture must reject it, see
    /// [`Error::AutoCallScoped`](crate::Error::AutoCallScoped).
    #[serde(default)]
    pub auto_call_func: bool,
    /// Print the captured SQL statements after the final run.
    #[serde(default)]
    pub queries: bool,
    /// Ask the connection for a query plan per captured SELECT statement.
    #[serde(default)]
    pub explain: bool,
    /// Backend-specific EXPLAIN options, e.g. `analyze` for postgresql.
    #[serde(default)]
    pub explain_opts: FxHashMap<String, String>,
}

fn default_number_runs() -> u32 {
    1
}

fn default_verbose() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            assert_q_count: None,
            number_runs: default_number_runs(),
            verbose: default_verbose(),
            advanced_verb: false,
            auto_call_func: false,
            queries: false,
            explain: false,
            explain_opts: FxHashMap::default(),
        }
    }
}

impl Config {
    /// Reject option combinations that can never run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroRuns`] when `number_runs` is zero and
    /// [`Error::InvalidExplainOption`] for malformed explain option names.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.number_runs == 0 {
            return Err(Error::ZeroRuns);
        }
        for name in self.explain_opts.keys() {
            if !EXPLAIN_OPTION_NAME.is_match(name) || name.contains("--") {
                return Err(Error::InvalidExplainOption(name.clone()));
            }
        }
        Ok(())
    }
}
