//! Output-handler chain applied to captured records before display
//!
//! Each handler is polymorphic over a single capability: take the captured
//! record sequence, hand back a (possibly rewritten) sequence. Handlers run
//! in chain order. A failing handler aborts display formatting for the
//! session, never the count/duration bookkeeping; formatting is cosmetic.
//!
//! The default chain drops transaction markers, reindents SQL, highlights
//! keywords and brackets query plans. Replace it wholesale via
//! [`CaptureQueries::with_handlers`](crate::CaptureQueries::with_handlers);
//! an empty chain prints captured SQL verbatim.

use std::fmt;

use colored::Colorize;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::record::QueryRecord;

/// Error raised by a [`Handler`] that could not transform the records.
#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct HandlerError(pub String);

/// One step of the output-handler chain.
pub trait Handler: fmt::Debug + Send + Sync {
    /// Transform a sequence of query records into a sequence of query
    /// records.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the records cannot be transformed; the
    /// chain stops and the session skips query display for this run.
    fn transform(&self, records: Vec<QueryRecord>) -> Result<Vec<QueryRecord>, HandlerError>;
}

/// The chain applied when the user does not supply one:
/// [`FilterTransactionMarkers`], [`FormatSql`], [`ColorizeSql`],
/// [`FormatExplain`], in that order.
#[must_use]
pub fn default_handlers() -> Vec<Box<dyn Handler>> {
    vec![
        Box::new(FilterTransactionMarkers),
        Box::new(FormatSql),
        Box::new(ColorizeSql),
        Box::new(FormatExplain),
    ]
}

/// Run `records` through `handlers` in order. `None` means a handler failed
/// and display must be skipped; the failure has already been logged.
pub(crate) fn apply(
    handlers: &[Box<dyn Handler>],
    mut records: Vec<QueryRecord>,
) -> Option<Vec<QueryRecord>> {
    for handler in handlers {
        match handler.transform(records) {
            Ok(next) => records = next,
            Err(err) => {
                warn!(?handler, %err, "output handler failed, skipping query display");
                return None;
            }
        }
    }
    Some(records)
}

#[derive(Debug, Clone, Copy)]
/// Drops transaction bookkeeping statements (BEGIN, COMMIT, ROLLBACK) that
/// the host log records around the interesting queries.
pub struct FilterTransactionMarkers;

const EXCLUDE: [&str; 3] = ["BEGIN", "COMMIT", "ROLLBACK"];

impl Handler for FilterTransactionMarkers {
    fn transform(&self, records: Vec<QueryRecord>) -> Result<Vec<QueryRecord>, HandlerError> {
        Ok(records
            .into_iter()
            .filter(|record| !EXCLUDE.contains(&record.sql.trim().to_uppercase().as_str()))
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
/// Reindents and uppercases SQL text for readability.
pub struct FormatSql;

impl Handler for FormatSql {
    fn transform(&self, mut records: Vec<QueryRecord>) -> Result<Vec<QueryRecord>, HandlerError> {
        for record in &mut records {
            record.sql = sqlformat::format(
                &record.sql,
                &sqlformat::QueryParams::None,
                &sqlformat::FormatOptions {
                    uppercase: Some(true),
                    ..Default::default()
                },
            );
        }
        Ok(records)
    }
}

static SQL_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(SELECT|INSERT|UPDATE|DELETE|FROM|WHERE|JOIN|LEFT|RIGHT|INNER|OUTER|ON|AND|OR|NOT|IN|AS|ORDER|GROUP|BY|LIMIT|OFFSET|VALUES|SET|INTO|HAVING|DISTINCT|UNION)\b",
    )
    .expect("keyword pattern is valid")
});

#[derive(Debug, Clone, Copy)]
/// Highlights SQL keywords with ANSI color. Color output follows the
/// `colored` crate's tty detection, so piped test output stays plain.
pub struct ColorizeSql;

impl Handler for ColorizeSql {
    fn transform(&self, mut records: Vec<QueryRecord>) -> Result<Vec<QueryRecord>, HandlerError> {
        for record in &mut records {
            record.sql = SQL_KEYWORD
                .replace_all(&record.sql, |caps: &regex::Captures<'_>| {
                    caps[0].cyan().bold().to_string()
                })
                .into_owned();
        }
        Ok(records)
    }
}

#[derive(Debug, Clone, Copy)]
/// Rewrites an attached plan as ` explain=[…]`, bracketing multi-line plans
/// on their own lines, ready for the printer to splice into a query block.
pub struct FormatExplain;

impl Handler for FormatExplain {
    fn transform(&self, mut records: Vec<QueryRecord>) -> Result<Vec<QueryRecord>, HandlerError> {
        for record in &mut records {
            if let Some(plan) = record.explain.take() {
                let formatted = if plan.lines().count() > 1 {
                    format!(" explain=[\n{plan}\n]")
                } else {
                    format!(" explain=[{plan}]")
                };
                record.explain = Some(formatted);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::{
        apply, default_handlers, FilterTransactionMarkers, FormatExplain, FormatSql, Handler,
        HandlerError,
    };
    use crate::record::QueryRecord;

    fn record(sql: &str) -> QueryRecord {
        QueryRecord::new(sql, Duration::from_millis(1))
    }

    #[test]
    fn filter_drops_transaction_markers() {
        let records = vec![
            record("BEGIN"),
            record("SELECT 1"),
            record("commit"),
            record("  ROLLBACK  "),
            record("SELECT 2"),
        ];
        let out = FilterTransactionMarkers
            .transform(records)
            .expect("filter never fails");

        let sql: Vec<&str> = out.iter().map(|r| r.sql.as_str()).collect();
        assert_eq!(sql, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn format_sql_uppercases_keywords() {
        let out = FormatSql
            .transform(vec![record("select id from reporters where id = 1")])
            .expect("format never fails");

        assert!(out[0].sql.contains("SELECT"), "got: {}", out[0].sql);
        assert!(out[0].sql.contains("FROM"), "got: {}", out[0].sql);
        assert!(out[0].sql.contains("WHERE"), "got: {}", out[0].sql);
    }

    #[test]
    fn format_explain_single_line() {
        let mut rec = record("SELECT 1");
        rec.explain = Some("SCAN TABLE t".to_owned());
        let out = FormatExplain
            .transform(vec![rec])
            .expect("explain format never fails");

        assert_eq!(out[0].explain.as_deref(), Some(" explain=[SCAN TABLE t]"));
    }

    #[test]
    fn format_explain_multi_line() {
        let mut rec = record("SELECT 1");
        rec.explain = Some("SCAN TABLE t\nUSE INDEX i".to_owned());
        let out = FormatExplain
            .transform(vec![rec])
            .expect("explain format never fails");

        assert_eq!(
            out[0].explain.as_deref(),
            Some(" explain=[\nSCAN TABLE t\nUSE INDEX i\n]")
        );
    }

    #[test]
    fn records_without_plan_are_untouched() {
        let out = FormatExplain
            .transform(vec![record("SELECT 1")])
            .expect("explain format never fails");
        assert_eq!(out[0].explain, None);
    }

    #[test]
    fn empty_chain_is_identity() {
        let records = vec![record("select * from sneaky")];
        let out = apply(&[], records.clone()).expect("empty chain cannot fail");
        assert_eq!(out, records);
    }

    #[derive(Debug)]
    struct Exploding;

    impl Handler for Exploding {
        fn transform(&self, _: Vec<QueryRecord>) -> Result<Vec<QueryRecord>, HandlerError> {
            Err(HandlerError("boom".to_owned()))
        }
    }

    #[test]
    fn failing_handler_aborts_the_chain() {
        let chain: Vec<Box<dyn Handler>> = vec![Box::new(Exploding), Box::new(FormatSql)];
        assert!(apply(&chain, vec![record("SELECT 1")]).is_none());
    }

    #[test]
    fn default_chain_runs_end_to_end() {
        let mut rec = record("select id from reporters");
        rec.explain = Some("SCAN TABLE reporters".to_owned());
        let out =
            apply(&default_handlers(), vec![record("BEGIN"), rec]).expect("default chain succeeds");

        assert_eq!(out.len(), 1, "marker filtered");
        assert_eq!(
            out[0].explain.as_deref(),
            Some(" explain=[SCAN TABLE reporters]")
        );
    }
}
