//! MySQL-backed metric source.
//!
//! Reads `information_schema.INNODB_METRICS` and
//! `information_schema.GLOBAL_STATUS` in one statement. Each row is tagged with
//! its namespace and decoded into a [`SourceRow`]; name and timestamp
//! derivation happen in `innostat-core`.

use std::collections::BTreeSet;

use innostat_core::types::parse_timestamp;
use innostat_core::{MetricName, MetricSource, MetricsError, Result, SourceRow};
use mysql_async::prelude::Queryable;
use mysql_async::{Opts, Pool, Row};
use tracing::{debug, info, warn};

const ENGINE_TAG: &str = "engine";
const STATUS_TAG: &str = "status";

const FETCH_ROWS: &str = "
SELECT 'engine' AS source, SUBSYSTEM, NAME, TYPE, STATUS,
       CAST(COUNT AS CHAR) AS value,
       CAST(TIME_ENABLED AS CHAR) AS base_ts,
       TIME_ELAPSED AS elapsed
FROM information_schema.INNODB_METRICS
UNION ALL SELECT 'status', NULL, VARIABLE_NAME, NULL, NULL,
       VARIABLE_VALUE,
       CAST(NOW() AS CHAR),
       NULL
FROM information_schema.GLOBAL_STATUS
";

const KNOWN_NAMES: &str = "
SELECT 'engine' AS source, SUBSYSTEM, NAME, TYPE
FROM information_schema.INNODB_METRICS
UNION ALL SELECT 'status', NULL, VARIABLE_NAME, NULL
FROM information_schema.GLOBAL_STATUS
";

/// Columns of one [`FETCH_ROWS`] result row.
pub type FetchColumns = (
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<i64>,
);

/// Columns of one [`KNOWN_NAMES`] result row.
pub type NameColumns = (String, Option<String>, String, Option<String>);

/// Read-only source over a MySQL server.
#[derive(Debug, Clone)]
pub struct MySqlSource {
    pool: Pool,
}

impl MySqlSource {
    /// Connects to the server at `dsn` and checks that it answers.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Source` if the URL is invalid or the server
    /// cannot be reached.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let opts = Opts::from_url(dsn).map_err(|e| MetricsError::source_error(format!("invalid dsn: {e}")))?;
        let pool = Pool::new(opts);

        let mut conn = pool.get_conn().await.map_err(MetricsError::source_error)?;
        let version: Option<String> = conn
            .query_first("SELECT VERSION()")
            .await
            .map_err(MetricsError::source_error)?;
        info!(server_version = version.as_deref().unwrap_or("unknown"), "connected to mysql");

        Ok(Self { pool })
    }

    async fn query_rows(&self, sql: &str) -> Result<Vec<Row>> {
        let mut conn = self.pool.get_conn().await.map_err(MetricsError::source_error)?;
        conn.query::<Row, _>(sql).await.map_err(MetricsError::source_error)
    }
}

impl MetricSource for MySqlSource {
    async fn fetch_rows(&mut self) -> Result<Vec<SourceRow>> {
        let rows = self.query_rows(FETCH_ROWS).await?;
        let total = rows.len();

        let decoded: Vec<SourceRow> = rows
            .into_iter()
            .filter_map(|row| match mysql_async::from_row_opt::<FetchColumns>(row) {
                Ok(columns) => decode_row(columns),
                Err(e) => {
                    warn!(error = %e, "skipping undecodable metric row");
                    None
                }
            })
            .collect();

        debug!(rows = total, decoded = decoded.len(), "read metric rows");
        Ok(decoded)
    }

    async fn known_names(&mut self) -> Result<Vec<MetricName>> {
        let rows = self.query_rows(KNOWN_NAMES).await?;

        let names: BTreeSet<MetricName> = rows
            .into_iter()
            .filter_map(|row| match mysql_async::from_row_opt::<NameColumns>(row) {
                Ok(columns) => decode_name(columns),
                Err(e) => {
                    warn!(error = %e, "skipping undecodable metric name row");
                    None
                }
            })
            .collect();

        Ok(names.into_iter().collect())
    }

    fn name(&self) -> &'static str {
        "mysql"
    }
}

/// Turns one tagged result row into a [`SourceRow`].
///
/// Rows with an unknown tag, a missing mandatory column or an unreadable
/// timestamp are dropped.
pub fn decode_row(columns: FetchColumns) -> Option<SourceRow> {
    let (source, subsystem, name, kind, status, value, base_ts, elapsed) = columns;
    match source.as_str() {
        ENGINE_TAG => Some(SourceRow::EngineCounter {
            subsystem: subsystem?,
            name,
            kind: kind?,
            status: status.unwrap_or_default(),
            count: value,
            enabled_at: base_ts.as_deref().and_then(|ts| parse_timestamp(ts).ok()),
            elapsed_secs: elapsed,
        }),
        STATUS_TAG => {
            let observed_at = match base_ts.as_deref().map(parse_timestamp) {
                Some(Ok(ts)) => ts,
                other => {
                    warn!(variable = %name, ts = ?other, "status row without server time");
                    return None;
                }
            };
            Some(SourceRow::StatusVariable {
                name,
                value,
                observed_at,
            })
        }
        other => {
            warn!(tag = other, "unknown metric source tag");
            None
        }
    }
}

/// Derives the catalog name of one tagged name row.
pub fn decode_name(columns: NameColumns) -> Option<MetricName> {
    let (source, subsystem, name, kind) = columns;
    let derived = match source.as_str() {
        ENGINE_TAG => MetricName::engine(subsystem.as_deref()?, &name, kind.as_deref()?),
        STATUS_TAG => MetricName::status(&name),
        _ => return None,
    };
    derived.ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("valid timestamp")
    }

    fn engine_columns(status: &str, base_ts: Option<&str>) -> FetchColumns {
        (
            "engine".to_string(),
            Some("lock".to_string()),
            "lock_row_lock_waits".to_string(),
            Some("counter".to_string()),
            Some(status.to_string()),
            Some("5".to_string()),
            base_ts.map(str::to_string),
            Some(2),
        )
    }

    #[test]
    fn test_decode_engine_row() {
        let row = decode_row(engine_columns("enabled", Some("2024-03-01 12:00:00"))).expect("row");
        assert_eq!(
            row,
            SourceRow::engine(
                "lock",
                "lock_row_lock_waits",
                "counter",
                "enabled",
                Some("5"),
                Some(t0()),
                Some(2),
            )
        );
    }

    #[test]
    fn test_decode_disabled_engine_row_without_enable_time() {
        let row = decode_row(engine_columns("disabled", None)).expect("row");
        assert!(!row.is_enabled());
        assert_eq!(row.timestamp(), None);
    }

    #[test]
    fn test_decode_status_row() {
        let row = decode_row((
            "status".to_string(),
            None,
            "Threads_connected".to_string(),
            None,
            None,
            Some("3".to_string()),
            Some("2024-03-01 12:00:00".to_string()),
            None,
        ))
        .expect("row");
        assert_eq!(row, SourceRow::status("Threads_connected", Some("3"), t0()));
    }

    #[test]
    fn test_decode_status_row_without_time_is_dropped() {
        let row = decode_row((
            "status".to_string(),
            None,
            "Uptime".to_string(),
            None,
            None,
            Some("1".to_string()),
            None,
            None,
        ));
        assert!(row.is_none());
    }

    #[test]
    fn test_decode_unknown_tag_is_dropped() {
        let mut columns = engine_columns("enabled", Some("2024-03-01 12:00:00"));
        columns.0 = "perf".to_string();
        assert!(decode_row(columns).is_none());
    }

    #[test]
    fn test_decode_names() {
        let engine = decode_name((
            "engine".to_string(),
            Some("lock".to_string()),
            "waits".to_string(),
            Some("counter".to_string()),
        ));
        assert_eq!(engine.as_ref().map(MetricName::as_str), Some("lock.waits.counter"));

        let status = decode_name(("status".to_string(), None, "Uptime".to_string(), None));
        assert_eq!(status.as_ref().map(MetricName::as_str), Some("status.uptime"));

        assert!(decode_name(("engine".to_string(), None, "waits".to_string(), None)).is_none());
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_dsn() {
        let err = MySqlSource::connect("postgres://nope").await.expect_err("invalid");
        assert!(matches!(err, MetricsError::Source { .. }));
    }
}
