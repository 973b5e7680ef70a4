//! SQLite-backed durable store.
//!
//! This module provides the [`MetricStore`], which owns the local database:
//! the append-only `Metric` catalog table and the `Measurement` time series.
//! Both tables are created if absent every time the store is opened.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::types::Type;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::Result;
use crate::types::{format_timestamp, parse_timestamp, Measurement, MetricId, MetricName};

const CREATE_METRIC_TABLE: &str = "
CREATE TABLE IF NOT EXISTS Metric (
  id INTEGER PRIMARY KEY,
  name TEXT
)";

const CREATE_METRIC_NAME_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS metric_name ON Metric(name)";

const CREATE_MEASUREMENT_TABLE: &str = "
CREATE TABLE IF NOT EXISTS Measurement (
  ts TEXT,
  id INTEGER,
  value INTEGER,
  PRIMARY KEY(ts, id)
)";

/// Durable store for the metric catalog and measurements.
///
/// The store is owned by a single poller; it is not shared across threads.
#[derive(Debug)]
pub struct MetricStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl MetricStore {
    /// Opens (or creates) the database at `path` and ensures the schema.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Store` if the file cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.ensure_schema()?;
        debug!(path = %path.display(), "opened metric store");
        Ok(store)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Store` if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Path of the backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Creates the tables if they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Store` on SQL failure.
    pub fn ensure_schema(&self) -> Result<()> {
        for sql in [
            CREATE_METRIC_TABLE,
            CREATE_METRIC_NAME_INDEX,
            CREATE_MEASUREMENT_TABLE,
        ] {
            self.conn.execute(sql, [])?;
        }
        Ok(())
    }

    /// Inserts the names that are not catalogued yet, in one transaction.
    ///
    /// Existing names keep their ids. Returns the number of new names.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Store` if the transaction fails; nothing is
    /// inserted in that case.
    pub fn insert_names<'a, I>(&mut self, names: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a MetricName>,
    {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO Metric(name) VALUES (?1)")?;
            for name in names {
                inserted += stmt.execute(params![name.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Loads the full name-to-id mapping.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Store` on SQL failure, or
    /// `MetricsError::InvalidMetricName` if a stored name is invalid.
    pub fn load_names(&self) -> Result<HashMap<MetricName, MetricId>> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM Metric")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut names = HashMap::new();
        for row in rows {
            let (id, name) = row?;
            names.insert(MetricName::new(name)?, MetricId(id));
        }
        Ok(names)
    }

    /// Writes a batch of measurements atomically.
    ///
    /// Rows whose `(timestamp, id)` already exist are left untouched. Returns
    /// the number of rows actually inserted.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Store` if any insert or the commit fails; the
    /// transaction is rolled back and no row of the batch is visible.
    pub fn write_batch(&mut self, batch: &[Measurement]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO Measurement(ts, id, value) VALUES (?1, ?2, ?3)",
            )?;
            for m in batch {
                inserted += stmt.execute(params![
                    format_timestamp(&m.timestamp),
                    m.id.get(),
                    m.value
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Number of catalogued metric names.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Store` on SQL failure.
    pub fn metric_count(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM Metric")
    }

    /// Number of stored measurements.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Store` on SQL failure.
    pub fn measurement_count(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM Measurement")
    }

    /// All measurements of one metric, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Store` on SQL failure or if a stored timestamp
    /// cannot be parsed.
    pub fn measurements_for(&self, id: MetricId) -> Result<Vec<Measurement>> {
        let mut stmt = self
            .conn
            .prepare("SELECT ts, value FROM Measurement WHERE id = ?1 ORDER BY ts")?;
        let rows = stmt.query_map(params![id.get()], |row| {
            let ts: String = row.get(0)?;
            let timestamp = parse_timestamp(&ts).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
            })?;
            Ok(Measurement {
                timestamp,
                id,
                value: row.get(1)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    #[allow(clippy::cast_sign_loss)] // COUNT(*) is never negative
    fn count(&self, sql: &str) -> Result<usize> {
        let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as usize)
    }
}
