//! Metric sources and row normalization.
//!
//! A source yields [`SourceRow`]s, one variant per server-side namespace.
//! [`normalize`] turns those rows into [`RawMeasurement`]s: it derives names
//! and timestamps per variant, drops disabled engine counters and skips values
//! that are not integers.

use std::collections::BTreeSet;

use chrono::{NaiveDateTime, TimeDelta};
use tracing::debug;

use crate::error::{MetricsError, Result};
use crate::types::{MetricName, RawMeasurement, SourceKind};

/// Status value marking an engine counter as collected.
pub const ENABLED_STATUS: &str = "enabled";

/// A row as read from one of the two metric namespaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRow {
    /// A row of `INNODB_METRICS`.
    EngineCounter {
        /// `SUBSYSTEM` column.
        subsystem: String,
        /// `NAME` column.
        name: String,
        /// `TYPE` column.
        kind: String,
        /// `STATUS` column, `enabled` or `disabled`.
        status: String,
        /// `COUNT` column, as text.
        count: Option<String>,
        /// `TIME_ENABLED` column.
        enabled_at: Option<NaiveDateTime>,
        /// `TIME_ELAPSED` column, in seconds.
        elapsed_secs: Option<i64>,
    },
    /// A row of `GLOBAL_STATUS`.
    StatusVariable {
        /// `VARIABLE_NAME` column.
        name: String,
        /// `VARIABLE_VALUE` column.
        value: Option<String>,
        /// Server `NOW()` at query time, shared by all status rows of a fetch.
        observed_at: NaiveDateTime,
    },
}

impl SourceRow {
    /// Convenience constructor for an engine counter row.
    #[must_use]
    pub fn engine(
        subsystem: impl Into<String>,
        name: impl Into<String>,
        kind: impl Into<String>,
        status: impl Into<String>,
        count: Option<&str>,
        enabled_at: Option<NaiveDateTime>,
        elapsed_secs: Option<i64>,
    ) -> Self {
        Self::EngineCounter {
            subsystem: subsystem.into(),
            name: name.into(),
            kind: kind.into(),
            status: status.into(),
            count: count.map(str::to_string),
            enabled_at,
            elapsed_secs,
        }
    }

    /// Convenience constructor for a status variable row.
    #[must_use]
    pub fn status(name: impl Into<String>, value: Option<&str>, observed_at: NaiveDateTime) -> Self {
        Self::StatusVariable {
            name: name.into(),
            value: value.map(str::to_string),
            observed_at,
        }
    }

    /// Which namespace this row belongs to.
    #[must_use]
    pub const fn kind(&self) -> SourceKind {
        match self {
            Self::EngineCounter { .. } => SourceKind::EngineCounter,
            Self::StatusVariable { .. } => SourceKind::StatusVariable,
        }
    }

    /// The catalog name of this row.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidMetricName` if the derived name is invalid.
    pub fn metric_name(&self) -> Result<MetricName> {
        match self {
            Self::EngineCounter {
                subsystem,
                name,
                kind,
                ..
            } => MetricName::engine(subsystem, name, kind),
            Self::StatusVariable { name, .. } => MetricName::status(name),
        }
    }

    /// Whether this row should produce a measurement at all.
    ///
    /// Status variables are not enable-gated.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::EngineCounter { status, .. } => status.eq_ignore_ascii_case(ENABLED_STATUS),
            Self::StatusVariable { .. } => true,
        }
    }

    /// The observation time of this row.
    ///
    /// Engine counters are stamped `enabled_at + elapsed_secs`; status
    /// variables carry the server time of the query.
    #[must_use]
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::EngineCounter {
                enabled_at,
                elapsed_secs,
                ..
            } => {
                let delta = TimeDelta::try_seconds((*elapsed_secs)?)?;
                enabled_at.as_ref()?.checked_add_signed(delta)
            }
            Self::StatusVariable { observed_at, .. } => Some(*observed_at),
        }
    }

    /// The raw value text of this row.
    #[must_use]
    pub fn raw_value(&self) -> Option<&str> {
        match self {
            Self::EngineCounter { count, .. } => count.as_deref(),
            Self::StatusVariable { value, .. } => value.as_deref(),
        }
    }
}

/// Parses a metric value as an integer.
///
/// A few server metrics are floating-point or textual (`ON`, `0.000`); those
/// are not supported and yield `None`.
#[must_use]
pub fn parse_value(text: &str) -> Option<i64> {
    text.trim().parse().ok()
}

/// Why a row produced no measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Engine counter with a status other than `enabled`.
    Disabled,
    /// Value missing or not an integer.
    Unparsable,
    /// No derivable timestamp.
    NoTimestamp,
    /// Derived name failed validation.
    InvalidName,
}

/// Output of [`normalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    /// Measurements in source order.
    pub measurements: Vec<RawMeasurement>,
    /// Rows that produced nothing, with the reason.
    pub skipped: Vec<(SourceKind, SkipReason)>,
}

impl Normalized {
    /// Number of rows skipped for the given reason.
    #[must_use]
    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped.iter().filter(|(_, r)| *r == reason).count()
    }
}

/// Converts source rows into named measurements.
///
/// Never fails: rows that cannot be converted are recorded in
/// [`Normalized::skipped`] and iteration continues.
#[must_use]
pub fn normalize(rows: Vec<SourceRow>) -> Normalized {
    let mut out = Normalized {
        measurements: Vec::with_capacity(rows.len()),
        skipped: Vec::new(),
    };

    for row in rows {
        match normalize_row(&row) {
            Ok(measurement) => out.measurements.push(measurement),
            Err(reason) => {
                debug!(kind = ?row.kind(), ?reason, value = ?row.raw_value(), "skipping source row");
                out.skipped.push((row.kind(), reason));
            }
        }
    }

    out
}

fn normalize_row(row: &SourceRow) -> std::result::Result<RawMeasurement, SkipReason> {
    if !row.is_enabled() {
        return Err(SkipReason::Disabled);
    }
    let value = row
        .raw_value()
        .and_then(parse_value)
        .ok_or(SkipReason::Unparsable)?;
    let timestamp = row.timestamp().ok_or(SkipReason::NoTimestamp)?;
    let name = row.metric_name().map_err(|_| SkipReason::InvalidName)?;
    Ok(RawMeasurement::new(timestamp, name, value))
}

/// Distinct catalog names of `rows`, regardless of status.
#[must_use]
pub fn distinct_names(rows: &[SourceRow]) -> Vec<MetricName> {
    rows.iter()
        .filter_map(|row| row.metric_name().ok())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// A read-only view of the monitored server's metrics.
#[allow(async_fn_in_trait)]
pub trait MetricSource {
    /// Reads the current rows of both namespaces.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Source` if the query fails.
    async fn fetch_rows(&mut self) -> Result<Vec<SourceRow>>;

    /// Returns the name of this source for logging purposes.
    fn name(&self) -> &'static str;

    /// Lists every metric name the server currently knows, including
    /// disabled engine counters.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Source` if the query fails.
    async fn known_names(&mut self) -> Result<Vec<MetricName>> {
        let rows = self.fetch_rows().await?;
        Ok(distinct_names(&rows))
    }

    /// Fetches and normalizes the current measurements.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Source` if the query fails. Individual bad
    /// rows never fail the fetch.
    async fn fetch_current(&mut self) -> Result<Vec<RawMeasurement>> {
        let rows = self.fetch_rows().await?;
        let normalized = normalize(rows);
        debug!(
            source = self.name(),
            measurements = normalized.measurements.len(),
            skipped = normalized.skipped.len(),
            "fetched current measurements"
        );
        Ok(normalized.measurements)
    }
}

/// In-memory source for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct FakeMetricSource {
    rows: Vec<SourceRow>,
    fail_with: Option<String>,
    fetches: usize,
}

impl FakeMetricSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a row and returns self for chaining.
    #[must_use]
    pub fn with_row(mut self, row: SourceRow) -> Self {
        self.rows.push(row);
        self
    }

    /// Replaces all rows.
    pub fn set_rows(&mut self, rows: Vec<SourceRow>) {
        self.rows = rows;
    }

    /// Appends a row.
    pub fn push_row(&mut self, row: SourceRow) {
        self.rows.push(row);
    }

    /// Makes every following fetch fail with `reason`.
    pub fn fail_with(&mut self, reason: impl Into<String>) {
        self.fail_with = Some(reason.into());
    }

    /// Number of fetches served so far.
    #[must_use]
    pub const fn fetches(&self) -> usize {
        self.fetches
    }
}

impl MetricSource for FakeMetricSource {
    async fn fetch_rows(&mut self) -> Result<Vec<SourceRow>> {
        if let Some(reason) = &self.fail_with {
            return Err(MetricsError::source_error(reason));
        }
        self.fetches += 1;
        Ok(self.rows.clone())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
