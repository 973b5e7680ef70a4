//! Core types for the polling pipeline.
//!
//! This module provides the fundamental types used throughout the crate:
//! - [`MetricName`]: a validated, dotted metric name
//! - [`MetricId`]: the stable surrogate key a name is catalogued under
//! - [`RawMeasurement`]: a named observation as produced by a source
//! - [`Measurement`]: a resolved observation as persisted by the store

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, Result};

/// Text format of `Measurement.ts`. The fractional part is omitted when zero.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Renders a timestamp the way it is keyed in the store.
#[must_use]
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a timestamp previously rendered with [`format_timestamp`].
///
/// # Errors
///
/// Returns the chrono parse error if `text` is not in [`TIMESTAMP_FORMAT`].
pub fn parse_timestamp(text: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
}

/// Which server-side namespace a metric comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// `information_schema.INNODB_METRICS`.
    EngineCounter,
    /// `information_schema.GLOBAL_STATUS`.
    StatusVariable,
}

/// A validated metric name.
///
/// Names are derived from one of two source shapes:
/// - engine counters: `subsystem.name.type`
/// - status variables: `status.` followed by the lower-cased variable name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricName(String);

impl MetricName {
    /// Maximum allowed length for a metric name, in bytes.
    pub const MAX_LENGTH: usize = 256;

    /// Prefix shared by every status-variable name.
    pub const STATUS_PREFIX: &'static str = "status";

    /// Creates a new validated metric name.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidMetricName` if the name is empty,
    /// too long, or contains whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();

        if name.is_empty() {
            return Err(MetricsError::InvalidMetricName {
                reason: "metric name cannot be empty".to_string(),
            });
        }

        if name.len() > Self::MAX_LENGTH {
            return Err(MetricsError::InvalidMetricName {
                reason: format!(
                    "metric name exceeds maximum length of {} bytes",
                    Self::MAX_LENGTH
                ),
            });
        }

        if let Some(c) = name.chars().find(|c| c.is_whitespace()) {
            return Err(MetricsError::InvalidMetricName {
                reason: format!("invalid character {c:?} in metric name"),
            });
        }

        Ok(Self(name))
    }

    /// Derives the name of an engine counter: `subsystem.name.type`.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidMetricName` if the joined name is invalid.
    pub fn engine(subsystem: &str, name: &str, kind: &str) -> Result<Self> {
        Self::new(format!("{subsystem}.{name}.{kind}"))
    }

    /// Derives the name of a status variable: `status.<lowercase name>`.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::InvalidMetricName` if the joined name is invalid.
    pub fn status(variable: &str) -> Result<Self> {
        Self::new(format!(
            "{}.{}",
            Self::STATUS_PREFIX,
            variable.to_lowercase()
        ))
    }

    /// Returns the metric name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `MetricName` and returns the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for MetricName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MetricName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Surrogate key of a catalogued metric name.
///
/// Assigned once by the store and never reassigned or reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricId(pub i64);

impl MetricId {
    /// Returns the raw integer key.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for MetricId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named observation, as read from the monitored server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMeasurement {
    /// When the value was observed (server-local time).
    pub timestamp: NaiveDateTime,
    /// Normalized metric name.
    pub name: MetricName,
    /// Observed value.
    pub value: i64,
}

impl RawMeasurement {
    /// Creates a new raw measurement.
    #[must_use]
    pub const fn new(timestamp: NaiveDateTime, name: MetricName, value: i64) -> Self {
        Self {
            timestamp,
            name,
            value,
        }
    }

    /// Attaches a catalog id, producing a storable [`Measurement`].
    #[must_use]
    pub const fn resolved(&self, id: MetricId) -> Measurement {
        Measurement {
            timestamp: self.timestamp,
            id,
            value: self.value,
        }
    }
}

/// A resolved observation. `(timestamp, id)` is unique in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    /// When the value was observed.
    pub timestamp: NaiveDateTime,
    /// Catalog id of the metric.
    pub id: MetricId,
    /// Observed value.
    pub value: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .expect("valid timestamp")
    }

    mod metric_name {
        use super::*;

        #[test]
        fn valid_names() {
            assert!(MetricName::new("lock.waits.counter").is_ok());
            assert!(MetricName::new("status.uptime").is_ok());
            assert!(MetricName::new("x").is_ok());
        }

        #[test]
        fn empty_name_rejected() {
            let result = MetricName::new("");
            assert!(matches!(
                result,
                Err(MetricsError::InvalidMetricName { .. })
            ));
        }

        #[test]
        fn whitespace_rejected() {
            assert!(MetricName::new("lock waits").is_err());
            assert!(MetricName::new("lock\twaits").is_err());
        }

        #[test]
        fn max_length() {
            let at_limit = "a".repeat(MetricName::MAX_LENGTH);
            assert!(MetricName::new(at_limit).is_ok());

            let over_limit = "a".repeat(MetricName::MAX_LENGTH + 1);
            assert!(MetricName::new(over_limit).is_err());
        }

        #[test]
        fn engine_name_is_subsystem_name_type() {
            let name = MetricName::engine("lock", "waits", "counter").expect("valid");
            assert_eq!(name.as_str(), "lock.waits.counter");
        }

        #[test]
        fn status_name_is_lowercased_with_prefix() {
            let name = MetricName::status("Threads_connected").expect("valid");
            assert_eq!(name.as_str(), "status.threads_connected");
        }

        #[test]
        fn status_names_collide_on_case() {
            let a = MetricName::status("Uptime").expect("valid");
            let b = MetricName::status("UPTIME").expect("valid");
            assert_eq!(a, b);
        }

        #[test]
        fn display_and_as_ref() {
            let name = MetricName::new("status.uptime").expect("valid");
            assert_eq!(format!("{name}"), "status.uptime");
            assert_eq!(name.as_ref(), "status.uptime");
            assert_eq!(name.into_inner(), "status.uptime".to_string());
        }

        #[test]
        fn serializes_as_plain_string() {
            let name = MetricName::new("status.uptime").expect("valid");
            let json = serde_json::to_string(&name).expect("serialize");
            assert_eq!(json, "\"status.uptime\"");
        }
    }

    mod timestamps {
        use super::*;

        #[test]
        fn whole_seconds_have_no_fraction() {
            assert_eq!(format_timestamp(&ts(10, 0, 2)), "2024-03-01 10:00:02");
        }

        #[test]
        fn fractional_seconds_are_kept() {
            let t = ts(10, 0, 2) + chrono::TimeDelta::milliseconds(250);
            assert_eq!(format_timestamp(&t), "2024-03-01 10:00:02.250");
        }

        #[test]
        fn parse_inverts_format() {
            let t = ts(23, 59, 59);
            assert_eq!(parse_timestamp(&format_timestamp(&t)).expect("parse"), t);
        }
    }

    mod measurement {
        use super::*;

        #[test]
        fn resolved_keeps_timestamp_and_value() {
            let name = MetricName::new("status.uptime").expect("valid");
            let raw = RawMeasurement::new(ts(1, 2, 3), name, 42);
            let m = raw.resolved(MetricId(7));
            assert_eq!(m.timestamp, ts(1, 2, 3));
            assert_eq!(m.id, MetricId(7));
            assert_eq!(m.value, 42);
        }

        #[test]
        fn raw_measurement_json_shape() {
            let name = MetricName::new("status.uptime").expect("valid");
            let raw = RawMeasurement::new(ts(1, 2, 3), name, 42);
            let value = serde_json::to_value(&raw).expect("serialize");
            assert_eq!(value["name"], "status.uptime");
            assert_eq!(value["value"], 42);
            assert_eq!(value["timestamp"], "2024-03-01T01:02:03");
        }
    }
}
