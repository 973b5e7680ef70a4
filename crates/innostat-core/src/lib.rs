//! Metric catalog, normalization and idempotent persistence for MySQL metric polling.
#![forbid(unsafe_code)]
//!
//! `innostat-core` holds the pipeline that turns the two metric namespaces of
//! a MySQL server (`INNODB_METRICS` engine counters and `GLOBAL_STATUS`
//! variables) into a stable, append-only SQLite time series.
//!
//! # Pipeline
//!
//! - **Source**: a [`MetricSource`] yields tagged [`SourceRow`]s; [`normalize`]
//!   derives dotted names and timestamps, drops disabled counters and skips
//!   non-integer values.
//! - **Catalog**: [`MetricCatalog`] maps each [`MetricName`] to a permanent
//!   [`MetricId`]. It only grows.
//! - **Store**: [`MetricStore`] writes each batch in one transaction and
//!   ignores `(timestamp, id)` pairs it already holds.
//! - **Poller**: [`Poller`] runs the loop.
//!
//! # Example
//!
//! ```rust
//! use innostat_core::{FakeMetricSource, MetricStore, Poller, PollerOptions, SourceRow};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let now = chrono::Utc::now().naive_utc();
//! let source = FakeMetricSource::new().with_row(SourceRow::status("Uptime", Some("42"), now));
//! let store = MetricStore::open_in_memory().unwrap();
//!
//! let mut poller = Poller::with_output(source, store, PollerOptions::default(), Vec::new());
//! let report = poller.poll_once().await.unwrap();
//! assert_eq!(report.written, 1);
//! # });
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod catalog;
pub mod error;
pub mod poller;
pub mod source;
pub mod store;
pub mod types;

// Re-export main types at crate root
pub use catalog::MetricCatalog;
pub use error::{MetricsError, Result};
pub use poller::{CycleReport, Poller, PollerOptions, PollerState, UnresolvedPolicy};
pub use source::{normalize, parse_value, FakeMetricSource, MetricSource, Normalized, SkipReason, SourceRow};
pub use store::MetricStore;
pub use types::{Measurement, MetricId, MetricName, RawMeasurement, SourceKind};
