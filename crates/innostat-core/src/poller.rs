//! The poll loop.
//!
//! [`Poller`] ties a [`MetricSource`] to a [`MetricStore`]: it bootstraps
//! the catalog once, then repeatedly fetches, resolves, writes and
//! optionally echoes each batch as one line of JSON before sleeping.

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::MetricCatalog;
use crate::error::Result;
use crate::source::MetricSource;
use crate::store::MetricStore;
use crate::types::{Measurement, MetricName, RawMeasurement};

/// What to do with measurements whose name is not in the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    /// Catalog the new names, then write the rows.
    #[default]
    Register,
    /// Drop the rows for this cycle.
    Skip,
}

impl std::str::FromStr for UnresolvedPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "register" => Ok(Self::Register),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown unresolved-name policy '{other}' (expected register or skip)")),
        }
    }
}

/// Poller settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerOptions {
    /// Delay between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// Echo each cycle's raw measurements as JSON.
    pub json_output: bool,
    /// Handling of names missing from the catalog.
    pub unresolved: UnresolvedPolicy,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            json_output: false,
            unresolved: UnresolvedPolicy::default(),
        }
    }
}

/// Lifecycle of a [`Poller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Catalog not loaded yet.
    Bootstrapping,
    /// Running a cycle.
    Polling,
    /// Waiting for the next cycle.
    Sleeping,
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Measurements returned by the source.
    pub fetched: usize,
    /// Rows newly inserted into the store.
    pub written: usize,
    /// Rows already present from an earlier cycle.
    pub duplicates: usize,
    /// Rows whose name was not catalogued before this cycle.
    pub unresolved: usize,
    /// Rows dropped under [`UnresolvedPolicy::Skip`].
    pub dropped: usize,
    /// Running total of rows written since start.
    pub total_written: u64,
}

/// Drives the fetch → resolve → write → emit → sleep loop.
pub struct Poller<S, W = io::Stdout> {
    source: S,
    store: MetricStore,
    catalog: Option<MetricCatalog>,
    options: PollerOptions,
    output: W,
    state: PollerState,
    cycles: u64,
    total_written: u64,
}

impl<S: MetricSource> Poller<S, io::Stdout> {
    /// Creates a poller that echoes JSON to standard output.
    pub fn new(source: S, store: MetricStore, options: PollerOptions) -> Self {
        Self::with_output(source, store, options, io::stdout())
    }
}

impl<S: MetricSource, W: Write> Poller<S, W> {
    /// Creates a poller that echoes JSON to `output`.
    pub fn with_output(source: S, store: MetricStore, options: PollerOptions, output: W) -> Self {
        Self {
            source,
            store,
            catalog: None,
            options,
            output,
            state: PollerState::Bootstrapping,
            cycles: 0,
            total_written: 0,
        }
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> PollerState {
        self.state
    }

    /// The underlying store.
    pub const fn store(&self) -> &MetricStore {
        &self.store
    }

    /// The loaded catalog, once bootstrapped.
    pub const fn catalog(&self) -> Option<&MetricCatalog> {
        self.catalog.as_ref()
    }

    /// The metric source.
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Mutable access to the metric source.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// The JSON echo sink.
    pub const fn output(&self) -> &W {
        &self.output
    }

    /// Completed cycles.
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Rows written since start.
    pub const fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Discovers all known metric names and loads the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot list names or the catalog
    /// cannot be written or read.
    pub async fn bootstrap(&mut self) -> Result<()> {
        self.state = PollerState::Bootstrapping;
        let names = self.source.known_names().await?;
        let catalog = MetricCatalog::bootstrap(&mut self.store, &names)?;
        self.catalog = Some(catalog);
        self.state = PollerState::Polling;
        Ok(())
    }

    /// Runs a single cycle, bootstrapping first if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if fetching, writing or echoing fails. Nothing of
    /// the cycle is persisted when the write fails.
    pub async fn poll_once(&mut self) -> Result<CycleReport> {
        if self.catalog.is_none() {
            self.bootstrap().await?;
        }
        self.state = PollerState::Polling;

        let raw = self.source.fetch_current().await?;
        let (batch, unresolved, dropped) = self.resolve(&raw)?;

        let written = self.store.write_batch(&batch)?;
        if self.options.json_output {
            self.emit(&raw)?;
        }

        self.cycles += 1;
        self.total_written += written as u64;

        let report = CycleReport {
            fetched: raw.len(),
            written,
            duplicates: batch.len() - written,
            unresolved,
            dropped,
            total_written: self.total_written,
        };
        info!(
            cycle = self.cycles,
            fetched = report.fetched,
            written = report.written,
            duplicates = report.duplicates,
            total = report.total_written,
            "measurements"
        );
        Ok(report)
    }

    /// Bootstraps, then polls forever with a fixed delay between cycles.
    ///
    /// Only returns on error.
    ///
    /// # Errors
    ///
    /// Returns the first error of any cycle.
    pub async fn run(&mut self) -> Result<()> {
        self.bootstrap().await?;
        info!(
            source = self.source.name(),
            interval = ?self.options.interval,
            json = self.options.json_output,
            "polling"
        );
        loop {
            self.poll_once().await?;
            self.state = PollerState::Sleeping;
            tokio::time::sleep(self.options.interval).await;
        }
    }

    /// Maps names to ids, applying the unresolved-name policy.
    fn resolve(&mut self, raw: &[RawMeasurement]) -> Result<(Vec<Measurement>, usize, usize)> {
        let Some(catalog) = self.catalog.as_mut() else {
            return Ok((Vec::new(), 0, 0));
        };

        let missing: Vec<MetricName> = raw
            .iter()
            .filter(|m| !catalog.contains(&m.name))
            .map(|m| m.name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let unresolved = raw.iter().filter(|m| !catalog.contains(&m.name)).count();

        if !missing.is_empty() {
            match self.options.unresolved {
                UnresolvedPolicy::Register => {
                    let added = catalog.register(&mut self.store, &missing)?;
                    info!(names = missing.len(), added, "catalogued newly seen metrics");
                }
                UnresolvedPolicy::Skip => {
                    warn!(
                        names = missing.len(),
                        rows = unresolved,
                        first = %missing[0],
                        "dropping measurements of uncatalogued metrics"
                    );
                }
            }
        }

        let batch: Vec<Measurement> = raw
            .iter()
            .filter_map(|m| catalog.resolve(&m.name).map(|id| m.resolved(id)))
            .collect();
        let dropped = raw.len() - batch.len();
        if dropped > 0 {
            debug!(dropped, "unresolved measurements not written");
        }
        Ok((batch, unresolved, dropped))
    }

    fn emit(&mut self, raw: &[RawMeasurement]) -> Result<()> {
        serde_json::to_writer(&mut self.output, raw)?;
        self.output.write_all(b"\n")?;
        self.output.flush()?;
        Ok(())
    }
}
