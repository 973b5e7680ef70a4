//! In-memory snapshot of the metric catalog.
//!
//! The durable catalog lives in the store's `Metric` table and only ever
//! grows. [`MetricCatalog`] mirrors it in memory so that resolving a name
//! during a poll is a plain map lookup. The snapshot is refreshed explicitly,
//! either wholesale with [`MetricCatalog::refresh`] or after registering
//! newly seen names with [`MetricCatalog::register`].

use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::Result;
use crate::store::MetricStore;
use crate::types::{MetricId, MetricName};

/// Name-to-id mapping loaded from a [`MetricStore`].
#[derive(Debug, Clone, Default)]
pub struct MetricCatalog {
    ids: HashMap<MetricName, MetricId>,
}

impl MetricCatalog {
    /// Loads the current catalog without registering anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn load(store: &MetricStore) -> Result<Self> {
        Ok(Self {
            ids: store.load_names()?,
        })
    }

    /// Registers every name not yet catalogued, then loads the snapshot.
    ///
    /// Safe to call on every start: known names keep their ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the names cannot be inserted or the catalog
    /// cannot be read back.
    pub fn bootstrap(store: &mut MetricStore, names: &[MetricName]) -> Result<Self> {
        let added = store.insert_names(names)?;
        let catalog = Self::load(store)?;
        info!(
            discovered = names.len(),
            added,
            catalogued = catalog.len(),
            "bootstrapped metric catalog"
        );
        Ok(catalog)
    }

    /// Reloads the snapshot from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn refresh(&mut self, store: &MetricStore) -> Result<()> {
        self.ids = store.load_names()?;
        Ok(())
    }

    /// Registers names observed after bootstrap and refreshes the snapshot.
    ///
    /// Returns the number of names that were new to the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert or the reload fails.
    pub fn register(&mut self, store: &mut MetricStore, names: &[MetricName]) -> Result<usize> {
        if names.is_empty() {
            return Ok(0);
        }
        let added = store.insert_names(names)?;
        self.refresh(store)?;
        debug!(requested = names.len(), added, "registered metric names");
        Ok(added)
    }

    /// Looks up the id of `name`. Unknown names yield `None`.
    #[must_use]
    pub fn resolve(&self, name: &MetricName) -> Option<MetricId> {
        self.ids.get(name).copied()
    }

    /// Whether `name` is catalogued.
    #[must_use]
    pub fn contains(&self, name: &MetricName) -> bool {
        self.ids.contains_key(name)
    }

    /// Number of catalogued names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterates over catalogued names.
    pub fn names(&self) -> impl Iterator<Item = &MetricName> {
        self.ids.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn name(s: &str) -> MetricName {
        MetricName::new(s).expect("valid name")
    }

    #[test]
    fn empty_store_gives_empty_catalog() {
        let store = MetricStore::open_in_memory().expect("open");
        let catalog = MetricCatalog::load(&store).expect("load");
        assert!(catalog.is_empty());
        assert_eq!(catalog.resolve(&name("status.uptime")), None);
    }

    #[test]
    fn bootstrap_assigns_distinct_ids() {
        let mut store = MetricStore::open_in_memory().expect("open");
        let names = [name("lock.waits.counter"), name("status.threads_connected")];
        let catalog = MetricCatalog::bootstrap(&mut store, &names).expect("bootstrap");

        assert_eq!(catalog.len(), 2);
        let a = catalog.resolve(&names[0]).expect("known");
        let b = catalog.resolve(&names[1]).expect("known");
        assert_ne!(a, b);
    }

    #[test]
    fn bootstrap_collapses_duplicate_names() {
        let mut store = MetricStore::open_in_memory().expect("open");
        let names = [name("status.uptime"), name("status.uptime")];
        let catalog = MetricCatalog::bootstrap(&mut store, &names).expect("bootstrap");
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn bootstrap_keeps_existing_ids() {
        let mut store = MetricStore::open_in_memory().expect("open");
        let first = MetricCatalog::bootstrap(&mut store, &[name("status.uptime")]).expect("first");
        let second = MetricCatalog::bootstrap(
            &mut store,
            &[name("status.questions"), name("status.uptime")],
        )
        .expect("second");

        assert_eq!(
            first.resolve(&name("status.uptime")),
            second.resolve(&name("status.uptime"))
        );
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn register_makes_new_names_resolvable() {
        let mut store = MetricStore::open_in_memory().expect("open");
        let mut catalog =
            MetricCatalog::bootstrap(&mut store, &[name("status.uptime")]).expect("bootstrap");

        let late = name("status.new_counter");
        assert!(!catalog.contains(&late));

        let added = catalog.register(&mut store, &[late.clone()]).expect("register");
        assert_eq!(added, 1);
        assert!(catalog.resolve(&late).is_some());
    }

    #[test]
    fn register_nothing_is_a_no_op() {
        let mut store = MetricStore::open_in_memory().expect("open");
        let mut catalog = MetricCatalog::load(&store).expect("load");
        assert_eq!(catalog.register(&mut store, &[]).expect("register"), 0);
    }

    #[test]
    fn refresh_picks_up_external_inserts() {
        let mut store = MetricStore::open_in_memory().expect("open");
        let mut catalog = MetricCatalog::load(&store).expect("load");

        store.insert_names(&[name("status.uptime")]).expect("insert");
        assert!(catalog.is_empty());

        catalog.refresh(&store).expect("refresh");
        assert_eq!(catalog.names().count(), 1);
    }

    proptest! {
        #[test]
        fn repeated_bootstrap_never_reassigns_ids(
            first in proptest::collection::vec("[a-z]{1,8}\\.[a-z]{1,8}", 1..20),
            second in proptest::collection::vec("[a-z]{1,8}\\.[a-z]{1,8}", 0..20),
        ) {
            let mut store = MetricStore::open_in_memory().expect("open");
            let first: Vec<_> = first.iter().map(|s| name(s)).collect();
            let second: Vec<_> = second.iter().map(|s| name(s)).collect();

            let before = MetricCatalog::bootstrap(&mut store, &first).expect("first");
            let mut all = second.clone();
            all.extend(first.iter().cloned());
            let after = MetricCatalog::bootstrap(&mut store, &all).expect("second");

            for n in before.names() {
                prop_assert_eq!(before.resolve(n), after.resolve(n));
            }
            let before_ids: std::collections::HashSet<_> =
                before.names().filter_map(|n| before.resolve(n)).collect();
            for n in after.names().filter(|n| !before.contains(n)) {
                let id = after.resolve(n).expect("resolvable");
                prop_assert!(!before_ids.contains(&id));
            }
        }
    }
}
