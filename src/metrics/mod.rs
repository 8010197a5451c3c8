//! Metrics Module
//!
//! Latency histograms and the [`MetricEntity`] registry that owns them.
//!
//! The entity is constructed once by the server bootstrap and handed
//! explicitly (as an `Arc`) to every component that records metrics: the
//! command registry instantiates one handler-latency histogram per command,
//! and the backend client builder receives it so the client can register its
//! own metrics alongside.

pub mod histogram;

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

pub use histogram::{elapsed_micros, Histogram, HistogramDescriptor, HistogramSnapshot};

/// A named collection of histograms.
#[derive(Debug)]
pub struct MetricEntity {
    id: String,
    histograms: RwLock<BTreeMap<&'static str, Arc<Histogram>>>,
}

impl MetricEntity {
    /// Creates an empty entity with the given id (e.g. `"server"`).
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            histograms: RwLock::new(BTreeMap::new()),
        }
    }

    /// The entity id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the histogram for `descriptor`, creating it on first use.
    ///
    /// Instantiating the same descriptor twice yields the same histogram.
    pub fn instantiate(&self, descriptor: &HistogramDescriptor) -> Arc<Histogram> {
        if let Some(existing) = self.histogram(descriptor.name) {
            return existing;
        }

        let mut histograms = self
            .histograms
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            histograms
                .entry(descriptor.name)
                .or_insert_with(|| Arc::new(Histogram::new(*descriptor))),
        )
    }

    /// Looks up an already instantiated histogram by name.
    pub fn histogram(&self, name: &str) -> Option<Arc<Histogram>> {
        self.histograms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Snapshots every histogram, ordered by name.
    pub fn snapshot(&self) -> Vec<(&'static str, HistogramSnapshot)> {
        self.histograms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, h)| (*name, h.snapshot()))
            .collect()
    }
}

impl Default for MetricEntity {
    fn default() -> Self {
        Self::new("server")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: HistogramDescriptor = HistogramDescriptor::handler_latency("a", "A", "first");
    const B: HistogramDescriptor = HistogramDescriptor::handler_latency("b", "B", "second");

    #[test]
    fn test_instantiate_is_idempotent() {
        let entity = MetricEntity::default();
        let first = entity.instantiate(&A);
        let second = entity.instantiate(&A);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_snapshot_ordered_by_name() {
        let entity = MetricEntity::new("test");
        entity.instantiate(&B).increment(5);
        entity.instantiate(&A);

        let snap = entity.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].0, "a");
        assert_eq!(snap[1].0, "b");
        assert_eq!(snap[1].1.count, 1);
        assert!(entity.histogram("missing").is_none());
    }
}
