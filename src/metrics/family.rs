//! Module implementing an Open Metrics metric family.
//!
//! See [`Family`] for details.

use super::{MetricType, TypedMetric};
use crate::encoding::{EncodeLabelSet, EncodeMetric, MetricEncoder};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use std::collections::HashMap;
use std::sync::Arc;

/// Representation of the OpenMetrics *MetricFamily* data type.
///
/// A [`Family`] is a set of metrics with the same name, help text and
/// type, differentiated by their label values thus spanning a multidimensional
/// space.
///
/// The per-category item counts are a single [`Family`] of gauges keyed by
/// the `category` label.
///
/// ```
/// # use eqemu_exporter::metrics::family::Family;
/// # use eqemu_exporter::metrics::gauge::Gauge;
/// let family = Family::<Vec<(String, String)>, Gauge>::default();
///
/// family
///     .get_or_create(&vec![("category".to_owned(), "dragon".to_owned())])
///     .set(12.0);
/// ```
pub struct Family<S, M, C = fn() -> M> {
    metrics: Arc<RwLock<HashMap<S, M>>>,
    /// Function that when called constructs a new metric.
    ///
    /// Gauges use their [`Default`] implementation. Summaries are built with
    /// the exporter's quantile objectives through
    /// [`Family::new_with_constructor`].
    constructor: C,
}

impl<S: std::fmt::Debug, M: std::fmt::Debug, C> std::fmt::Debug for Family<S, M, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Family")
            .field("metrics", &self.metrics)
            .finish()
    }
}

/// A constructor for creating new metrics in a [`Family`] when calling
/// [`Family::get_or_create`].
pub trait MetricConstructor<M> {
    /// Create a new metric instance.
    fn new_metric(&self) -> M;
}

impl<M, F: Fn() -> M> MetricConstructor<M> for F {
    fn new_metric(&self) -> M {
        self()
    }
}

impl<S: Clone + std::hash::Hash + Eq, M: Default> Default for Family<S, M> {
    fn default() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(Default::default())),
            constructor: M::default,
        }
    }
}

impl<S: Clone + std::hash::Hash + Eq, M, C> Family<S, M, C> {
    /// Create a metric family using a custom constructor to construct new
    /// metrics.
    pub fn new_with_constructor(constructor: C) -> Self {
        Self {
            metrics: Arc::new(RwLock::new(Default::default())),
            constructor,
        }
    }
}

impl<S: Clone + std::hash::Hash + Eq, M, C: MetricConstructor<M>> Family<S, M, C> {
    /// Access a metric with the given label set, creating it if one does not
    /// yet exist.
    pub fn get_or_create(&self, label_set: &S) -> MappedRwLockReadGuard<'_, M> {
        if let Ok(metric) =
            RwLockReadGuard::try_map(self.metrics.read(), |metrics| metrics.get(label_set))
        {
            return metric;
        }

        let mut write_guard = self.metrics.write();
        write_guard
            .entry(label_set.clone())
            .or_insert_with(|| self.constructor.new_metric());

        let read_guard = parking_lot::RwLockWriteGuard::downgrade(write_guard);
        RwLockReadGuard::map(read_guard, |metrics| {
            metrics
                .get(label_set)
                .expect("Metric to exist after creating it.")
        })
    }

    /// Number of label sets seen so far.
    pub fn len(&self) -> usize {
        self.metrics.read().len()
    }

    /// Whether no label set has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.metrics.read().is_empty()
    }
}

impl<S, M, C: Clone> Clone for Family<S, M, C> {
    fn clone(&self) -> Self {
        Family {
            metrics: self.metrics.clone(),
            constructor: self.constructor.clone(),
        }
    }
}

impl<S, M: TypedMetric, C> TypedMetric for Family<S, M, C> {
    const TYPE: MetricType = <M as TypedMetric>::TYPE;
}

impl<S, M, C> EncodeMetric for Family<S, M, C>
where
    S: Clone + std::hash::Hash + Eq + Ord + EncodeLabelSet,
    M: EncodeMetric + TypedMetric,
    C: MetricConstructor<M>,
{
    fn encode(&self, mut encoder: MetricEncoder) -> Result<(), std::fmt::Error> {
        let guard = self.metrics.read();
        // Stable output order across scrapes.
        let mut entries: Vec<_> = guard.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        for (label_set, metric) in entries {
            let encoder = encoder.encode_family(label_set)?;
            metric.encode(encoder)?;
        }
        Ok(())
    }

    fn metric_type(&self) -> MetricType {
        M::TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::gauge::Gauge;
    use crate::metrics::summary::Summary;

    fn labels(category: &str) -> Vec<(String, String)> {
        vec![("category".to_owned(), category.to_owned())]
    }

    #[test]
    fn gauge_family() {
        let family = Family::<Vec<(String, String)>, Gauge>::default();

        family.get_or_create(&labels("dragon")).set(3.0);
        family.get_or_create(&labels("insect")).set(4.0);
        family.get_or_create(&labels("dragon")).set(5.0);

        assert_eq!(2, family.len());
        assert_eq!(5.0, family.get_or_create(&labels("dragon")).get());
    }

    #[test]
    fn summary_family_with_constructor() {
        let family = Family::<(), Summary, _>::new_with_constructor(Summary::default);
        family.get_or_create(&()).observe(2.0);

        let (sum, count, _) = family.get_or_create(&()).get();
        assert_eq!(2.0, sum);
        assert_eq!(1, count);
    }
}
