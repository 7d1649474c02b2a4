//! Module implementing an Open Metrics gauge.
//!
//! See [`Gauge`] for details.

use crate::encoding::{EncodeMetric, MetricEncoder};

use super::{MetricType, TypedMetric};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Open Metrics [`Gauge`] to record current measurements.
///
/// Last write wins. The value is stored as the bit pattern of an [`f64`] in an
/// [`AtomicU64`], so concurrent readers never observe a torn value.
///
/// ```
/// # use eqemu_exporter::metrics::gauge::Gauge;
/// let gauge = Gauge::default();
/// gauge.set(42.0);
/// assert_eq!(42.0, gauge.get());
/// ```
#[derive(Debug, Default)]
pub struct Gauge {
    value: Arc<AtomicU64>,
}

impl Clone for Gauge {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
        }
    }
}

impl Gauge {
    /// Sets the [`Gauge`] to `v`, returning the previous value.
    pub fn set(&self, v: f64) -> f64 {
        f64::from_bits(self.value.swap(v.to_bits(), Ordering::Relaxed))
    }

    /// Get the current value of the [`Gauge`].
    pub fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed))
    }
}

impl TypedMetric for Gauge {
    const TYPE: MetricType = MetricType::Gauge;
}

impl EncodeMetric for Gauge {
    fn encode(&self, mut encoder: MetricEncoder) -> Result<(), std::fmt::Error> {
        encoder.encode_gauge(self.get())
    }

    fn metric_type(&self) -> MetricType {
        Self::TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_returns_previous() {
        let gauge = Gauge::default();
        assert_eq!(0.0, gauge.set(1.5));
        assert_eq!(1.5, gauge.set(-3.0));
        assert_eq!(-3.0, gauge.get());
    }

    #[test]
    fn clones_share_state() {
        let gauge = Gauge::default();
        let other = gauge.clone();
        other.set(7.0);
        assert_eq!(7.0, gauge.get());
    }
}
