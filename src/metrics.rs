//! Metric type implementations backing the pull sink.

pub mod family;
pub mod gauge;
pub mod summary;

/// A metric that is aware of its Open Metrics metric type.
pub trait TypedMetric {
    /// The OpenMetrics metric type.
    const TYPE: MetricType;
}

/// OpenMetrics metric type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum MetricType {
    Gauge,
    Summary,
}

impl MetricType {
    /// Returns the given metric type's str representation.
    pub fn as_str(&self) -> &str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Summary => "summary",
        }
    }
}
