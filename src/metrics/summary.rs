//! Module implementing an Open Metrics summary.
//!
//! See [`Summary`] for details.

use crate::encoding::{EncodeMetric, MetricEncoder};
use crate::metrics::{MetricType, TypedMetric};
use parking_lot::Mutex;
use quantiles::ckms::CKMS;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Quantile objectives of the summaries this exporter publishes, as
/// `(quantile, allowed error)` pairs.
pub const DEFAULT_OBJECTIVES: &[(f64, f64)] = &[(0.5, 0.05), (0.9, 0.01), (0.99, 0.001)];

/// Window over which quantiles are estimated.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(10 * 60);

/// Number of buckets the window is split into.
pub const DEFAULT_AGE_BUCKETS: usize = 5;

/// Open Metrics [`Summary`] to measure distributions of discrete events.
///
/// Quantiles are estimated over a sliding window of `max_age`, split into
/// `age_buckets` streams. Every observation goes into all streams; queries
/// read the oldest one, which is reset and moved to the back of the ring each
/// time a bucket's worth of time has passed. Sum and count are cumulative.
#[derive(Debug)]
pub struct Summary {
    objectives: Arc<[(f64, f64)]>,
    error: f64,
    stream_duration: Duration,
    inner: Arc<Mutex<InnerSummary>>,
}

impl Clone for Summary {
    fn clone(&self) -> Self {
        Summary {
            objectives: self.objectives.clone(),
            error: self.error,
            stream_duration: self.stream_duration,
            inner: self.inner.clone(),
        }
    }
}

#[derive(Debug)]
struct InnerSummary {
    sum: f64,
    count: u64,
    streams: Vec<CKMS<f64>>,
    // Index of the stream answering queries, i.e. the one holding the
    // longest history.
    head_stream_idx: usize,
    last_rotated: Instant,
}

impl Default for Summary {
    fn default() -> Self {
        Summary::new(DEFAULT_MAX_AGE, DEFAULT_AGE_BUCKETS, DEFAULT_OBJECTIVES)
    }
}

impl Summary {
    /// Create a new [`Summary`].
    ///
    /// The estimator is built with the tightest error of all objectives.
    ///
    /// # Panics
    ///
    /// Panics if a quantile lies outside `[0, 1]` or `age_buckets` is zero.
    pub fn new(max_age: Duration, age_buckets: usize, objectives: &[(f64, f64)]) -> Self {
        if objectives.iter().any(|&(q, _)| !(0.0..=1.0).contains(&q)) {
            panic!("Quantile value out of range");
        }
        assert!(age_buckets > 0, "Summary needs at least one age bucket");

        let error = objectives
            .iter()
            .map(|&(_, e)| e)
            .fold(f64::INFINITY, f64::min)
            .min(0.05);

        let streams = (0..age_buckets).map(|_| CKMS::new(error)).collect();

        Summary {
            objectives: objectives.into(),
            error,
            stream_duration: max_age / age_buckets as u32,
            inner: Arc::new(Mutex::new(InnerSummary {
                sum: Default::default(),
                count: Default::default(),
                streams,
                head_stream_idx: 0,
                last_rotated: Instant::now(),
            })),
        }
    }

    /// Observe the given value.
    pub fn observe(&self, v: f64) {
        let mut inner = self.inner.lock();
        self.rotate(&mut inner);

        inner.sum += v;
        inner.count += 1;
        for stream in inner.streams.iter_mut() {
            stream.insert(v);
        }
    }

    /// Retrieve sum, count and the quantile estimates of the summary.
    ///
    /// Quantiles without any observation in the current window are omitted.
    pub fn get(&self) -> (f64, u64, Vec<(f64, f64)>) {
        let mut inner = self.inner.lock();
        self.rotate(&mut inner);

        let head = &inner.streams[inner.head_stream_idx];
        let quantiles = self
            .objectives
            .iter()
            .filter_map(|&(q, _)| head.query(q).map(|(_, v)| (q, v)))
            .collect();

        (inner.sum, inner.count, quantiles)
    }

    fn rotate(&self, inner: &mut InnerSummary) {
        if self.stream_duration.is_zero() {
            return;
        }

        let buckets = inner.streams.len();
        let mut rotations = 0;
        while inner.last_rotated.elapsed() >= self.stream_duration && rotations < buckets {
            let head = inner.head_stream_idx;
            inner.streams[head] = CKMS::new(self.error);
            inner.head_stream_idx = (head + 1) % buckets;
            inner.last_rotated += self.stream_duration;
            rotations += 1;
        }

        // Idle for longer than the whole window, every stream is fresh now.
        if inner.last_rotated.elapsed() >= self.stream_duration {
            inner.last_rotated = Instant::now();
        }
    }
}

impl TypedMetric for Summary {
    const TYPE: MetricType = MetricType::Summary;
}

impl EncodeMetric for Summary {
    fn encode(&self, mut encoder: MetricEncoder) -> Result<(), std::fmt::Error> {
        let (sum, count, quantiles) = self.get();
        encoder.encode_summary(sum, count, &quantiles)
    }

    fn metric_type(&self) -> MetricType {
        Self::TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary() {
        let summary = Summary::new(Duration::from_secs(10), 5, &[(0.5, 0.01), (0.9, 0.01), (0.99, 0.01)]);
        summary.observe(1.0);
        summary.observe(5.0);
        summary.observe(10.0);

        let (s, c, q) = summary.get();
        assert_eq!(16.0, s);
        assert_eq!(3, c);
        assert_eq!(vec![(0.5, 5.0), (0.9, 10.0), (0.99, 10.0)], q);
    }

    #[test]
    fn empty_summary_has_no_quantiles() {
        let (s, c, q) = Summary::default().get();
        assert_eq!(0.0, s);
        assert_eq!(0, c);
        assert!(q.is_empty());
    }

    #[test]
    fn window_expires() {
        let summary = Summary::new(Duration::from_millis(100), 2, DEFAULT_OBJECTIVES);
        summary.observe(3.0);
        std::thread::sleep(Duration::from_millis(150));

        let (s, c, q) = summary.get();
        assert_eq!(3.0, s);
        assert_eq!(1, c);
        assert!(q.is_empty());
    }

    #[test]
    #[should_panic(expected = "Quantile value out of range")]
    fn summary_panic() {
        Summary::new(Duration::from_secs(10), 5, &[(1.0, 0.01), (5.0, 0.01)]);
    }
}
