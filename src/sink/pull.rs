use std::collections::HashMap;

use async_trait::async_trait;

use crate::catalog::{Kind, MetricFamily};
use crate::encoding::text;
use crate::error::SinkError;
use crate::metrics::family::Family;
use crate::metrics::gauge::Gauge;
use crate::metrics::summary::Summary;
use crate::observation::Observation;
use crate::registry::Registry;
use crate::sink::{Shapes, Sink};

type LabelSet = Vec<(String, String)>;

#[derive(Debug)]
enum Recorder {
    Gauge(Family<LabelSet, Gauge>),
    Summary(Family<LabelSet, Summary>),
}

/// [`Sink`] recording observations in an in-process [`Registry`].
///
/// Gauge families keep the last published value, summary families feed a
/// quantile estimator. The registry is served to scrapers by
/// [`server`](crate::server).
#[derive(Debug, Default)]
pub struct PullSink {
    registry: Registry,
    shapes: Shapes,
    recorders: HashMap<String, Recorder>,
}

impl PullSink {
    /// Create a sink whose metric names carry no prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink prefixing every metric name with `prefix`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        PullSink {
            registry: Registry::with_prefix(prefix),
            ..Default::default()
        }
    }

    /// The registry holding the published values.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the OpenMetrics text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        text::encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

#[async_trait]
impl Sink for PullSink {
    fn register(&mut self, family: &MetricFamily) -> Result<(), SinkError> {
        self.shapes.insert(family)?;

        let recorder = match family.kind() {
            Kind::Gauge => {
                let metric = Family::<LabelSet, Gauge>::default();
                register(&mut self.registry, family, metric.clone());
                Recorder::Gauge(metric)
            }
            Kind::Summary => {
                let metric = Family::<LabelSet, Summary>::default();
                register(&mut self.registry, family, metric.clone());
                Recorder::Summary(metric)
            }
        };

        self.recorders.insert(family.name().to_owned(), recorder);
        Ok(())
    }

    async fn publish(&self, observation: &Observation) -> Result<(), SinkError> {
        let label_set = self.shapes.label_set(observation)?;
        let value = observation
            .value()
            .as_f64()
            .ok_or_else(|| SinkError::NonNumeric(observation.family().to_owned()))?;

        match self.recorders.get(observation.family()) {
            Some(Recorder::Gauge(metric)) => {
                metric.get_or_create(&label_set).set(value);
            }
            Some(Recorder::Summary(metric)) => metric.get_or_create(&label_set).observe(value),
            None => return Err(SinkError::UnknownFamily(observation.family().to_owned())),
        }

        Ok(())
    }
}

fn register(registry: &mut Registry, family: &MetricFamily, metric: impl crate::registry::Metric) {
    match family.unit() {
        Some(unit) => registry.register_with_unit(family.name(), family.help(), unit.clone(), metric),
        None => registry.register(family.name(), family.help(), metric),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{self, Catalog, Category};
    use crate::observation::Value;
    use crate::registry::Unit;
    use crate::sink::register_catalog;
    use std::time::SystemTime;

    fn sink() -> PullSink {
        let catalog = Catalog::new(vec![Category::new("dragon", 1), Category::new("orc", 2)]).unwrap();
        let mut sink = PullSink::new();
        register_catalog(&mut sink, &catalog).unwrap();
        sink
    }

    fn observation(family: &str, labels: &[&str], value: impl Into<Value>) -> Observation {
        Observation::new(
            family,
            labels.iter().map(|l| (*l).to_owned()).collect(),
            value,
            SystemTime::now(),
        )
    }

    #[tokio::test]
    async fn gauge_last_write_wins() {
        let sink = sink();
        sink.publish(&observation(catalog::CATEGORY, &["dragon"], 3))
            .await
            .unwrap();
        sink.publish(&observation(catalog::CATEGORY, &["dragon"], 5))
            .await
            .unwrap();
        sink.publish(&observation(catalog::CATEGORY, &["orc"], 1))
            .await
            .unwrap();

        let encoded = sink.encode().unwrap();
        assert!(encoded.contains("card_count{category=\"dragon\"} 5.0\n"));
        assert!(encoded.contains("card_count{category=\"orc\"} 1.0\n"));
        assert!(!encoded.contains("3.0"));
    }

    #[tokio::test]
    async fn summary_observes() {
        let sink = sink();
        sink.publish(&observation(catalog::ONLINE, &[], 10))
            .await
            .unwrap();
        sink.publish(&observation(catalog::ONLINE, &[], 20))
            .await
            .unwrap();

        let encoded = sink.encode().unwrap();
        assert!(encoded.contains("# TYPE online_count_minutes summary\n"));
        assert!(encoded.contains("online_count_minutes_sum 30.0\n"));
        assert!(encoded.contains("online_count_minutes_count 2\n"));
    }

    #[tokio::test]
    async fn rejects_strings() {
        let sink = sink();
        let result = sink
            .publish(&observation(catalog::ONLINE, &[], "many"))
            .await;
        assert!(matches!(result, Err(SinkError::NonNumeric(_))));
    }

    #[tokio::test]
    async fn rejects_unknown_family() {
        let sink = sink();
        let result = sink.publish(&observation("made_up", &[], 1)).await;
        assert!(matches!(result, Err(SinkError::UnknownFamily(_))));
    }

    #[tokio::test]
    async fn prefix() {
        let catalog = Catalog::new(vec![]).unwrap();
        let mut sink = PullSink::with_prefix("eqemu");
        register_catalog(&mut sink, &catalog).unwrap();
        sink.publish(&observation(catalog::EXPERIENCE, &[], 1))
            .await
            .unwrap();

        assert!(sink.encode().unwrap().contains("eqemu_exp_count_minutes_sum 1.0\n"));
    }

    #[tokio::test]
    async fn unit_is_appended() {
        let family =
            MetricFamily::new("lag", "Replication lag", &[], Kind::Gauge).with_unit(Unit::Seconds);
        let mut sink = PullSink::new();
        sink.register(&family).unwrap();
        sink.publish(&observation("lag", &[], 3)).await.unwrap();

        let encoded = sink.encode().unwrap();
        assert!(encoded.contains("# UNIT lag_seconds seconds\n"), "{encoded}");
        assert!(encoded.contains("lag_seconds 3.0\n"), "{encoded}");
    }
}
