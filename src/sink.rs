//! Destinations for observations.
//!
//! A [`Sink`] is told about every metric family once at startup and then
//! receives observations from all poll loops concurrently. [`PullSink`]
//! records them in a registry scraped over HTTP, [`PushSink`] transmits the
//! observations of an iteration as line protocol in one request.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::catalog::{Catalog, MetricFamily};
use crate::error::SinkError;
use crate::observation::Observation;

mod pull;
mod push;

pub use pull::PullSink;
pub use push::{Batch, PushSink};

/// Publishes observations.
///
/// Delivery is best effort: a failed publish is reported to the caller and
/// the observation is dropped.
#[async_trait]
pub trait Sink: Send + Sync + std::fmt::Debug {
    /// Make a family known to the sink. Called at startup, before the sink
    /// is shared between poll loops.
    fn register(&mut self, family: &MetricFamily) -> Result<(), SinkError>;

    /// Publish one observation now.
    async fn publish(&self, observation: &Observation) -> Result<(), SinkError>;

    /// Publish the observations of one iteration.
    ///
    /// The default publishes them one by one. Sinks that transmit over the
    /// network override this to send the whole batch at once.
    async fn publish_batch(&self, observations: &[Observation]) -> Delivery {
        let mut delivery = Delivery::default();
        for observation in observations {
            match self.publish(observation).await {
                Ok(()) => delivery.published += 1,
                Err(error) => delivery.failures.push(Failure {
                    series: observation.family().to_owned(),
                    count: 1,
                    error,
                }),
            }
        }
        delivery
    }
}

/// Outcome of [`Sink::publish_batch`].
#[derive(Debug, Default)]
pub struct Delivery {
    /// Observations accepted by the sink.
    pub published: usize,
    /// Observations the sink rejected or failed to deliver, grouped by cause.
    pub failures: Vec<Failure>,
}

impl Delivery {
    /// Number of observations that were not delivered.
    pub fn failed(&self) -> usize {
        self.failures.iter().map(|f| f.count).sum()
    }
}

/// Observations lost to a single error.
#[derive(Debug)]
pub struct Failure {
    /// Families of the lost observations, comma separated.
    pub series: String,
    /// Number of lost observations.
    pub count: usize,
    /// What went wrong.
    pub error: SinkError,
}

/// Register every family of `catalog` with `sink`.
pub fn register_catalog<S: Sink + ?Sized>(sink: &mut S, catalog: &Catalog) -> Result<(), SinkError> {
    for family in catalog.families() {
        sink.register(family)?;
    }
    Ok(())
}

/// Label dimensions of the registered families, used to validate
/// observations before they are recorded or sent.
#[derive(Debug, Default)]
struct Shapes {
    labels: HashMap<String, Vec<String>>,
}

impl Shapes {
    fn insert(&mut self, family: &MetricFamily) -> Result<(), SinkError> {
        if self.labels.contains_key(family.name()) {
            return Err(SinkError::Duplicate(family.name().to_owned()));
        }
        self.labels
            .insert(family.name().to_owned(), family.labels().to_vec());
        Ok(())
    }

    /// Label names of the observation's family, zipped with its values.
    fn label_set(&self, observation: &Observation) -> Result<Vec<(String, String)>, SinkError> {
        let names = self
            .labels
            .get(observation.family())
            .ok_or_else(|| SinkError::UnknownFamily(observation.family().to_owned()))?;

        if names.len() != observation.labels().len() {
            return Err(SinkError::LabelMismatch {
                family: observation.family().to_owned(),
                expected: names.len(),
                actual: observation.labels().len(),
            });
        }

        Ok(names
            .iter()
            .cloned()
            .zip(observation.labels().iter().cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{self, Category};
    use std::time::SystemTime;

    fn shapes() -> Shapes {
        let catalog = Catalog::new(vec![Category::new("orc", 1)]).unwrap();
        let mut shapes = Shapes::default();
        for family in catalog.families() {
            shapes.insert(family).unwrap();
        }
        shapes
    }

    #[test]
    fn label_set() {
        let observation = Observation::new(
            catalog::CATEGORY,
            vec!["orc".to_owned()],
            1,
            SystemTime::now(),
        );
        assert_eq!(
            vec![("category".to_owned(), "orc".to_owned())],
            shapes().label_set(&observation).unwrap()
        );
    }

    #[test]
    fn unknown_family() {
        let observation = Observation::new("nope", vec![], 1, SystemTime::now());
        assert!(matches!(
            shapes().label_set(&observation),
            Err(SinkError::UnknownFamily(name)) if name == "nope"
        ));
    }

    #[test]
    fn label_mismatch() {
        let observation = Observation::new(catalog::ONLINE, vec!["x".to_owned()], 1, SystemTime::now());
        assert!(matches!(
            shapes().label_set(&observation),
            Err(SinkError::LabelMismatch {
                expected: 0,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn duplicate_family() {
        let catalog = Catalog::new(vec![]).unwrap();
        let mut shapes = shapes();
        assert!(matches!(
            shapes.insert(&catalog.families()[0]),
            Err(SinkError::Duplicate(_))
        ));
    }
}
