use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::catalog::MetricFamily;
use crate::config::PushConfig;
use crate::encoding::line;
use crate::error::SinkError;
use crate::observation::{Observation, Value};
use crate::sink::{Delivery, Failure, Shapes, Sink};

/// Name of the single field of every line.
const FIELD: &str = "value";

/// [`Sink`] transmitting observations as line protocol messages.
///
/// Lines are posted to `{url}/write`. All observations of one iteration go
/// out in a single request, one line per series, tag set and timestamp.
/// Nothing is buffered across iterations or retried.
#[derive(Debug)]
pub struct PushSink {
    client: Client,
    write_url: Url,
    namespace: Option<String>,
    tags: Vec<(String, String)>,
    shapes: Shapes,
}

impl PushSink {
    /// Build a sink for the configured endpoint.
    ///
    /// Series names are prefixed with `namespace`, if given.
    pub fn new(config: &PushConfig, namespace: Option<&str>) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(PushSink {
            client,
            write_url: write_url(config)?,
            namespace: namespace.map(str::to_owned),
            tags: config
                .tags
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            shapes: Shapes::default(),
        })
    }

    /// The URL lines are posted to, including the query string.
    pub fn write_url(&self) -> &Url {
        &self.write_url
    }

    /// Name of the series `family` is written to.
    fn series(&self, family: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}_{family}"),
            None => family.to_owned(),
        }
    }

    /// Family labels followed by the configured global tags.
    fn tags(&self, observation: &Observation) -> Result<Vec<(String, String)>, SinkError> {
        let mut tags = self.shapes.label_set(observation)?;
        tags.extend(self.tags.iter().cloned());
        Ok(tags)
    }

    /// Render `observation` as it would be sent.
    ///
    /// Tags are the family labels followed by the configured global tags.
    pub fn encode_line(&self, observation: &Observation) -> Result<String, SinkError> {
        let mut buffer = String::new();
        line::encode(
            &mut buffer,
            &self.series(observation.family()),
            &self.tags(observation)?,
            &[(FIELD, observation.value().clone())],
            observation.unix_seconds(),
        )?;
        Ok(buffer)
    }

    /// Render a batch as the body of one request.
    ///
    /// Observations of the same series, tag set and second share a line; the
    /// later value wins, as it would on the endpoint. Observations which do
    /// not fit their family are left out and reported as failures.
    pub fn encode_batch(&self, observations: &[Observation]) -> Result<Batch, SinkError> {
        let mut batch = Batch::default();
        let mut points: Vec<(Point, &Value)> = Vec::new();
        let mut index: HashMap<Point, usize> = HashMap::new();

        for observation in observations {
            let tags = match self.tags(observation) {
                Ok(tags) => tags,
                Err(error) => {
                    batch.failures.push(Failure {
                        series: observation.family().to_owned(),
                        count: 1,
                        error,
                    });
                    continue;
                }
            };

            let point = (
                self.series(observation.family()),
                tags,
                observation.unix_seconds(),
            );
            match index.get(&point) {
                Some(&i) => points[i].1 = observation.value(),
                None => {
                    index.insert(point.clone(), points.len());
                    points.push((point, observation.value()));
                }
            }

            batch.observations += 1;
            if !batch.families.iter().any(|f| f == observation.family()) {
                batch.families.push(observation.family().to_owned());
            }
        }

        for (i, ((series, tags, timestamp), value)) in points.into_iter().enumerate() {
            if i > 0 {
                batch.body.push('\n');
            }
            line::encode(
                &mut batch.body,
                &series,
                &tags,
                &[(FIELD, value.clone())],
                timestamp,
            )?;
            batch.lines += 1;
        }

        Ok(batch)
    }

    async fn send(&self, body: String) -> Result<(), SinkError> {
        let response = self
            .client
            .post(self.write_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(());
        }

        let body = response.text().await?;
        Err(SinkError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Series name, tags and unix seconds identifying one line.
type Point = (String, Vec<(String, String)>, u64);

/// Request body built by [`PushSink::encode_batch`].
#[derive(Debug, Default)]
pub struct Batch {
    body: String,
    lines: usize,
    observations: usize,
    families: Vec<String>,
    failures: Vec<Failure>,
}

impl Batch {
    /// Newline separated lines.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Number of lines in the body.
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Observations left out of the body.
    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }
}

fn write_url(config: &PushConfig) -> Result<Url, SinkError> {
    let mut url = Url::parse(&config.url)?;
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .push("write");

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("db", &config.database);
        if let Some(username) = &config.username {
            query.append_pair("u", username);
            query.append_pair("p", config.password.as_deref().unwrap_or_default());
        }
        query.append_pair("precision", "s");
    }

    Ok(url)
}

#[async_trait]
impl Sink for PushSink {
    fn register(&mut self, family: &MetricFamily) -> Result<(), SinkError> {
        self.shapes.insert(family)
    }

    async fn publish(&self, observation: &Observation) -> Result<(), SinkError> {
        let delivery = self.publish_batch(std::slice::from_ref(observation)).await;
        match delivery.failures.into_iter().next() {
            Some(failure) => Err(failure.error),
            None => Ok(()),
        }
    }

    async fn publish_batch(&self, observations: &[Observation]) -> Delivery {
        let batch = match self.encode_batch(observations) {
            Ok(batch) => batch,
            Err(error) => {
                return Delivery {
                    published: 0,
                    failures: vec![Failure {
                        series: families(observations),
                        count: observations.len(),
                        error,
                    }],
                }
            }
        };

        let mut delivery = Delivery {
            published: 0,
            failures: batch.failures,
        };
        if batch.lines == 0 {
            return delivery;
        }

        tracing::trace!(body = %batch.body, lines = batch.lines, "pushing observations");
        match self.send(batch.body).await {
            Ok(()) => delivery.published = batch.observations,
            Err(error) => delivery.failures.push(Failure {
                series: batch.families.join(","),
                count: batch.observations,
                error,
            }),
        }
        delivery
    }
}

fn families(observations: &[Observation]) -> String {
    let mut families: Vec<&str> = Vec::new();
    for observation in observations {
        if !families.contains(&observation.family()) {
            families.push(observation.family());
        }
    }
    families.join(",")
}
