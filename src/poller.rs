//! The periodic query, reduce and publish loop.
//!
//! See [`PollLoop`] for details.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use crate::collectors::Collector;
use crate::sink::Sink;
use crate::source::Source;

/// What one iteration of a [`PollLoop`] achieved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Iteration {
    /// The query failed; nothing was published.
    QueryFailed,
    /// The query succeeded and its observations were handed to the sink.
    Published {
        /// Observations accepted by the sink.
        published: usize,
        /// Observations the sink rejected or failed to deliver.
        failed: usize,
    },
}

/// Drives one [`Collector`] on a fixed interval until cancelled.
///
/// Each iteration queries, reduces and publishes, then sleeps for the full
/// interval, so consecutive iterations start at least one interval apart.
/// Failures are logged and end the iteration early; they never end the loop.
///
/// The token is checked before every iteration and raced against the sleep.
/// An iteration already running is not interrupted.
#[derive(Debug)]
pub struct PollLoop<C> {
    collector: C,
    source: Arc<dyn Source>,
    sink: Arc<dyn Sink>,
    interval: Duration,
    token: CancellationToken,
}

impl<C: Collector> PollLoop<C> {
    /// Create a loop. Nothing happens until [`PollLoop::run`] is awaited.
    pub fn new(
        collector: C,
        source: Arc<dyn Source>,
        sink: Arc<dyn Sink>,
        interval: Duration,
        token: CancellationToken,
    ) -> Self {
        PollLoop {
            collector,
            source,
            sink,
            interval,
            token,
        }
    }

    /// Run until the token is cancelled. The first iteration starts
    /// immediately.
    pub async fn run(self) {
        let family = self.collector.name();
        tracing::debug!(family, interval = ?self.interval, "poll loop started");

        while !self.token.is_cancelled() {
            self.tick().await;

            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::debug!(family, "poll loop stopped");
    }

    /// Run a single iteration.
    pub async fn tick(&self) -> Iteration {
        let family = self.collector.name();

        let rows = match self.collector.query(self.source.as_ref()).await {
            Ok(rows) => rows,
            Err(error) => {
                tracing::warn!(family, error = %error, "query failed");
                return Iteration::QueryFailed;
            }
        };

        let observations = self.collector.reduce(rows, SystemTime::now());

        let delivery = self.sink.publish_batch(&observations).await;
        for failure in &delivery.failures {
            tracing::warn!(
                family,
                series = %failure.series,
                count = failure.count,
                error = %failure.error,
                "publish failed"
            );
        }

        let published = delivery.published;
        let failed = delivery.failed();
        tracing::debug!(family, published, failed, "iteration finished");
        Iteration::Published { published, failed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{self, MetricFamily};
    use crate::collectors::{ExperienceCollector, OnlineCollector};
    use crate::error::SinkError;
    use crate::observation::Observation;
    use crate::source::{MockSource, QueryKind};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    const INTERVAL: Duration = Duration::from_secs(60);

    /// Records the instant of every publish, optionally failing all of them.
    #[derive(Debug, Default)]
    struct RecordingSink {
        failing: bool,
        published: Mutex<Vec<(Instant, Observation)>>,
    }

    impl RecordingSink {
        fn instants(&self, family: &str) -> Vec<Instant> {
            self.published
                .lock()
                .iter()
                .filter(|(_, o)| o.family() == family)
                .map(|(at, _)| *at)
                .collect()
        }
    }

    #[async_trait]
    impl Sink for RecordingSink {
        fn register(&mut self, _family: &MetricFamily) -> Result<(), SinkError> {
            Ok(())
        }

        async fn publish(&self, observation: &Observation) -> Result<(), SinkError> {
            self.published
                .lock()
                .push((Instant::now(), observation.clone()));
            if self.failing {
                return Err(SinkError::NonNumeric(observation.family().to_owned()));
            }
            Ok(())
        }
    }

    fn online() -> OnlineCollector {
        OnlineCollector::new(Duration::from_secs(600))
    }

    #[tokio::test(start_paused = true)]
    async fn first_iteration_is_immediate_and_interval_is_kept() {
        let source = Arc::new(MockSource::new().with_online(Some(3)));
        let sink = Arc::new(RecordingSink::default());
        let token = CancellationToken::new();
        let start = Instant::now();

        let handle = tokio::spawn(
            PollLoop::new(online(), source.clone(), sink.clone(), INTERVAL, token.clone()).run(),
        );

        tokio::time::sleep(Duration::from_secs(150)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(3, source.calls(QueryKind::Online));
        let instants = sink.instants(catalog::ONLINE);
        assert_eq!(start, instants[0]);
        for pair in instants.windows(2) {
            assert!(pair[1] - pair[0] >= INTERVAL);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_query_extends_period() {
        let source = Arc::new(
            MockSource::new()
                .with_online(Some(3))
                .with_delay(QueryKind::Online, Duration::from_secs(10)),
        );
        let sink = Arc::new(RecordingSink::default());
        let token = CancellationToken::new();

        let handle = tokio::spawn(
            PollLoop::new(online(), source.clone(), sink.clone(), INTERVAL, token.clone()).run(),
        );

        tokio::time::sleep(Duration::from_secs(200)).await;
        token.cancel();
        handle.await.unwrap();

        let instants = sink.instants(catalog::ONLINE);
        assert_eq!(3, instants.len());
        for pair in instants.windows(2) {
            assert_eq!(Duration::from_secs(70), pair[1] - pair[0]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_loop_does_not_delay_another() {
        let source = Arc::new(
            MockSource::new()
                .with_online(Some(1))
                .with_experience(Some(2))
                .with_delay(QueryKind::Online, Duration::from_secs(1_000)),
        );
        let sink = Arc::new(RecordingSink::default());
        let token = CancellationToken::new();

        let slow = tokio::spawn(
            PollLoop::new(online(), source.clone(), sink.clone(), INTERVAL, token.clone()).run(),
        );
        let fast = tokio::spawn(
            PollLoop::new(ExperienceCollector, source.clone(), sink.clone(), INTERVAL, token.clone())
                .run(),
        );

        tokio::time::sleep(Duration::from_secs(150)).await;

        assert_eq!(1, source.calls(QueryKind::Online));
        assert_eq!(3, source.calls(QueryKind::Experience));
        assert!(sink.instants(catalog::ONLINE).is_empty());
        assert_eq!(3, sink.instants(catalog::EXPERIENCE).len());

        token.cancel();
        fast.await.unwrap();
        slow.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn query_failure_keeps_looping() {
        let source = Arc::new(MockSource::new().failing(QueryKind::Online));
        let sink = Arc::new(RecordingSink::default());
        let token = CancellationToken::new();

        let poll = PollLoop::new(online(), source.clone(), sink.clone(), INTERVAL, token.clone());
        assert_eq!(Iteration::QueryFailed, poll.tick().await);

        let handle = tokio::spawn(poll.run());
        tokio::time::sleep(Duration::from_secs(130)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(4, source.calls(QueryKind::Online));
        assert!(sink.published.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn publish_failure_keeps_looping() {
        let source = Arc::new(MockSource::new().with_experience(Some(1)));
        let sink = Arc::new(RecordingSink {
            failing: true,
            ..Default::default()
        });
        let token = CancellationToken::new();

        let poll = PollLoop::new(ExperienceCollector, source.clone(), sink.clone(), INTERVAL, token.clone());
        assert_eq!(
            Iteration::Published {
                published: 0,
                failed: 1
            },
            poll.tick().await
        );

        let handle = tokio::spawn(poll.run());
        tokio::time::sleep(Duration::from_secs(70)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(3, source.calls(QueryKind::Experience));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_sleep() {
        let source = Arc::new(MockSource::new());
        let sink = Arc::new(RecordingSink::default());
        let token = CancellationToken::new();

        let handle = tokio::spawn(
            PollLoop::new(online(), source.clone(), sink.clone(), INTERVAL, token.clone()).run(),
        );
        tokio::time::sleep(Duration::from_secs(1)).await;

        let cancelled_at = Instant::now();
        token.cancel();
        handle.await.unwrap();

        assert!(Instant::now() - cancelled_at < INTERVAL);
        assert_eq!(1, source.calls(QueryKind::Online));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start() {
        let source = Arc::new(MockSource::new());
        let token = CancellationToken::new();
        token.cancel();

        PollLoop::new(
            online(),
            source.clone(),
            Arc::new(RecordingSink::default()),
            INTERVAL,
            token,
        )
        .run()
        .await;

        assert_eq!(0, source.calls(QueryKind::Online));
    }
}
