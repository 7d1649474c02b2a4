//! Starts and stops the poll loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::collectors::{
    CategoryCollector, Collector, CurrencyCollector, ExperienceCollector, OnlineCollector,
};
use crate::config::Config;
use crate::error::StartupError;
use crate::poller::PollLoop;
use crate::sink::{self, Sink};
use crate::source::Source;

/// Owns the catalog, the shared sink and one [`PollLoop`] per collector.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use eqemu_exporter::catalog::{self, Catalog};
/// # use eqemu_exporter::config::Config;
/// # use eqemu_exporter::sink::PullSink;
/// # use eqemu_exporter::source::Source;
/// # use eqemu_exporter::supervisor::Supervisor;
/// # use tokio_util::sync::CancellationToken;
/// # async fn run(source: Arc<dyn Source>) -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let catalog = Arc::new(Catalog::new(catalog::default_categories())?);
/// let supervisor = Supervisor::start(
///     &config,
///     catalog,
///     source,
///     PullSink::new(),
///     CancellationToken::new(),
/// )?;
///
/// // Serve `supervisor.sink().encode()` until told to stop.
/// supervisor.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Supervisor<S> {
    catalog: Arc<Catalog>,
    sink: Arc<S>,
    token: CancellationToken,
    tasks: JoinSet<()>,
    drain_timeout: Duration,
}

impl<S: Sink + 'static> Supervisor<S> {
    /// Register the catalog with `sink`, then launch all poll loops.
    ///
    /// Must be called from within a tokio runtime. Cancelling `token` stops
    /// the loops, as does [`Supervisor::shutdown`].
    pub fn start(
        config: &Config,
        catalog: Arc<Catalog>,
        source: Arc<dyn Source>,
        mut sink: S,
        token: CancellationToken,
    ) -> Result<Self, StartupError> {
        sink::register_catalog(&mut sink, &catalog).map_err(StartupError::Register)?;

        let mut supervisor = Supervisor {
            catalog: catalog.clone(),
            sink: Arc::new(sink),
            token,
            tasks: JoinSet::new(),
            drain_timeout: config.drain_timeout(),
        };

        let interval = config.poll_interval();
        supervisor.spawn(OnlineCollector::new(config.online_window()), &source, interval);
        supervisor.spawn(ExperienceCollector, &source, interval);
        supervisor.spawn(CurrencyCollector::new(config.status_threshold), &source, interval);
        supervisor.spawn(CategoryCollector::new(catalog), &source, interval);

        tracing::info!(
            loops = supervisor.tasks.len(),
            families = supervisor.catalog.families().len(),
            categories = supervisor.catalog.categories().len(),
            ?interval,
            "collectors started"
        );

        Ok(supervisor)
    }

    fn spawn<C: Collector>(&mut self, collector: C, source: &Arc<dyn Source>, interval: Duration) {
        let sink: Arc<dyn Sink> = self.sink.clone();
        let poll = PollLoop::new(
            collector,
            source.clone(),
            sink,
            interval,
            self.token.child_token(),
        );
        self.tasks.spawn(poll.run());
    }

    /// The sink shared by all loops.
    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    /// The catalog the sink was registered with.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Number of poll loops still running.
    pub fn running(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel all loops and wait for them to finish.
    ///
    /// Iterations in progress get the drain timeout to complete; loops still
    /// running after that are aborted. Returns whether all loops finished on
    /// their own.
    pub async fn shutdown(mut self) -> bool {
        self.token.cancel();

        let drain_timeout = self.drain_timeout;
        let tasks = &mut self.tasks;
        let drain = async move {
            while let Some(result) = tasks.join_next().await {
                if let Err(error) = result {
                    tracing::error!(error = %error, "poll loop terminated abnormally");
                }
            }
        };

        match tokio::time::timeout(drain_timeout, drain).await {
            Ok(()) => {
                tracing::info!("collectors stopped");
                true
            }
            Err(_) => {
                tracing::warn!(
                    remaining = self.tasks.len(),
                    timeout = ?drain_timeout,
                    "drain timeout elapsed, aborting poll loops"
                );
                self.tasks.shutdown().await;
                false
            }
        }
    }
}
