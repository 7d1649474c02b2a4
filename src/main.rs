//! eqemu-exporter binary.
//!
//! Loads the configuration, connects to the game database and runs the poll
//! loops against the configured sink until SIGINT or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use eqemu_exporter::catalog::Catalog;
use eqemu_exporter::config::{Config, SinkConfig};
use eqemu_exporter::error::StartupError;
use eqemu_exporter::logging::{self, Level, LogConfig};
use eqemu_exporter::server;
use eqemu_exporter::sink::{PullSink, PushSink};
use eqemu_exporter::source::{MySqlSource, Source};
use eqemu_exporter::supervisor::Supervisor;

/// Republishes EQEmu server aggregates as Open Metrics or line protocol.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file. Defaults to `eqemu-exporter.yml` if it exists.
    #[arg(short, long, env = "EQEMU_EXPORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address of the scrape endpoint. Ignored by the push sink.
    #[arg(long)]
    listen_address: Option<SocketAddr>,

    /// Seconds between two iterations of every poll loop.
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,

    /// Log level of the exporter.
    #[arg(long, value_enum)]
    log_level: Option<Level>,
}

impl Args {
    fn load(&self) -> Result<Config, StartupError> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(interval) = self.interval {
            config.poll_interval = interval;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let (Some(addr), SinkConfig::Pull(pull)) = (self.listen_address, &mut config.sink) {
            pull.listen_address = addr;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            // No-op if the configuration loaded and logging is set up.
            logging::init(&LogConfig::default());
            tracing::error!(error = %error, "fatal error, exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), StartupError> {
    let config = args.load()?;
    logging::init(&config.logging);

    let catalog = Arc::new(Catalog::new(config.categories.clone())?);

    let source = MySqlSource::connect(&config.database)
        .await
        .map_err(StartupError::Database)?;
    tracing::info!(
        host = %config.database.host,
        database = %config.database.name,
        "connected to database"
    );
    let source: Arc<dyn Source> = Arc::new(source);

    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            shutdown_signal().await;
            tracing::info!("shutdown requested");
            token.cancel();
        }
    });

    match &config.sink {
        SinkConfig::Pull(pull) => {
            let listener = server::bind(pull.listen_address).await?;
            let sink = match &config.namespace {
                Some(namespace) => PullSink::with_prefix(namespace),
                None => PullSink::new(),
            };
            let supervisor = Supervisor::start(&config, catalog, source, sink, token.clone())?;

            let served =
                server::serve(listener, &pull.path, supervisor.sink().clone(), token.clone()).await;
            token.cancel();
            supervisor.shutdown().await;
            served
        }
        SinkConfig::Push(push) => {
            let sink =
                PushSink::new(push, config.namespace.as_deref()).map_err(StartupError::Sink)?;
            tracing::info!(url = %push.url, database = %push.database, "pushing observations");
            let supervisor = Supervisor::start(&config, catalog, source, sink, token.clone())?;

            token.cancelled().await;
            supervisor.shutdown().await;
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(error = %error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                tracing::error!(error = %error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
