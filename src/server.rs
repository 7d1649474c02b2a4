//! HTTP endpoint serving the pull sink's registry to scrapers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::StartupError;
use crate::sink::PullSink;

/// Content type of the OpenMetrics text exposition.
pub const CONTENT_TYPE_OPENMETRICS: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Bind the scrape endpoint. Failing to bind is fatal.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, StartupError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })
}

/// The scrape router, serving `sink` at `path`.
pub fn router(path: &str, sink: Arc<PullSink>) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .with_state(sink)
}

async fn metrics_handler(State(sink): State<Arc<PullSink>>) -> Response {
    match sink.encode() {
        Ok(buffer) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, CONTENT_TYPE_OPENMETRICS)
            .body(Body::from(buffer))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(error) => {
            tracing::error!(error = %error, "failed to encode registry");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Serve scrapes on `listener` until `token` is cancelled.
///
/// Requests in flight when the token is cancelled are completed.
pub async fn serve(
    listener: TcpListener,
    path: &str,
    sink: Arc<PullSink>,
    token: CancellationToken,
) -> Result<(), StartupError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, path, "serving metrics");
    }

    axum::serve(listener, router(path, sink))
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
        .map_err(StartupError::Serve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{self, Catalog, Category};
    use crate::observation::Observation;
    use crate::sink::{register_catalog, Sink};
    use std::time::SystemTime;

    async fn start(sink: PullSink) -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<Result<(), StartupError>>) {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let handle = tokio::spawn(serve(listener, "/metrics", Arc::new(sink), token.clone()));
        (addr, token, handle)
    }

    #[tokio::test]
    async fn scrape() {
        let catalog = Catalog::new(vec![Category::new("dragon", 1)]).unwrap();
        let mut sink = PullSink::with_prefix("eqemu");
        register_catalog(&mut sink, &catalog).unwrap();
        sink.publish(&Observation::new(
            catalog::CATEGORY,
            vec!["dragon".to_owned()],
            7,
            SystemTime::now(),
        ))
        .await
        .unwrap();

        let (addr, token, handle) = start(sink).await;

        let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
        assert_eq!(200, response.status().as_u16());
        assert_eq!(
            Some(CONTENT_TYPE_OPENMETRICS),
            response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
        );
        let body = response.text().await.unwrap();
        assert!(body.contains("eqemu_card_count{category=\"dragon\"} 7.0\n"), "{body}");
        assert!(body.ends_with("# EOF\n"));

        let response = reqwest::get(format!("http://{addr}/other")).await.unwrap();
        assert_eq!(404, response.status().as_u16());

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn address_in_use() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        assert!(matches!(
            bind(addr).await,
            Err(StartupError::Bind { addr: a, .. }) if a == addr
        ));
    }
}
