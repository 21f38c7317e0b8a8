//! HTTP server exposing the Prometheus metrics

use anyhow::{anyhow, bail, Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tracing::{error, info, warn};

/// Path the metrics are served on
pub const METRICS_PATH: &str = "/metrics";

/// Time given to in-flight requests once shutdown starts
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Prometheus metrics endpoint
async fn metrics(State(registry): State<Registry>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// Create the metrics router
pub fn create_router(registry: Registry) -> Router {
    Router::new()
        .route(METRICS_PATH, get(metrics))
        .with_state(registry)
}

/// Normalise a `host:port` listen address. An empty host binds every
/// interface, so `:9393` becomes `0.0.0.0:9393`.
pub fn listen_address(listen: &str) -> Result<String> {
    let Some((host, port)) = listen.rsplit_once(':') else {
        bail!("invalid listen address {listen:?}: expected host:port");
    };
    let port: u16 = port
        .parse()
        .map_err(|_| anyhow!("invalid listen address {listen:?}: bad port {port:?}"))?;
    let host = if host.is_empty() { "0.0.0.0" } else { host };

    Ok(format!("{host}:{port}"))
}

/// A bound metrics server, not yet serving
pub struct MetricsServer {
    listener: TcpListener,
    router: Router,
}

impl MetricsServer {
    /// Bind the listen address. Returns `None` when `listen` is empty,
    /// which disables the server.
    pub async fn bind(listen: &str, registry: Registry) -> Result<Option<Self>> {
        if listen.is_empty() {
            info!("Metrics server disabled");
            return Ok(None);
        }

        let addr = listen_address(listen)?;
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("could not bind metrics server to {addr}"))?;

        Ok(Some(Self {
            listener,
            router: create_router(registry),
        }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` fires, then shut down gracefully within a
    /// bounded time. Stopping before shutdown is an error.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let addr = self.local_addr()?;
        info!(addr = %addr, path = METRICS_PATH, "Starting metrics server");

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = axum::serve(self.listener, self.router).with_graceful_shutdown(async move {
            let _ = stop_rx.await;
        });
        let mut handle = tokio::spawn(async move { server.await });

        tokio::select! {
            result = &mut handle => {
                return match result {
                    Ok(Ok(())) => Err(anyhow!("metrics server stopped unexpectedly")),
                    Ok(Err(e)) => Err(e).context("metrics server failed"),
                    Err(e) => Err(e).context("metrics server task failed"),
                };
            }
            _ = shutdown.recv() => {}
        }

        info!("Shutting down metrics server");
        let _ = stop_tx.send(());

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut handle).await {
            Ok(Ok(result)) => result.context("metrics server failed during shutdown"),
            Ok(Err(e)) => Err(e).context("metrics server task failed"),
            Err(_) => {
                warn!(
                    timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                    "Metrics server did not stop in time, forcing close"
                );
                handle.abort();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use prometheus::{IntGauge, Opts};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    fn registry_with_gauge() -> Registry {
        let registry = Registry::new();
        let gauge = IntGauge::with_opts(Opts::new("gcp_exporter_test_value", "Test value")).unwrap();
        gauge.set(7);
        registry.register(Box::new(gauge)).unwrap();
        registry
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = create_router(registry_with_gauge());

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/plain"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("# HELP gcp_exporter_test_value Test value"));
        assert!(body.contains("gcp_exporter_test_value 7"));
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let app = create_router(Registry::new());

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_listen_address() {
        assert_eq!(listen_address(":9393").unwrap(), "0.0.0.0:9393");
        assert_eq!(listen_address("127.0.0.1:8080").unwrap(), "127.0.0.1:8080");
        assert_eq!(listen_address("localhost:80").unwrap(), "localhost:80");
        assert_eq!(listen_address("[::1]:9393").unwrap(), "[::1]:9393");

        assert!(listen_address("9393").is_err());
        assert!(listen_address("localhost").is_err());
        assert!(listen_address(":http").is_err());
        assert!(listen_address(":70000").is_err());
    }

    #[tokio::test]
    async fn test_empty_listen_disables_server() {
        assert!(MetricsServer::bind("", Registry::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_listen_is_an_error() {
        assert!(MetricsServer::bind("nope", Registry::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let server = MetricsServer::bind("127.0.0.1:0", registry_with_gauge())
            .await
            .unwrap()
            .unwrap();
        let addr = server.local_addr().unwrap();

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(server.run(rx));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("gcp_exporter_test_value 7"));

        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
