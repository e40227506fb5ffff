//! Scrape endpoints: the metrics exposition plus liveness and readiness probes.
//!
//! `/health` and `/healthz` answer as long as the process is up. `/ready`
//! turns 200 once the first event from the appliance has been applied.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::collector::SharedAggregator;
use crate::exposition::Exposition;

/// Prometheus text exposition format, version 0.0.4.
const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Liveness paths. Both spellings are in use by deployed probes.
pub const HEALTH_PATHS: [&str; 2] = ["/health", "/healthz"];

/// Readiness path.
pub const READY_PATH: &str = "/ready";

#[derive(Clone)]
struct ScrapeState {
    aggregator: SharedAggregator,
    exposition: Arc<Exposition>,
}

/// Build the router serving metrics at `metrics_path` and the probe endpoints.
pub fn create_router(
    aggregator: SharedAggregator,
    exposition: Exposition,
    metrics_path: &str,
) -> Router {
    let state = ScrapeState {
        aggregator,
        exposition: Arc::new(exposition),
    };

    HEALTH_PATHS
        .iter()
        .fold(Router::new(), |router, path| {
            router.route(path, get(liveness))
        })
        .route(metrics_path, get(scrape))
        .route(READY_PATH, get(readiness))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn scrape(State(state): State<ScrapeState>) -> impl IntoResponse {
    let snapshot = state.aggregator.snapshot();
    let stats = state.aggregator.stats();
    let body = state.exposition.render(&snapshot, &stats);

    ([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], body)
}

async fn liveness() -> &'static str {
    "healthy\n"
}

async fn readiness(State(state): State<ScrapeState>) -> (StatusCode, String) {
    let applied = state.aggregator.stats().events_applied;
    if applied == 0 {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready - no telemetry received yet\n".to_string(),
        );
    }
    (StatusCode::OK, format!("ready - {} events applied\n", applied))
}

/// A bound metrics listener.
///
/// Binding happens up front so a taken port fails startup instead of a
/// background task.
pub struct HttpServer {
    listener: TcpListener,
    router: Router,
    metrics_path: String,
}

impl HttpServer {
    /// Bind `addr` and prepare the router.
    pub async fn bind(
        addr: SocketAddr,
        aggregator: SharedAggregator,
        exposition: Exposition,
        metrics_path: String,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;
        let router = create_router(aggregator, exposition, &metrics_path);

        Ok(Self {
            listener,
            router,
            metrics_path,
        })
    }

    /// The address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(
            addr = ?self.listener.local_addr().ok(),
            path = %self.metrics_path,
            "HTTP server listening"
        );

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::StatsAggregator;
    use crate::config::PrometheusConfig;
    use axum::body::Body;
    use axum::http::Request;
    use axum::response::Response;
    use edgemax_common::{SystemStats, TelemetryEvent};
    use tower::ServiceExt;

    fn make_router(aggregator: SharedAggregator, path: &str) -> Router {
        let exposition = Exposition::new(&PrometheusConfig::default(), "https://192.168.0.1");
        create_router(aggregator, exposition, path)
    }

    async fn request(router: Router, uri: &str) -> Response {
        router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let aggregator = Arc::new(StatsAggregator::new());
        aggregator.apply(TelemetryEvent::SystemStats(SystemStats {
            cpu: 12,
            uptime_seconds: 3600,
            mem_mb: 128,
        }));

        let response = request(make_router(aggregator, "/metrics"), "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
        assert_eq!(content_type, EXPOSITION_CONTENT_TYPE);

        let body = body_text(response).await;
        assert!(body.contains("edgemax_cpu_usage_percent{edgemax_host=\"https://192.168.0.1\"} 12"));
    }

    #[tokio::test]
    async fn test_health_aliases() {
        let router = make_router(Arc::new(StatsAggregator::new()), "/metrics");

        for path in HEALTH_PATHS {
            let response = request(router.clone(), path).await;
            assert_eq!(response.status(), StatusCode::OK, "{}", path);
            assert_eq!(body_text(response).await, "healthy\n");
        }
    }

    #[tokio::test]
    async fn test_ready_endpoint_not_ready() {
        let router = make_router(Arc::new(StatsAggregator::new()), "/metrics");

        let response = request(router, READY_PATH).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_ready_endpoint_ready() {
        let aggregator = Arc::new(StatsAggregator::new());
        aggregator.apply(TelemetryEvent::SystemStats(SystemStats::default()));

        let response = request(make_router(aggregator, "/metrics"), READY_PATH).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ready - 1 events applied\n");
    }

    #[tokio::test]
    async fn test_custom_metrics_path() {
        let router = make_router(Arc::new(StatsAggregator::new()), "/prometheus/metrics");

        let response = request(router.clone(), "/prometheus/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = request(router, "/metrics").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bind_reports_taken_port() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let exposition = Exposition::new(&PrometheusConfig::default(), "https://192.168.0.1");
        let result = HttpServer::bind(
            addr,
            Arc::new(StatsAggregator::new()),
            exposition,
            "/metrics".to_string(),
        )
        .await;

        let err = result.err().unwrap();
        assert!(err.to_string().contains("Failed to bind"));
    }
}
