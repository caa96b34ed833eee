//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec, Encoder,
    HistogramVec, TextEncoder,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Total number of admission requests by operation and result
    pub static ref ADMISSION_REQUESTS: CounterVec = register_counter_vec!(
        "tailing_sidecar_operator_admission_requests_total",
        "Total number of admission requests",
        &["operation", "result"]
    ).unwrap();

    /// Admission handling duration histogram
    pub static ref ADMISSION_DURATION: HistogramVec = register_histogram_vec!(
        "tailing_sidecar_operator_admission_duration_seconds",
        "Duration of admission handling in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    ).unwrap();

    /// Total number of injected tailing sidecars
    pub static ref SIDECARS_INJECTED: Counter = register_counter!(
        "tailing_sidecar_operator_sidecars_injected_total",
        "Total number of tailing sidecars injected into Pods"
    ).unwrap();

    /// Total number of removed tailing sidecars
    pub static ref SIDECARS_REMOVED: Counter = register_counter!(
        "tailing_sidecar_operator_sidecars_removed_total",
        "Total number of tailing sidecars removed from Pods"
    ).unwrap();

    /// Configs skipped because their volume is not mounted in the Pod or no
    /// sidecar identifier is left
    pub static ref SIDECAR_CONFIGS_SKIPPED: Counter = register_counter!(
        "tailing_sidecar_operator_configs_skipped_total",
        "Total number of tailing sidecar configs skipped"
    ).unwrap();

    /// Failed TailingSidecar lookups by reason
    pub static ref CONFIG_LOOKUP_FAILURES: CounterVec = register_counter_vec!(
        "tailing_sidecar_operator_config_lookup_failures_total",
        "Total number of failed TailingSidecar lookups",
        &["reason"]
    ).unwrap();

    /// Operator health (1 = healthy, 0 = unhealthy)
    pub static ref OPERATOR_HEALTH: prometheus::Gauge = prometheus::register_gauge!(
        "tailing_sidecar_operator_health",
        "Operator health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

/// Start the metrics HTTP server
pub async fn serve(port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    // Set initial health
    OPERATOR_HEALTH.set(1.0);

    loop {
        let (stream, _) = tokio::select! {
            _ = shutdown.cancelled() => {
                OPERATOR_HEALTH.set(0.0);
                return Ok(());
            }
            accepted = listener.accept() => accepted?,
        };
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let response = match req.uri().path() {
        "/metrics" => metrics_response(),
        "/healthz" | "/health" => text_response(StatusCode::OK, "ok"),
        "/readyz" | "/ready" => text_response(StatusCode::OK, "ok"),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

/// Render every registered metric in the Prometheus text format
pub fn render() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}

fn metrics_response() -> Response<Full<Bytes>> {
    match render() {
        Ok((content_type, buffer)) => {
            let mut response = Response::new(Full::new(Bytes::from(buffer)));
            if let Ok(value) = content_type.parse() {
                response
                    .headers_mut()
                    .insert(hyper::header::CONTENT_TYPE, value);
            }
            response
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
        }
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}
