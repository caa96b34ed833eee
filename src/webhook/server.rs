//! HTTP(S) server receiving admission reviews

use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::adapters::tailing_sidecars::ConfigSource;
use crate::{Error, Result};

use super::{PodExtender, WEBHOOK_PATH};

/// Run the webhook server until `shutdown` is cancelled
///
/// Connections are served over TLS when `tls` is given. Every connection
/// runs on its own task.
pub async fn serve<S: ConfigSource + 'static>(
    extender: Arc<PodExtender<S>>,
    port: u16,
    tls: Option<Arc<rustls::ServerConfig>>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let acceptor = tls.map(TlsAcceptor::from);
    info!(
        "Webhook server listening on {} ({})",
        addr,
        if acceptor.is_some() { "https" } else { "http" }
    );

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Webhook server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted?,
        };

        let extender = extender.clone();
        let acceptor = acceptor.clone();

        tokio::spawn(async move {
            match acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => serve_connection(TokioIo::new(tls_stream), extender).await,
                    Err(e) => warn!(peer = %peer, error = %e, "TLS handshake failed"),
                },
                None => serve_connection(TokioIo::new(stream), extender).await,
            }
        });
    }
}

async fn serve_connection<I, S>(io: I, extender: Arc<PodExtender<S>>)
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    S: ConfigSource + 'static,
{
    let service = service_fn(move |req| handle_request(extender.clone(), req));
    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
        error!("Error serving connection: {}", e);
    }
}

/// Handle HTTP requests
async fn handle_request<S: ConfigSource>(
    extender: Arc<PodExtender<S>>,
    req: Request<hyper::body::Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    match (req.method(), req.uri().path()) {
        (&Method::POST, WEBHOOK_PATH) => {}
        (_, "/healthz") | (_, "/readyz") => return Ok(text_response(StatusCode::OK, "ok")),
        _ => return Ok(text_response(StatusCode::NOT_FOUND, "Not Found")),
    }

    let body = req.into_body().collect().await?.to_bytes();

    let response = match review(&extender, &body).await {
        Ok(review) => match serde_json::to_vec(&review) {
            Ok(bytes) => json_response(bytes),
            Err(e) => {
                error!(error = %e, "Failed to serialize admission review");
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to serialize review")
            }
        },
        Err(e) => {
            warn!(error = %e, "Rejecting unreadable admission review");
            text_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
    };

    Ok(response)
}

/// Answer one serialized AdmissionReview
///
/// Fails only when the body is not an AdmissionReview at all; everything
/// else, including an object that is not a valid Pod, is answered inside
/// the returned review.
pub async fn review<S: ConfigSource>(
    extender: &PodExtender<S>,
    body: &[u8],
) -> Result<AdmissionReview<DynamicObject>> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| Error::DecodeError(format!("Invalid admission review: {}", e)))?;

    let review: AdmissionReview<DynamicObject> = match serde_json::from_value(value.clone()) {
        Ok(review) => review,
        Err(e) => return reject_undecodable_object(extender, value, e),
    };

    let request: std::result::Result<AdmissionRequest<DynamicObject>, _> = review.try_into();
    let response = match request {
        Ok(request) => extender.handle(&request).await,
        Err(e) => {
            debug!(error = %e, "Admission review without request");
            AdmissionResponse::invalid(e.to_string())
        }
    };

    Ok(response.into_review())
}

/// Answer a review whose admitted objects do not decode with a 400 verdict
///
/// The objects are dropped so the request envelope can still be read and
/// the response matched to its uid.
fn reject_undecodable_object<S: ConfigSource>(
    extender: &PodExtender<S>,
    mut value: serde_json::Value,
    cause: serde_json::Error,
) -> Result<AdmissionReview<DynamicObject>> {
    let invalid = |e: &dyn std::fmt::Display| {
        Error::DecodeError(format!("Invalid admission review: {}", e))
    };

    let Some(request) = value.get_mut("request").and_then(|r| r.as_object_mut()) else {
        return Err(invalid(&cause));
    };
    let object = request.remove("object");
    let old_object = request.remove("oldObject");
    if object.is_none() && old_object.is_none() {
        return Err(invalid(&cause));
    }

    let review: AdmissionReview<DynamicObject> =
        serde_json::from_value(value).map_err(|e| invalid(&e))?;
    let request: std::result::Result<AdmissionRequest<DynamicObject>, _> = review.try_into();
    let request = request.map_err(|e| invalid(&e))?;

    let err = Error::DecodeError(format!("Failed to decode Pod: {}", cause));
    Ok(extender.reject_malformed(&request, &err).into_review())
}

fn json_response(body: Vec<u8>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
}
