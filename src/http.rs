//! HTTP listener for webhooks and the Prometheus metrics endpoint.
//!
//! `GET /metrics` serves Prometheus text. Any other request whose path
//! contains `/webhook/` is buffered and handed to the dispatcher with the
//! path below the mount point; everything else is 404.

use crate::bot::{Dispatcher, WebhookRequest, WebhookResponse};
use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{Router, routing::get};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const MOUNT: &str = "/webhook";

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Path below the webhook mount, query string included.
fn webhook_path(uri: &Uri) -> Option<String> {
    let full = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let index = full.find("/webhook/")?;
    Some(full[index + MOUNT.len()..].to_string())
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    out
}

fn into_http_response(response: WebhookResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or_else(|_| {
        warn!(status = response.status, "Handler returned an invalid status");
        StatusCode::INTERNAL_SERVER_ERROR
    });
    let mut out = match response.body {
        Some(body) => (status, body).into_response(),
        None => status.into_response(),
    };
    for (name, value) in response.headers.into_iter().flatten() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                out.headers_mut().insert(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid response header"),
        }
    }
    out
}

async fn webhook_entry(
    State(dispatcher): State<Dispatcher>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(path) = webhook_path(&uri) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let request = WebhookRequest {
        path,
        headers: collect_headers(&headers),
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    into_http_response(dispatcher.handle_webhook(request).await)
}

/// Routes served by the listener.
pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .fallback(webhook_entry)
        .with_state(dispatcher)
}

/// A bound, not yet serving, listener.
pub struct WebhookServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl WebhookServer {
    pub async fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until `shutdown` fires.
    pub async fn serve(self, dispatcher: Dispatcher, shutdown: CancellationToken) -> std::io::Result<()> {
        info!(addr = %self.local_addr, "Webhook listener serving");
        axum::serve(self.listener, router(dispatcher))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    }
}
