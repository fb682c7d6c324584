//! HTTP surface of the exporter.
//!
//! `GET <metrics path>?target=<host[:port]>` dials the target device,
//! scrapes it and returns the rendered metrics. Every other path redirects
//! to the metrics path.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use hdhr_core::error::Result;
use hdhr_protocol::ClientBuilder;
use hdhr_transport::{CONTROL_TCP_PORT, with_default_port};

use crate::collector::{Device, collect};

/// Content type of the Prometheus text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Future returned by a [`Dial`] function.
pub type DialFuture = Pin<Box<dyn Future<Output = Result<Arc<dyn Device>>> + Send>>;

/// Opens a connection to the device at the given `host:port`.
pub type Dial = Arc<dyn Fn(String) -> DialFuture + Send + Sync>;

/// Dial devices over TCP with the given per-request timeout.
pub fn tcp_dial(timeout: Duration) -> Dial {
    Arc::new(move |addr: String| -> DialFuture {
        Box::pin(async move {
            let client = ClientBuilder::new()
                .host(&addr)
                .timeout(timeout)
                .build()
                .await?;
            Ok(Arc::new(client) as Arc<dyn Device>)
        })
    })
}

#[derive(Clone)]
struct AppState {
    dial: Dial,
}

/// Build the exporter's router.
pub fn router(metrics_path: &str, dial: Dial) -> Router {
    let location = metrics_path.to_string();
    Router::new()
        .route(metrics_path, get(metrics))
        .fallback(move || async move {
            (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)])
        })
        .with_state(AppState { dial })
}

async fn metrics(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(target) = params.get("target").filter(|t| !t.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing target parameter\n").into_response();
    };
    let addr = with_default_port(target, CONTROL_TCP_PORT);

    let device = match (state.dial)(addr.clone()).await {
        Ok(device) => device,
        Err(e) => {
            tracing::warn!(addr = %addr, "Failed to dial device: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to dial HDHomeRun device at {:?}: {}\n", addr, e),
            )
                .into_response();
        }
    };

    let result = collect(device.as_ref()).await;
    if let Err(e) = device.close().await {
        tracing::debug!(addr = %addr, "Error closing device connection: {}", e);
    }

    match result {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            tracing::warn!(addr = %addr, "Failed to collect metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to collect metrics from {:?}: {}\n", addr, e),
            )
                .into_response()
        }
    }
}
