use std::{collections::BTreeMap, io::ErrorKind, path::PathBuf, sync::Arc};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use hns_scout_core::{CheckResult, Partition, PartitionKey};
use hns_scout_storage::PartitionStore;

use crate::check_stream::StreamController;
use crate::problem::ProblemResponse;
use crate::telemetry;

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson; charset=utf-8";

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    store: PartitionStore,
    streams: StreamController,
    static_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        store: PartitionStore,
        streams: StreamController,
        static_dir: PathBuf,
    ) -> Self {
        Self {
            metrics,
            store,
            streams,
            static_dir: Arc::new(static_dir),
        }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn store(&self) -> &PartitionStore {
        &self.store
    }

    pub fn streams(&self) -> &StreamController {
        &self.streams
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/available.html", get(available_page))
        .route("/check-stream", post(check_stream))
        .route("/available-domains", get(available_domains))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

async fn index_page(State(state): State<AppState>) -> Result<Html<String>, ProblemResponse> {
    static_page(&state, "index.html").await
}

async fn available_page(State(state): State<AppState>) -> Result<Html<String>, ProblemResponse> {
    static_page(&state, "available.html").await
}

async fn static_page(state: &AppState, name: &str) -> Result<Html<String>, ProblemResponse> {
    match tokio::fs::read_to_string(state.static_dir.join(name)).await {
        Ok(body) => Ok(Html(body)),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            Err(ProblemResponse::not_found("Page not found"))
        }
        Err(err) => {
            warn!(stage = "app", page = name, error = %err, "failed to read static page");
            Err(ProblemResponse::internal("Failed to load page"))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckStreamRequest {
    #[serde(default)]
    raw_text: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

async fn check_stream(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ProblemResponse> {
    // An empty body is treated like `{}` so it fails on the missing text, not on parsing.
    let request: CheckStreamRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CheckStreamRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ProblemResponse::bad_request(format!("Invalid JSON body: {err}")))?
    };

    let raw_text = request
        .raw_text
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ProblemResponse::bad_request("Text is required"))?;

    info!(stage = "stream", bytes = raw_text.len(), title = request.title.as_deref().unwrap_or(""), "check stream started");
    let receiver = state.streams().spawn(&raw_text, request.title);
    let lines = ReceiverStream::new(receiver).map(|result| encode_line(&result));

    Ok((
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(lines),
    )
        .into_response())
}

fn encode_line(result: &CheckResult) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(result)?;
    line.push('\n');
    Ok(line)
}

async fn available_domains(
    State(state): State<AppState>,
) -> Json<BTreeMap<PartitionKey, Partition>> {
    let partitions = state.store().load_all().await.unwrap_or_else(|err| {
        warn!(stage = "storage", backend = state.store().backend_name(), error = %err, "failed to list partitions");
        BTreeMap::new()
    });
    Json(partitions)
}
