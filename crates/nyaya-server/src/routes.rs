use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use nyaya_core::{BiasReport, HallucinationReport, IndexOutcome, LegalResponse, PipelineError, QueryOptions};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{error, info};

use crate::AppState;

// ── Error helper ──────────────────────────────────────────────────────────

type ApiError = (StatusCode, Json<Value>);

/// Client mistakes get their message back; anything else is logged and
/// reported generically.
fn api_error(e: PipelineError) -> ApiError {
    let status = if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        if let PipelineError::Indexing(detail) = &e {
            error!("internal error: {detail}");
        } else {
            error!("internal error: {e}");
        }
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(json!({ "error": e.to_string() })))
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    error!("internal error: {e}");
    api_error(PipelineError::Unavailable)
}

// ── Request body types ────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(crate) struct LegalQueryBody {
    pub query: String,
    #[serde(default)]
    pub user_constraints: HashMap<String, String>,
    #[serde(default)]
    pub detect_bias: bool,
    #[serde(default)]
    pub check_hallucinations: bool,
}

#[derive(Deserialize)]
pub(crate) struct DocumentBody {
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Deserialize)]
pub(crate) struct TextBody {
    pub text: String,
}

#[derive(Deserialize)]
pub(crate) struct MitigateBody {
    pub text: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

// ── Handlers ──────────────────────────────────────────────────────────────

pub(crate) async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_s": state.start_time.elapsed().as_secs(),
        "generator": state.assistant.generator_name(),
    }))
}

pub(crate) async fn legal_query(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LegalQueryBody>,
) -> Result<Json<LegalResponse>, ApiError> {
    let options = QueryOptions {
        constraints: body.user_constraints,
        detect_bias: body.detect_bias,
        check_hallucinations: body.check_hallucinations,
    };
    // Detached so a dropped connection does not abandon a half-finished run.
    let assistant = Arc::clone(&state.assistant);
    let response = tokio::spawn(async move { assistant.process_query(&body.query, &options).await })
        .await
        .map_err(internal)?
        .map_err(api_error)?;
    Ok(Json(response))
}

pub(crate) async fn index_document(
    State(state): State<Arc<AppState>>,
    Path(jurisdiction): Path<String>,
    Json(body): Json<DocumentBody>,
) -> Result<Json<IndexOutcome>, ApiError> {
    let outcome = state
        .assistant
        .index_document(&jurisdiction, &body.content, body.metadata)
        .await
        .map_err(api_error)?;
    info!(jurisdiction = %outcome.jurisdiction, chunks = outcome.chunks_indexed, "document indexed via api");
    Ok(Json(outcome))
}

pub(crate) async fn detect_bias(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TextBody>,
) -> Result<Json<BiasReport>, ApiError> {
    if body.text.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, Json(json!({ "error": "text is empty" }))));
    }
    Ok(Json(state.assistant.detect_bias(&body.text).await))
}

pub(crate) async fn mitigate_hallucinations(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MitigateBody>,
) -> Result<Json<HallucinationReport>, ApiError> {
    if body.text.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, Json(json!({ "error": "text is empty" }))));
    }
    Ok(Json(
        state
            .assistant
            .mitigate_hallucinations(&body.text, &body.sources)
            .await,
    ))
}

// Logs

pub(crate) async fn logs(State(state): State<Arc<AppState>>) -> Json<Vec<Value>> {
    let lines = state
        .logs
        .snapshot()
        .into_iter()
        .filter_map(|line| serde_json::from_str(&line).ok())
        .collect();
    Json(lines)
}

/// Replays the ring then follows live events.
pub(crate) async fn sse_logs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let (history, mut live_rx) = state.logs.follow();
    tokio::spawn(async move {
        for line in history {
            if tx.send(line).is_err() {
                return;
            }
        }
        loop {
            match live_rx.recv().await {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        return;
                    }
                },
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    });
    let stream = UnboundedReceiverStream::new(rx).map(|data| Ok::<_, std::convert::Infallible>(Event::default().data(data)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    )
}
