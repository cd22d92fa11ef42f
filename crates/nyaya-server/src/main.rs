mod logging;
mod routes;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};
use nyaya_agent::{embedder_from_config, generator_from_config};
use nyaya_core::config::Config;
use nyaya_core::LegalAssistant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::logging::LogHub;

// ── AppState ──────────────────────────────────────────────────────────────

pub struct AppState {
    pub assistant: Arc<LegalAssistant>,
    pub start_time: Instant,
    pub logs: LogHub,
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/legal-query", post(routes::legal_query))
        .route("/api/documents/:jurisdiction", post(routes::index_document))
        .route("/api/detect-bias", post(routes::detect_bias))
        .route("/api/mitigate-hallucinations", post(routes::mitigate_hallucinations))
        .route("/api/logs", get(routes::logs))
        .route("/api/logs/stream", get(routes::sse_logs))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── main ──────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logs = LogHub::new();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "nyaya_server=info,nyaya_core=info,nyaya_agent=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(logs.layer())
        .init();

    let config = Config::from_env()?;
    std::fs::create_dir_all(&config.data_dir)?;

    let generator = generator_from_config(&config)?;
    let embedder = embedder_from_config(&config)?;
    info!(
        generator = generator.name(),
        embed_backend = %config.embed_backend,
        data_dir = %config.data_dir,
        "legal assistant configured"
    );

    let state = Arc::new(AppState {
        assistant: Arc::new(LegalAssistant::new(&config, generator, embedder)),
        start_time: Instant::now(),
        logs,
    });

    let addr = format!("{}:{}", config.web_bind, config.web_port);
    info!("nyaya-server listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use nyaya_core::classify::REFUSAL_MESSAGE;
    use nyaya_core::{Generator, HashEmbedder};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct CannedGenerator;

    #[async_trait]
    impl Generator for CannedGenerator {
        async fn invoke(&self, prompt: &str) -> Result<String> {
            if prompt.starts_with("Analyze the following legal text for potential biases") {
                return Ok(r#"{"overall_score": 3, "biases": []}"#.into());
            }
            if prompt.starts_with("Review the following legal advice") {
                return Ok(r#"{"hallucinations_detected": false, "hallucinations": []}"#.into());
            }
            Ok("usa".into())
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn app(dir: &TempDir) -> Router {
        let config = Config {
            generator_backend: "ollama".into(),
            embed_backend: "hash".into(),
            data_dir: dir.path().display().to_string(),
            generation_timeout_s: 5,
            ..Config::default()
        };
        let logs = LogHub::new();
        logs.push(r#"{"ts":1,"level":"info","category":"system","message":"boot"}"#.to_string());
        let state = Arc::new(AppState {
            assistant: Arc::new(LegalAssistant::new(
                &config,
                Arc::new(CannedGenerator),
                Arc::new(HashEmbedder::default()),
            )),
            start_time: Instant::now(),
            logs,
        });
        router(state)
    }

    async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    // =============================================================================
    // Health and logs
    // =============================================================================

    #[tokio::test]
    async fn test_health_reports_generator() {
        let dir = TempDir::new().unwrap();
        let (status, body) = call(app(&dir), "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["generator"], "canned");
        assert!(body["uptime_s"].is_u64());
    }

    #[tokio::test]
    async fn test_logs_returns_ring() {
        let dir = TempDir::new().unwrap();
        let (status, body) = call(app(&dir), "GET", "/api/logs", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["message"], "boot");
    }

    // =============================================================================
    // Legal query
    // =============================================================================

    #[tokio::test]
    async fn test_empty_query_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let (status, body) = call(app(&dir), "POST", "/api/legal-query", Some(json!({"query": "   "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "query is empty");
    }

    #[tokio::test]
    async fn test_non_legal_query_gets_refusal_with_full_shape() {
        let dir = TempDir::new().unwrap();
        let (status, body) = call(
            app(&dir),
            "POST",
            "/api/legal-query",
            Some(json!({"query": "What's the best pizza topping?"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["advice"], REFUSAL_MESSAGE);
        assert_eq!(body["sources"], json!([]));
        assert_eq!(body["legal_pathway"], json!({"steps": [], "resources": []}));
        assert_eq!(body["adr_options"], json!([]));
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (status, _) = call(app(&dir), "POST", "/api/legal-query", Some(json!({"text": "bail"}))).await;
        assert!(status.is_client_error());
    }

    // =============================================================================
    // Documents
    // =============================================================================

    #[tokio::test]
    async fn test_index_document() {
        let dir = TempDir::new().unwrap();
        let (status, body) = call(
            app(&dir),
            "POST",
            "/api/documents/UK",
            Some(json!({"content": "The Consumer Rights Act 2015 governs refunds.", "metadata": {"source": "CRA 2015"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["chunks_indexed"], 1);
        assert_eq!(body["jurisdiction"], "uk");
        assert!(dir.path().join("uk").join("index.json").exists());
    }

    #[tokio::test]
    async fn test_index_document_validation() {
        let dir = TempDir::new().unwrap();
        let (status, body) = call(
            app(&dir),
            "POST",
            "/api/documents/mars",
            Some(json!({"content": "text"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unknown jurisdiction: mars");

        let (status, _) = call(app(&dir), "POST", "/api/documents/usa", Some(json!({"content": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // =============================================================================
    // Bias and hallucination passes
    // =============================================================================

    #[tokio::test]
    async fn test_detect_bias_endpoint() {
        let dir = TempDir::new().unwrap();
        let (status, body) = call(
            app(&dir),
            "POST",
            "/api/detect-bias",
            Some(json!({"text": "Tenants are always at fault in eviction disputes."})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["overall_score"], 3);
        assert_eq!(body["biases"], json!([]));

        let (status, _) = call(app(&dir), "POST", "/api/detect-bias", Some(json!({"text": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_mitigate_hallucinations_endpoint() {
        let dir = TempDir::new().unwrap();
        let (status, body) = call(
            app(&dir),
            "POST",
            "/api/mitigate-hallucinations",
            Some(json!({"text": "Bail is always granted.", "sources": ["Bail is discretionary."]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hallucinations_detected"], false);
        assert_eq!(body["original_text"], "Bail is always granted.");
    }
}
