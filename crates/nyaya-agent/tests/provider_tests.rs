// Provider clients against an in-process HTTP stand-in.

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use nyaya_agent::{embedder_from_config, generator_from_config, ChatCompletionsGenerator, OllamaEmbedder, OllamaGenerator};
use nyaya_core::config::Config;
use nyaya_core::llm::{Embedder, Generator};
use serde_json::{json, Value};
use tracing_test::traced_test;

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A base URL nothing is listening on.
async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

// =============================================================================
// Ollama
// =============================================================================

#[tokio::test]
async fn test_ollama_chat_round_trip() {
    let router = Router::new().route(
        "/api/chat",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["model"], "llama3");
            assert_eq!(body["stream"], false);
            assert_eq!(body["messages"][0]["role"], "user");
            let prompt = body["messages"][0]["content"].as_str().unwrap_or_default().to_string();
            Json(json!({"message": {"role": "assistant", "content": format!("echo: {prompt}")}}))
        }),
    );
    let base = serve(router).await;

    let gen = OllamaGenerator::new(format!("{base}/"), "llama3").with_timeout(5);
    assert_eq!(gen.invoke("What is bail?").await.unwrap(), "echo: What is bail?");
    assert_eq!(gen.name(), "ollama");
}

#[tokio::test]
async fn test_ollama_embeddings_batch() {
    let router = Router::new().route(
        "/api/embed",
        post(|Json(body): Json<Value>| async move {
            let n = body["input"].as_array().map(|a| a.len()).unwrap_or(0);
            let rows: Vec<Vec<f32>> = (0..n).map(|i| vec![i as f32, 1.0]).collect();
            Json(json!({"model": body["model"], "embeddings": rows}))
        }),
    );
    let base = serve(router).await;

    let embedder = OllamaEmbedder::new(base, "nomic-embed-text").with_timeout(5);
    let vectors = embedder.embed(&["a".into(), "b".into()]).await.unwrap();
    assert_eq!(vectors, vec![vec![0.0, 1.0], vec![1.0, 1.0]]);
    assert!(embedder.embed(&[]).await.unwrap().is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_ollama_unreachable_is_an_error_and_logged() {
    let gen = OllamaGenerator::new(dead_url().await, "llama3").with_timeout(2);
    let err = gen.invoke("hi").await.unwrap_err();
    assert_eq!(err.to_string(), "ollama request failed");
    assert!(logs_contain("ollama request failed"));
}

// =============================================================================
// Chat completions
// =============================================================================

#[tokio::test]
async fn test_chat_completions_sends_bearer_token() {
    let router = Router::new().route(
        "/chat/completions",
        post(|headers: HeaderMap, Json(body): Json<Value>| async move {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            if auth != "Bearer test-key" {
                return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
            }
            assert_eq!(body["model"], "llama3-70b-8192");
            (
                StatusCode::OK,
                Json(json!({"choices": [{"index": 0, "message": {"role": "assistant", "content": "usa"}}]})),
            )
        }),
    );
    let base = serve(router).await;

    let gen = ChatCompletionsGenerator::new("test-key", "llama3-70b-8192")
        .with_base_url(&base)
        .with_timeout(5);
    assert_eq!(gen.invoke("Which jurisdiction?").await.unwrap(), "usa");

    let wrong = ChatCompletionsGenerator::new("other", "llama3-70b-8192").with_base_url(&base);
    assert!(wrong.invoke("Which jurisdiction?").await.is_err());
}

#[tokio::test]
#[traced_test]
async fn test_chat_completions_server_error_is_logged() {
    let router = Router::new().route(
        "/chat/completions",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model overloaded") }),
    );
    let base = serve(router).await;

    let gen = ChatCompletionsGenerator::new("k", "m").with_base_url(base).with_timeout(5);
    let err = gen.invoke("hi").await.unwrap_err();
    assert!(err.to_string().contains("500"));
    assert!(logs_contain("returned non-200: model overloaded"));
}

#[tokio::test]
async fn test_chat_completions_empty_choices_is_an_error() {
    let router = Router::new().route("/chat/completions", post(|| async { Json(json!({"choices": []})) }));
    let base = serve(router).await;

    let gen = ChatCompletionsGenerator::new("k", "m").with_base_url(base).with_timeout(5);
    assert!(gen.invoke("hi").await.is_err());
}

// =============================================================================
// Backend selection
// =============================================================================

#[test]
fn test_backend_selection_from_config() {
    let config = Config {
        generator_backend: "ollama".into(),
        embed_backend: "hash".into(),
        ..Config::default()
    };
    assert_eq!(generator_from_config(&config).unwrap().name(), "ollama");
    assert!(embedder_from_config(&config).is_ok());

    let config = Config {
        generator_backend: "gpt".into(),
        embed_backend: "word2vec".into(),
        ..Config::default()
    };
    assert!(generator_from_config(&config).is_err());
    assert!(embedder_from_config(&config).is_err());
}
