use anyhow::Result;
use async_trait::async_trait;
use nyaya_core::llm::{Embedder, Generator};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::http::{client, post_json};

/// Calls a locally-hosted Ollama model via its native chat API.
///
/// Keeps query text on the local machine. Each call is a single stateless
/// user turn.
pub struct OllamaGenerator {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl OllamaGenerator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            timeout_secs: 300,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        let body = OllamaChatRequest {
            model: &self.model,
            messages: vec![OllamaMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };
        debug!(model = %self.model, base_url = %self.base_url, prompt_len = prompt.len(), "calling ollama chat API");

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let client = client(self.timeout_secs)?;
        let request = client.post(&url);
        let parsed: OllamaChatResponse = post_json("ollama", request, &body, self.timeout_secs).await?;

        let output = parsed.message.content;
        info!(model = %self.model, output_len = output.len(), "ollama response received");
        Ok(output)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Embeddings from Ollama's batch `/api/embed` endpoint.
pub struct OllamaEmbedder {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl OllamaEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            timeout_secs: 120,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let url = format!("{}/api/embed", self.base_url.trim_end_matches('/'));
        let client = client(self.timeout_secs)?;
        let request = client.post(&url);
        let parsed: EmbedResponse = post_json("ollama", request, &body, self.timeout_secs).await?;
        debug!(model = %self.model, count = parsed.embeddings.len(), "ollama embeddings received");
        Ok(parsed.embeddings)
    }
}
