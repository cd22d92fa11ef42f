use anyhow::{anyhow, Result};
use async_trait::async_trait;
use nyaya_core::llm::Generator;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::http::{client, post_json};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Generator over an OpenAI-compatible `/chat/completions` endpoint.
/// Groq by default; any compatible server works by changing `base_url`.
pub struct ChatCompletionsGenerator {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl ChatCompletionsGenerator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.2,
            timeout_secs: 60,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };
        debug!(model = %self.model, prompt_len = prompt.len(), "calling chat completions API");

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let client = client(self.timeout_secs)?;
        let request = client.post(&url).bearer_auth(&self.api_key);
        let parsed: ChatResponse = post_json("groq", request, &body, self.timeout_secs).await?;

        let output = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("groq response had no message content"))?;
        info!(model = %self.model, output_len = output.len(), "chat completion received");
        Ok(output)
    }

    fn name(&self) -> &str {
        "groq"
    }
}
