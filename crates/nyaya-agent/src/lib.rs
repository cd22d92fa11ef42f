pub mod groq;
mod http;
pub mod ollama;

use std::sync::Arc;

use anyhow::{bail, Result};
use nyaya_core::config::Config;
use nyaya_core::llm::{Embedder, Generator, HashEmbedder};

pub use groq::ChatCompletionsGenerator;
pub use ollama::{OllamaEmbedder, OllamaGenerator};

/// Build the generator selected by `GENERATOR_BACKEND`.
pub fn generator_from_config(config: &Config) -> Result<Arc<dyn Generator>> {
    let timeout = config.generation_timeout_s;
    match config.generator_backend.as_str() {
        "groq" => Ok(Arc::new(
            ChatCompletionsGenerator::new(&config.groq_api_key, &config.model)
                .with_base_url(&config.groq_base_url)
                .with_timeout(timeout),
        )),
        "ollama" => Ok(Arc::new(
            OllamaGenerator::new(&config.ollama_url, &config.ollama_model).with_timeout(timeout),
        )),
        other => bail!("unknown GENERATOR_BACKEND: {other}"),
    }
}

/// Build the embedder selected by `EMBED_BACKEND`.
pub fn embedder_from_config(config: &Config) -> Result<Arc<dyn Embedder>> {
    match config.embed_backend.as_str() {
        "ollama" => Ok(Arc::new(
            OllamaEmbedder::new(&config.ollama_url, &config.embed_model).with_timeout(config.generation_timeout_s),
        )),
        "hash" => Ok(Arc::new(HashEmbedder::default())),
        other => bail!("unknown EMBED_BACKEND: {other}"),
    }
}
