use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Result};

/// Full application configuration, loaded from the process environment with
/// a `.env` file in the working directory as fallback.
#[derive(Debug, Clone)]
pub struct Config {
    // Generation
    /// "groq" (any OpenAI-compatible endpoint) or "ollama".
    pub generator_backend: String,
    pub groq_api_key: String,
    pub groq_base_url: String,
    pub model: String,
    pub ollama_url: String,
    pub ollama_model: String,

    // Embeddings
    /// "ollama" or "hash".
    pub embed_backend: String,
    pub embed_model: String,

    // Retrieval
    pub data_dir: String,
    pub retrieval_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,

    // Agent lifecycle
    pub generation_timeout_s: u64,
    pub agent_max_iterations: usize,

    // Web
    pub web_bind: String,
    pub web_port: u16,
}

fn parse_dotenv() -> HashMap<String, String> {
    let Ok(contents) = std::fs::read_to_string(".env") else {
        return HashMap::new();
    };
    parse_dotenv_str(&contents)
}

fn parse_dotenv_str(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            let v = v.trim().trim_matches('"');
            map.insert(k.trim().to_string(), v.to_string());
        }
    }
    map
}

fn get(key: &str, dotenv: &HashMap<String, String>) -> Option<String> {
    std::env::var(key).ok().or_else(|| dotenv.get(key).cloned())
}

fn get_str(key: &str, dotenv: &HashMap<String, String>, default: &str) -> String {
    get(key, dotenv).unwrap_or_else(|| default.to_string())
}

fn get_u64(key: &str, dotenv: &HashMap<String, String>, default: u64) -> u64 {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_usize(key: &str, dotenv: &HashMap<String, String>, default: usize) -> usize {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_u16(key: &str, dotenv: &HashMap<String, String>, default: u16) -> u16 {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self::from_map(&HashMap::new())
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let config = Self::from_map(&parse_dotenv());
        config.check()?;
        Ok(config)
    }

    fn from_map(dotenv: &HashMap<String, String>) -> Self {
        Config {
            generator_backend: get_str("GENERATOR_BACKEND", dotenv, "groq"),
            groq_api_key: get_str("GROQ_API_TOKEN", dotenv, ""),
            groq_base_url: get_str("GROQ_BASE_URL", dotenv, "https://api.groq.com/openai/v1"),
            model: get_str("MODEL", dotenv, "llama3-70b-8192"),
            ollama_url: get_str("OLLAMA_URL", dotenv, "http://127.0.0.1:11434"),
            ollama_model: get_str("OLLAMA_MODEL", dotenv, "llama3"),
            embed_backend: get_str("EMBED_BACKEND", dotenv, "ollama"),
            embed_model: get_str("EMBED_MODEL", dotenv, "nomic-embed-text"),
            data_dir: get_str("DATA_DIR", dotenv, "legal_docs"),
            retrieval_k: get_usize("RETRIEVAL_K", dotenv, 3),
            chunk_size: get_usize("CHUNK_SIZE", dotenv, 1000),
            chunk_overlap: get_usize("CHUNK_OVERLAP", dotenv, 100),
            generation_timeout_s: get_u64("GENERATION_TIMEOUT_S", dotenv, 60),
            agent_max_iterations: get_usize("AGENT_MAX_ITERATIONS", dotenv, 3),
            web_bind: get_str("WEB_BIND", dotenv, "127.0.0.1"),
            web_port: get_u16("WEB_PORT", dotenv, 8000),
        }
    }

    fn check(&self) -> Result<()> {
        if self.generator_backend == "groq" && self.groq_api_key.is_empty() {
            bail!("GROQ_API_TOKEN environment variable not set");
        }
        if self.chunk_overlap >= self.chunk_size {
            bail!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        if self.agent_max_iterations == 0 {
            bail!("AGENT_MAX_ITERATIONS must be at least 1");
        }
        Ok(())
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_s.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_parsing_skips_comments_and_strips_quotes() {
        let map = parse_dotenv_str("# comment\n\nMODEL=\"mixtral\"\n RETRIEVAL_K = 5 \nbroken line\n");
        assert_eq!(map.get("MODEL").map(String::as_str), Some("mixtral"));
        assert_eq!(map.get("RETRIEVAL_K").map(String::as_str), Some("5"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn defaults_match_pipeline_constants() {
        let c = Config::from_map(&HashMap::new());
        assert_eq!(c.retrieval_k, 3);
        assert_eq!(c.chunk_size, 1000);
        assert_eq!(c.chunk_overlap, 100);
        assert_eq!(c.agent_max_iterations, 3);
    }

    #[test]
    fn groq_backend_requires_token() {
        let c = Config::from_map(&HashMap::new());
        assert!(c.check().is_err());

        let mut map = HashMap::new();
        map.insert("GENERATOR_BACKEND".to_string(), "ollama".to_string());
        let c = Config::from_map(&map);
        assert!(c.check().is_ok());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let mut map = HashMap::new();
        map.insert("GENERATOR_BACKEND".to_string(), "ollama".to_string());
        map.insert("CHUNK_SIZE".to_string(), "100".to_string());
        map.insert("CHUNK_OVERLAP".to_string(), "100".to_string());
        assert!(Config::from_map(&map).check().is_err());
    }
}
