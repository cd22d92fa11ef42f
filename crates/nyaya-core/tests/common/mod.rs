#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use nyaya_core::config::Config;
use nyaya_core::Generator;

/// Generator whose answers come from a closure over the prompt.
pub struct FnGenerator<F> {
    f: F,
    calls: AtomicUsize,
}

impl<F> FnGenerator<F>
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    pub fn new(f: F) -> Arc<Self> {
        Arc::new(Self {
            f,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F> Generator for FnGenerator<F>
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    async fn invoke(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.f)(prompt)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn failing() -> Arc<FnGenerator<impl Fn(&str) -> Result<String> + Send + Sync>> {
    FnGenerator::new(|_: &str| Err(anyhow::anyhow!("provider unavailable")))
}

pub fn test_config(dir: &Path) -> Config {
    Config {
        generator_backend: "ollama".into(),
        embed_backend: "hash".into(),
        data_dir: dir.display().to_string(),
        generation_timeout_s: 5,
        retrieval_k: 3,
        chunk_size: 1000,
        chunk_overlap: 100,
        agent_max_iterations: 3,
        ..Config::default()
    }
}

pub const LONG_ANSWER: &str = "A breach of contract occurs when one party fails to perform an obligation \
    the contract imposes, without a lawful excuse. Remedies usually include damages, and sometimes \
    specific performance or rescission.";
