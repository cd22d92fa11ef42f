use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// A text-generation capability (hosted or local LLM).
#[async_trait]
pub trait Generator: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String>;

    /// Short provider label used in logs and health output.
    fn name(&self) -> &str {
        "generator"
    }
}

/// An embedding capability used by the retrieval stores.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Invoke `gen` with a hard deadline. Expiry drops the in-flight call and
/// surfaces as an ordinary provider error.
pub async fn generate(gen: &dyn Generator, prompt: &str, timeout: Duration) -> Result<String> {
    match tokio::time::timeout(timeout, gen.invoke(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!(
            "{} timed out after {}s",
            gen.name(),
            timeout.as_secs()
        )),
    }
}

/// Embed with the same deadline discipline as [`generate`].
pub async fn embed(embedder: &dyn Embedder, texts: &[String], timeout: Duration) -> Result<Vec<Vec<f32>>> {
    let vectors = match tokio::time::timeout(timeout, embedder.embed(texts)).await {
        Ok(result) => result?,
        Err(_) => return Err(anyhow!("embedding timed out after {}s", timeout.as_secs())),
    };
    if vectors.len() != texts.len() {
        return Err(anyhow!(
            "embedder returned {} vectors for {} texts",
            vectors.len(),
            texts.len()
        ));
    }
    Ok(vectors)
}

/// Deterministic local embedder: lower-cased alphanumeric terms hashed into
/// a fixed number of buckets, then L2-normalised.
///
/// Needs no model or network, so it backs offline deployments and tests.
/// Similarity is purely lexical.
pub struct HashEmbedder {
    pub dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for term in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = (stable_hash(&term.to_lowercase()) % self.dim as u64) as usize;
            v[bucket] += 1.0;
        }
        normalize(&mut v);
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// First eight bytes of the SHA-256 digest, little-endian. Identical across
/// toolchains, so it is safe to persist anything derived from it.
pub fn stable_hash(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity; 0.0 for mismatched or zero-length vectors.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}
