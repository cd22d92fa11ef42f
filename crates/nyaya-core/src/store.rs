//! Per-jurisdiction retrieval stores.
//!
//! Each jurisdiction owns an append-only list of embedded chunks persisted as
//! `<root>/<jurisdiction>/index.json`. Stores are created lazily on first
//! access: an existing snapshot is loaded, otherwise the store is seeded
//! with one placeholder chunk and written out immediately, so later loads
//! are idempotent.
//!
//! Reads take a shared lock. Writes take the store's exclusive lock for the
//! whole append-then-persist sequence, so chunk numbering and snapshots never
//! interleave. Every mutation is flushed before the lock is released.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};

use crate::llm::{cosine, embed, Embedder};
use crate::splitter::TextSplitter;
use crate::types::{DocumentChunk, IndexOutcome, Jurisdiction};

pub const PLACEHOLDER_SOURCE: &str = "placeholder";
const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    chunk: DocumentChunk,
    embedding: Vec<f32>,
    indexed_at: DateTime<Utc>,
}

/// On-disk snapshot format.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    jurisdiction: Jurisdiction,
    updated_at: DateTime<Utc>,
    /// Documents indexed so far (the placeholder is not counted).
    documents: usize,
    chunks: Vec<StoredChunk>,
}

pub struct RetrievalStore {
    jurisdiction: Jurisdiction,
    path: PathBuf,
    documents: usize,
    chunks: Vec<StoredChunk>,
}

impl RetrievalStore {
    /// Load the persisted index for `jurisdiction` under `root`, or create
    /// and persist a placeholder index if none exists.
    pub async fn load_or_initialize(
        root: &Path,
        jurisdiction: Jurisdiction,
        embedder: &dyn Embedder,
        timeout: Duration,
    ) -> Result<Self> {
        let path = root.join(jurisdiction.as_str()).join(INDEX_FILE);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let snapshot: Snapshot = serde_json::from_str(&raw)
                .with_context(|| format!("corrupt index snapshot {}", path.display()))?;
            info!(
                jurisdiction = %jurisdiction,
                chunks = snapshot.chunks.len(),
                "loaded retrieval store"
            );
            return Ok(Self {
                jurisdiction,
                path,
                documents: snapshot.documents,
                chunks: snapshot.chunks,
            });
        }

        let text = format!("Placeholder legal text for {jurisdiction}");
        let mut vectors = embed(embedder, &[text.clone()], timeout).await?;
        let embedding = vectors.pop().unwrap_or_default();

        let mut metadata = Map::new();
        metadata.insert("jurisdiction".into(), Value::from(jurisdiction.as_str()));
        metadata.insert("source".into(), Value::from(PLACEHOLDER_SOURCE));

        let store = Self {
            jurisdiction,
            path,
            documents: 0,
            chunks: vec![StoredChunk {
                chunk: DocumentChunk {
                    content: text,
                    source: PLACEHOLDER_SOURCE.into(),
                    jurisdiction,
                    chunk_index: 0,
                    score: None,
                    metadata,
                },
                embedding,
                indexed_at: Utc::now(),
            }],
        };
        store.persist().await?;
        info!(jurisdiction = %jurisdiction, path = %store.path.display(), "initialized placeholder retrieval store");
        Ok(store)
    }

    pub fn jurisdiction(&self) -> Jurisdiction {
        self.jurisdiction
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn document_count(&self) -> usize {
        self.documents
    }

    pub fn chunks(&self) -> impl Iterator<Item = &DocumentChunk> {
        self.chunks.iter().map(|c| &c.chunk)
    }

    /// Top-`k` chunks by cosine similarity, best first. Ties keep insertion order.
    pub fn similarity_search(&self, query_embedding: &[f32], k: usize) -> Vec<DocumentChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (i, cosine(query_embedding, &c.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| {
                let mut chunk = self.chunks[i].chunk.clone();
                chunk.score = Some(score);
                chunk
            })
            .collect()
    }

    /// Append pre-embedded texts. Each metadata map must carry `source`;
    /// `chunk` defaults to the position within this call.
    pub fn add_texts(
        &mut self,
        texts: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        metadatas: Vec<Map<String, Value>>,
    ) -> Result<usize> {
        if texts.len() != embeddings.len() || texts.len() != metadatas.len() {
            return Err(anyhow!(
                "add_texts length mismatch: {} texts, {} embeddings, {} metadatas",
                texts.len(),
                embeddings.len(),
                metadatas.len()
            ));
        }
        let now = Utc::now();
        let added = texts.len();
        for (i, ((content, embedding), mut metadata)) in
            texts.into_iter().zip(embeddings).zip(metadatas).enumerate()
        {
            let source = metadata
                .get("source")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| anyhow!("chunk metadata is missing a source"))?;
            let chunk_index = metadata
                .get("chunk")
                .and_then(Value::as_u64)
                .map(|c| c as usize)
                .unwrap_or(i);
            metadata.insert("jurisdiction".into(), Value::from(self.jurisdiction.as_str()));
            self.chunks.push(StoredChunk {
                chunk: DocumentChunk {
                    content,
                    source,
                    jurisdiction: self.jurisdiction,
                    chunk_index,
                    score: None,
                    metadata,
                },
                embedding,
                indexed_at: now,
            });
        }
        Ok(added)
    }

    /// Write the full snapshot through a temp file and rename it into place.
    pub async fn persist(&self) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| anyhow!("index path has no parent: {}", self.path.display()))?;
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let snapshot = Snapshot {
            jurisdiction: self.jurisdiction,
            updated_at: Utc::now(),
            documents: self.documents,
            chunks: self.chunks.clone(),
        };
        let body = serde_json::to_vec(&snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

pub type StoreHandle = Arc<RwLock<RetrievalStore>>;

/// Lazily-initialised map of jurisdiction → store.
pub struct StoreRegistry {
    root: PathBuf,
    embedder: Arc<dyn Embedder>,
    splitter: TextSplitter,
    timeout: Duration,
    slots: std::sync::Mutex<HashMap<Jurisdiction, Arc<OnceCell<StoreHandle>>>>,
}

impl StoreRegistry {
    pub fn new(root: impl Into<PathBuf>, embedder: Arc<dyn Embedder>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            embedder,
            splitter: TextSplitter::default(),
            timeout,
            slots: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn with_splitter(mut self, splitter: TextSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the store for `jurisdiction`, loading or creating it on first use.
    /// Concurrent first calls for the same jurisdiction initialise it once;
    /// a failed initialisation is retried on the next call.
    pub async fn get_or_create(&self, jurisdiction: Jurisdiction) -> Result<StoreHandle> {
        let cell = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(slots.entry(jurisdiction).or_default())
        };
        let handle = cell
            .get_or_try_init(|| async {
                let store = RetrievalStore::load_or_initialize(
                    &self.root,
                    jurisdiction,
                    self.embedder.as_ref(),
                    self.timeout,
                )
                .await?;
                anyhow::Ok(Arc::new(RwLock::new(store)))
            })
            .await?;
        Ok(Arc::clone(handle))
    }

    pub async fn similarity_search(
        &self,
        jurisdiction: Jurisdiction,
        query: &str,
        k: usize,
    ) -> Result<Vec<DocumentChunk>> {
        let store = self.get_or_create(jurisdiction).await?;
        let mut vectors = embed(self.embedder.as_ref(), &[query.to_string()], self.timeout).await?;
        let query_embedding = vectors.pop().unwrap_or_default();
        let guard = store.read().await;
        Ok(guard.similarity_search(&query_embedding, k))
    }

    /// Split, embed and append a document, then persist the store.
    ///
    /// The append-and-persist step runs on its own task: dropping the
    /// returned future does not cancel a write that has already started.
    pub async fn add_document(
        &self,
        jurisdiction: Jurisdiction,
        content: &str,
        metadata: Map<String, Value>,
    ) -> Result<IndexOutcome> {
        let splits = self.splitter.split_text(content);
        if splits.is_empty() {
            warn!(jurisdiction = %jurisdiction, "document produced no chunks; nothing indexed");
            return Ok(IndexOutcome {
                status: "success".into(),
                chunks_indexed: 0,
                jurisdiction,
            });
        }

        let embeddings = embed(self.embedder.as_ref(), &splits, self.timeout)
            .await
            .context("failed to embed document chunks")?;
        let store = self.get_or_create(jurisdiction).await?;

        let write = tokio::spawn(async move {
            let mut guard = store.write().await;
            let prev_len = guard.chunks.len();
            let prev_docs = guard.documents;

            guard.documents += 1;
            let source = metadata
                .get("source")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}-doc-{:04}", jurisdiction, guard.documents));

            let metadatas = (0..splits.len())
                .map(|i| {
                    let mut m = metadata.clone();
                    m.insert("jurisdiction".into(), Value::from(jurisdiction.as_str()));
                    m.insert("source".into(), Value::from(source.clone()));
                    m.insert("chunk".into(), Value::from(i));
                    m
                })
                .collect();

            let result = match guard.add_texts(splits, embeddings, metadatas) {
                Ok(added) => guard.persist().await.map(|()| added),
                Err(e) => Err(e),
            };
            if result.is_err() {
                guard.chunks.truncate(prev_len);
                guard.documents = prev_docs;
            }
            result.map(|added| (added, source))
        });

        let (added, source) = write.await.context("index write task panicked")??;
        info!(jurisdiction = %jurisdiction, source = %source, chunks = added, "indexed legal document");
        Ok(IndexOutcome {
            status: "success".into(),
            chunks_indexed: added,
            jurisdiction,
        })
    }
}
