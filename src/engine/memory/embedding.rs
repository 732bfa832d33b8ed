// Mnemo Engine — Embedding Client
//
// Calls Ollama or OpenAI-compatible embedding APIs to produce vector
// representations of text. Used by the memory system for semantic search.
//
// Degradation contract: after EMBED_FAILURE_THRESHOLD consecutive failures
// the client reports itself degraded so the retriever can skip the semantic
// term without paying the timeout on every query. Any success resets the
// counter.

use log::{info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::atoms::constants::{
    EMBED_FAILURE_THRESHOLD, EMBED_MAX_CHARS, EMBED_REQUEST_TIMEOUT_SECS, EMBED_RETRY_BACKOFF_MS,
};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::MemoryConfig;

/// Embedding client — calls Ollama or OpenAI-compatible embedding API.
pub struct EmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
    /// Consecutive failures since the last success.
    failures: AtomicU32,
}

impl EmbeddingClient {
    pub fn new(config: &MemoryConfig) -> Self {
        EmbeddingClient {
            client: Client::new(),
            base_url: config.embedding_base_url.trim_end_matches('/').to_string(),
            model: config.embedding_model.clone(),
            failures: AtomicU32::new(0),
        }
    }

    /// True once the consecutive-failure threshold has been crossed.
    /// Callers should degrade to keyword ranking instead of embedding.
    pub fn is_degraded(&self) -> bool {
        self.failures.load(Ordering::Relaxed) >= EMBED_FAILURE_THRESHOLD
    }

    /// Get the embedding vector for a text string.
    /// Tries the Ollama format first, falls back to the OpenAI format.
    pub async fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EngineError::Config("cannot embed empty text".into()));
        }
        // Longer input must be chunked upstream — refuse rather than
        // silently truncate.
        if text.len() > EMBED_MAX_CHARS {
            return Err(EngineError::Config(format!(
                "input of {} bytes exceeds the {} byte embedding budget — chunk it first",
                text.len(),
                EMBED_MAX_CHARS
            )));
        }

        // One bounded retry with backoff before the failure counts against
        // the degradation threshold.
        let mut last_err = match self.embed_once(text).await {
            Ok(vec) => {
                self.failures.store(0, Ordering::Relaxed);
                return Ok(vec);
            }
            Err(e) => e,
        };
        tokio::time::sleep(Duration::from_millis(EMBED_RETRY_BACKOFF_MS)).await;
        match self.embed_once(text).await {
            Ok(vec) => {
                self.failures.store(0, Ordering::Relaxed);
                return Ok(vec);
            }
            Err(e) => last_err = e,
        }

        let count = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        if count == EMBED_FAILURE_THRESHOLD {
            warn!("[memory] embedding backend degraded after {} consecutive failures", count);
        }
        Err(last_err)
    }

    /// One pass over both wire formats: Ollama first, OpenAI second.
    async fn embed_once(&self, text: &str) -> EngineResult<Vec<f32>> {
        let ollama_err = match self.embed_ollama(text).await {
            Ok(vec) => return Ok(vec),
            Err(e) => e,
        };
        match self.embed_openai(text).await {
            Ok(vec) => Ok(vec),
            Err(openai_err) => Err(EngineError::backend(
                "embedding",
                format!("Ollama: {} | OpenAI: {}", ollama_err, openai_err),
            )),
        }
    }

    /// Embed a batch of texts. One request in the Ollama format (its
    /// `input` field accepts an array); falls back to per-item requests for
    /// OpenAI-compatible servers.
    pub async fn embed_batch(&self, texts: &[&str]) -> EngineResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if let Ok(vectors) = self.embed_ollama_batch(texts).await {
            if vectors.len() == texts.len() {
                self.failures.store(0, Ordering::Relaxed);
                return Ok(vectors);
            }
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Ollama API: POST /api/embed { model, input } → { embeddings: [[f32…]] }
    async fn embed_ollama(&self, text: &str) -> EngineResult<Vec<f32>> {
        let mut vectors = self.embed_ollama_batch(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| "Empty embedding response from Ollama".into())
    }

    async fn embed_ollama_batch(&self, texts: &[&str]) -> EngineResult<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);
        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(Duration::from_secs(EMBED_REQUEST_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| format!("embedding service not reachable at {} — {}", self.base_url, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("Ollama embed {} — {}", status, text).into());
        }

        let v: Value = resp.json().await?;
        let rows = v["embeddings"]
            .as_array()
            .ok_or_else(|| "No 'embeddings' array in Ollama response".to_string())?;

        let mut vectors = Vec::with_capacity(rows.len());
        for row in rows {
            let vec: Vec<f32> = row
                .as_array()
                .map(|a| a.iter().filter_map(|x| x.as_f64().map(|f| f as f32)).collect())
                .unwrap_or_default();
            if vec.is_empty() {
                return Err("Empty embedding vector from Ollama".into());
            }
            vectors.push(vec);
        }
        Ok(vectors)
    }

    /// OpenAI-compatible format: POST /v1/embeddings { model, input }
    async fn embed_openai(&self, text: &str) -> EngineResult<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": text,
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(Duration::from_secs(EMBED_REQUEST_TIMEOUT_SECS))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("OpenAI embed {} — {}", status, text).into());
        }

        let v: Value = resp.json().await?;
        let embedding = v["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| "No 'data[0].embedding' array in OpenAI response".to_string())?;

        let vec: Vec<f32> = embedding
            .iter()
            .filter_map(|x| x.as_f64().map(|f| f as f32))
            .collect();

        if vec.is_empty() {
            return Err("Empty embedding vector from OpenAI format".into());
        }

        Ok(vec)
    }

    /// Check if the embedding service is reachable and the model works.
    /// Returns the vector dimensionality on success.
    pub async fn test_connection(&self) -> EngineResult<usize> {
        let vec = self.embed("test connection").await?;
        info!("[memory] embedding service up, {} dims", vec.len());
        Ok(vec.len())
    }
}
