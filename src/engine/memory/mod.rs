// Mnemo Engine — Memory Pipeline
//
// The write path of the memory system: text is chunked, embedded, scored
// for importance, and appended to the store. The read path lives in
// engine/retrieval.rs.
//
// Module layout:
//   chunker.rs    — boundary-aware overlapping splitter
//   embedding.rs  — EmbeddingClient (Ollama + OpenAI-compatible API calls)
//   importance.rs — heuristic significance scoring + tags

pub mod chunker;
pub mod embedding;
pub mod importance;

pub use embedding::EmbeddingClient;

use log::{error, warn};

use crate::atoms::constants::RECENT_WINDOW_SIZE;
use crate::atoms::error::EngineResult;
use crate::atoms::types::{MemoryEntry, Role};
use crate::engine::store::MemoryStore;

/// Store one span of conversation text as memory entries.
///
/// Long text is chunked; each chunk becomes its own entry sharing a source
/// identity so retrieval can deduplicate. Embedding failures degrade to
/// vector-less entries (keyword-searchable, backfilled later) instead of
/// failing the turn.
pub async fn store_text(
    store: &MemoryStore,
    embedder: &EmbeddingClient,
    text: &str,
    role: Role,
    note_path: Option<&str>,
    chunk_max: usize,
    chunk_overlap: usize,
) -> EngineResult<Vec<String>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let source_id = uuid::Uuid::new_v4().to_string();
    let chunks = chunker::split(trimmed, &source_id, chunk_max, chunk_overlap);

    // Snapshot the recent window once so importance scoring is deterministic
    // across the chunks of a single message.
    let window = store.recent_texts(RECENT_WINDOW_SIZE)?;
    let window_refs: Vec<&str> = window.iter().map(|s| s.as_str()).collect();

    let mut ids = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        let mut entry = MemoryEntry::new(chunk.text.clone(), role);
        entry.note_path = note_path.map(|p| p.to_string());
        entry.source_chunk = Some(format!("{}:{}", source_id, chunk.start));

        let (score, tags) = importance::score(&chunk.text, &window_refs);
        entry.importance = score;
        entry.tags = tags;

        match embedder.embed(&chunk.text).await {
            Ok(vector) => entry.embedding = Some(vector),
            Err(e) => {
                error!(
                    "[memory] embedding failed for entry {} — storing without vector: {}",
                    &entry.id[..8],
                    e
                );
            }
        }

        store.add(&entry)?;
        ids.push(entry.id);
    }

    Ok(ids)
}

/// Backfill embeddings for entries stored while the embedding backend was
/// unreachable. Returns (succeeded, failed).
pub async fn backfill_embeddings(
    store: &MemoryStore,
    embedder: &EmbeddingClient,
) -> EngineResult<(usize, usize)> {
    let pending = store.list_without_embeddings(500)?;
    if pending.is_empty() {
        return Ok((0, 0));
    }

    let mut ok = 0usize;
    let mut failed = 0usize;
    for entry in &pending {
        match embedder.embed(&entry.text).await {
            Ok(vector) => match store.set_embedding(&entry.id, &vector) {
                Ok(()) => ok += 1,
                Err(e) => {
                    warn!("[memory] backfill update failed for {} — {}", &entry.id[..8], e);
                    failed += 1;
                }
            },
            Err(e) => {
                warn!("[memory] backfill embed failed for {} — {}", &entry.id[..8], e);
                failed += 1;
            }
        }
    }

    Ok((ok, failed))
}
