// Mnemo Engine — Retriever
//
// Composes vector-store results with importance and recency into the final
// ranked context:
//
//   composite = semantic_weight · similarity
//             + importance_weight · importance
//             + recency_weight · 2^(-age / half_life)
//
// Weights come from RetrievalConfig, never hardcoded. When the embedding
// backend is degraded (or the query embed fails), ranking falls back to
// keyword candidates scored by importance + recency alone — a degraded
// result, never an error.

use log::{debug, warn};
use std::collections::HashSet;

use crate::atoms::error::EngineResult;
use crate::atoms::types::{MemoryEntry, RetrievalConfig, RetrievedContext, ScoredMemory};
use crate::engine::memory::EmbeddingClient;
use crate::engine::store::MemoryStore;

pub struct Retriever {
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(config: RetrievalConfig) -> Self {
        Retriever { config }
    }

    /// Retrieve the top-k ranked context for a query.
    pub async fn retrieve(
        &self,
        store: &MemoryStore,
        embedder: &EmbeddingClient,
        query: &str,
        k: usize,
    ) -> EngineResult<RetrievedContext> {
        if k == 0 || query.trim().is_empty() {
            return Ok(RetrievedContext { entries: Vec::new(), degraded: false });
        }

        if !embedder.is_degraded() {
            match embedder.embed(query).await {
                Ok(query_vec) => return self.retrieve_with_vector(store, &query_vec, k),
                Err(e) => {
                    warn!("[retrieval] query embed failed — degrading to keyword ranking: {}", e);
                }
            }
        } else {
            debug!("[retrieval] embedding backend degraded — keyword ranking");
        }

        self.retrieve_degraded(store, query, k)
    }

    /// Semantic path with a precomputed query vector. Fetches extra
    /// candidates for re-ranking headroom, deduplicates, then truncates.
    pub fn retrieve_with_vector(
        &self,
        store: &MemoryStore,
        query_vec: &[f32],
        k: usize,
    ) -> EngineResult<RetrievedContext> {
        let fetch = k.saturating_mul(self.config.fetch_multiplier.max(2));
        let mut candidates = store.search(query_vec, fetch)?;
        rescore_importance(store, candidates.iter_mut().map(|(entry, _)| entry));

        let mut scored: Vec<ScoredMemory> = candidates
            .into_iter()
            .map(|(entry, distance)| {
                let similarity = 1.0 - distance;
                let score = self.composite(&entry, similarity);
                ScoredMemory { entry, similarity, score }
            })
            .collect();

        Ok(RetrievedContext {
            entries: self.rank_and_dedup(&mut scored, k),
            degraded: false,
        })
    }

    /// Importance + recency ranking over keyword candidates — no semantic
    /// term. Used while the embedding backend is unreachable.
    fn retrieve_degraded(
        &self,
        store: &MemoryStore,
        query: &str,
        k: usize,
    ) -> EngineResult<RetrievedContext> {
        let fetch = k.saturating_mul(self.config.fetch_multiplier.max(2));
        let mut candidates = store.keyword_search(query, fetch)?;
        if candidates.is_empty() {
            candidates = store.keyword_search_any(query, fetch)?;
        }
        rescore_importance(store, candidates.iter_mut());

        let mut scored: Vec<ScoredMemory> = candidates
            .into_iter()
            .map(|entry| {
                let score = self.composite(&entry, 0.0);
                ScoredMemory { entry, similarity: 0.0, score }
            })
            .collect();

        Ok(RetrievedContext {
            entries: self.rank_and_dedup(&mut scored, k),
            degraded: true,
        })
    }

    // ── Scoring internals ──────────────────────────────────────────────────

    fn composite(&self, entry: &MemoryEntry, similarity: f64) -> f64 {
        self.config.semantic_weight * similarity
            + self.config.importance_weight * entry.importance as f64
            + self.config.recency_weight() * recency_decay(entry, self.config.recency_half_life_days)
    }

    /// Sort descending by composite score, drop near-identical entries, and
    /// truncate to k. Dedup happens BEFORE truncation so repeats cannot
    /// crowd out distinct memories.
    fn rank_and_dedup(&self, scored: &mut Vec<ScoredMemory>, k: usize) -> Vec<ScoredMemory> {
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let mut seen_chunks: HashSet<String> = HashSet::new();
        let mut selected: Vec<ScoredMemory> = Vec::with_capacity(k);

        for candidate in scored.drain(..) {
            if selected.len() >= k {
                break;
            }
            if let Some(chunk) = &candidate.entry.source_chunk {
                if !seen_chunks.insert(chunk.clone()) {
                    continue;
                }
            }
            let near_duplicate = selected.iter().any(|kept| {
                word_overlap(&kept.entry.text, &candidate.entry.text) > self.config.dedup_threshold
            });
            if near_duplicate {
                continue;
            }
            selected.push(candidate);
        }

        selected
    }
}

/// Recompute importance against the current recent window so ranking never
/// uses a score more than one write stale, persisting changed scores back.
fn rescore_importance<'a>(
    store: &MemoryStore,
    entries: impl Iterator<Item = &'a mut MemoryEntry>,
) {
    let window = match store.recent_texts(crate::atoms::constants::RECENT_WINDOW_SIZE) {
        Ok(window) => window,
        Err(e) => {
            warn!("[retrieval] importance re-score skipped: {}", e);
            return;
        }
    };
    let window_refs: Vec<&str> = window.iter().map(|s| s.as_str()).collect();

    for entry in entries {
        let (score, tags) = crate::engine::memory::importance::score(&entry.text, &window_refs);
        if (score - entry.importance).abs() > f32::EPSILON || tags != entry.tags {
            store.set_importance(&entry.id, score, &tags).ok();
            entry.importance = score;
            entry.tags = tags;
        }
    }
}

/// Exponential half-life decay, monotonically decreasing in age.
fn recency_decay(entry: &MemoryEntry, half_life_days: f64) -> f64 {
    let age_days = (chrono::Utc::now() - entry.created_at).num_seconds().max(0) as f64 / 86_400.0;
    let decay_constant = std::f64::consts::LN_2 / half_life_days.max(f64::EPSILON);
    (-decay_constant * age_days).exp()
}

/// Jaccard similarity on content word sets — the near-duplicate signal.
fn word_overlap(a: &str, b: &str) -> f64 {
    let a_words: HashSet<&str> = a
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| w.len() > 2)
        .collect();
    let b_words: HashSet<&str> = b
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| w.len() > 2)
        .collect();
    if a_words.is_empty() && b_words.is_empty() {
        return 1.0;
    }
    let intersection = a_words.intersection(&b_words).count() as f64;
    let union = a_words.union(&b_words).count() as f64;
    if union < 1.0 {
        0.0
    } else {
        intersection / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::Role;

    fn retriever() -> Retriever {
        Retriever::new(RetrievalConfig::default())
    }

    fn entry(text: &str, vector: &[f32], importance: f32) -> MemoryEntry {
        let mut e = MemoryEntry::new(text, Role::User);
        e.embedding = Some(vector.to_vec());
        e.importance = importance;
        e.source_chunk = Some(format!("chunk:{}", text));
        e
    }

    #[test]
    fn never_returns_more_than_k() {
        let store = MemoryStore::open_in_memory().unwrap();
        for i in 0..20 {
            store
                .add(&entry(&format!("memory number {}", i), &[1.0, i as f32 * 0.05], 0.5))
                .unwrap();
        }
        let ctx = retriever().retrieve_with_vector(&store, &[1.0, 0.0], 4).unwrap();
        assert!(ctx.entries.len() <= 4);
    }

    #[test]
    fn identical_source_chunks_are_deduplicated() {
        let store = MemoryStore::open_in_memory().unwrap();
        let mut a = entry("overlapping chunk text", &[1.0, 0.0], 0.5);
        let mut b = entry("different wording entirely here", &[0.99, 0.01], 0.5);
        a.source_chunk = Some("note.md:0".into());
        b.source_chunk = Some("note.md:0".into());
        store.add(&a).unwrap();
        store.add(&b).unwrap();

        let ctx = retriever().retrieve_with_vector(&store, &[1.0, 0.0], 5).unwrap();
        assert_eq!(ctx.entries.len(), 1);
    }

    #[test]
    fn near_identical_text_is_deduplicated() {
        let store = MemoryStore::open_in_memory().unwrap();
        store
            .add(&entry("planning the colorado hiking trip for june", &[1.0, 0.0], 0.5))
            .unwrap();
        store
            .add(&entry("planning the colorado hiking trip for june!", &[0.98, 0.02], 0.5))
            .unwrap();
        store
            .add(&entry("completely unrelated grocery list", &[0.0, 1.0], 0.5))
            .unwrap();

        let ctx = retriever().retrieve_with_vector(&store, &[1.0, 0.0], 3).unwrap();
        assert_eq!(ctx.entries.len(), 2, "the duplicate should be dropped before truncation");
    }

    #[test]
    fn importance_lifts_ranking_at_equal_similarity() {
        let store = MemoryStore::open_in_memory().unwrap();
        // Same vector, so only the importance heuristics separate them.
        store.add(&entry("the weather shifted a bit", &[1.0, 0.0], 0.0)).unwrap();
        store
            .add(&entry("remember that my name is Chris", &[1.0, 0.0], 0.0))
            .unwrap();

        let ctx = retriever().retrieve_with_vector(&store, &[1.0, 0.0], 2).unwrap();
        assert_eq!(ctx.entries[0].entry.text, "remember that my name is Chris");
        assert!(ctx.entries[0].entry.importance > ctx.entries[1].entry.importance);
    }

    #[test]
    fn recency_decay_is_monotonic() {
        let fresh = MemoryEntry::new("now", Role::User);
        let mut old = MemoryEntry::new("then", Role::User);
        old.created_at = chrono::Utc::now() - chrono::Duration::days(60);
        assert!(recency_decay(&fresh, 30.0) > recency_decay(&old, 30.0));
    }

    #[tokio::test]
    async fn degraded_mode_ranks_without_embeddings() {
        let store = MemoryStore::open_in_memory().unwrap();
        store
            .add(&MemoryEntry::new("colorado has mountains", Role::User))
            .unwrap();
        store
            .add(&MemoryEntry::new("remember to pay the colorado cabin deposit", Role::User))
            .unwrap();

        // Unreachable embedding backend.
        let embedder = EmbeddingClient::new(&crate::atoms::types::MemoryConfig {
            embedding_base_url: "http://127.0.0.1:1".into(),
            ..Default::default()
        });

        let ctx = retriever().retrieve(&store, &embedder, "colorado", 2).await.unwrap();
        assert!(ctx.degraded);
        assert_eq!(ctx.entries.len(), 2);
        assert_eq!(ctx.entries[0].entry.text, "remember to pay the colorado cabin deposit");
        assert!(ctx.entries.iter().all(|s| s.similarity == 0.0));
    }

    #[test]
    fn empty_query_yields_empty_context() {
        let store = MemoryStore::open_in_memory().unwrap();
        let ctx = retriever().retrieve_with_vector(&store, &[1.0, 0.0], 0).unwrap();
        assert!(ctx.entries.is_empty());
    }
}
