// Mnemo Engine — Memory Store
//
// SQLite raw entries are the source of truth (text + metadata + embedding
// BLOBs); the numeric index is a derived cache rebuilt from them whenever
// it is missing, corrupt, or stale. Persistence is append-friendly: normal
// operation is incremental add, full rebuild is the recovery path.
//
// Concurrency: single-writer discipline. The connection sits behind a
// parking_lot Mutex and the index behind a RwLock, so watcher-triggered
// writes and user-triggered writes are mutually exclusive while reads
// proceed concurrently.
//
// Module layout:
//   schema.rs  — idempotent migrations
//   entries.rs — row CRUD + keyword search + reconciliation queries
//   index.rs   — derived vector index (load/save/rebuild/search)
//   vectors.rs — bytes_to_f32_vec, f32_vec_to_bytes, cosine distance

mod entries;
mod index;
mod schema;
pub(crate) mod vectors;

use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use rusqlite::Connection;
use std::path::PathBuf;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{MemoryConfig, MemoryEntry};
use index::VectorIndex;

/// Thread-safe store over raw entries plus the derived vector index.
pub struct MemoryStore {
    /// The SQLite connection, protected by a Mutex.
    pub(crate) conn: Mutex<Connection>,
    index: RwLock<VectorIndex>,
    index_path: PathBuf,
}

/// Aggregate counts for diagnostics and the chat layer's memory panel.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub total: i64,
    pub embedded: i64,
    pub by_role: Vec<(String, i64)>,
}

impl MemoryStore {
    /// Open (or create) the store and bring the derived index up.
    ///
    /// Index recovery: a missing/corrupt cache file, or one whose row count
    /// disagrees with the database, triggers a full rebuild from raw
    /// entries — never silent data loss.
    pub fn open(config: &MemoryConfig) -> EngineResult<Self> {
        let conn = Connection::open(&config.db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        schema::run_migrations(&conn)?;

        let store = MemoryStore {
            conn: Mutex::new(conn),
            index: RwLock::new(VectorIndex::default()),
            index_path: PathBuf::from(&config.index_path),
        };

        match VectorIndex::load(&store.index_path) {
            Ok(index) => {
                let embedded = store.count_embedded()?;
                if index.len() as i64 == embedded {
                    info!("[store] loaded index cache ({} vectors)", index.len());
                    *store.index.write() = index;
                } else {
                    warn!(
                        "[store] index cache has {} vectors but the database has {} — rebuilding",
                        index.len(),
                        embedded
                    );
                    store.rebuild_index()?;
                }
            }
            Err(EngineError::IndexCorrupt(reason)) => {
                warn!("[store] index cache unusable ({}) — rebuilding from raw entries", reason);
                store.rebuild_index()?;
            }
            Err(e) => return Err(e),
        }

        Ok(store)
    }

    /// In-memory store with a scratch index path. For tests.
    pub fn open_in_memory() -> EngineResult<Self> {
        let dir = std::env::temp_dir().join(format!("mnemo-index-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir)?;
        Self::open(&MemoryConfig {
            db_path: ":memory:".into(),
            index_path: dir.join("mnemo.index").to_string_lossy().into_owned(),
            ..Default::default()
        })
    }

    // ── Core operations ────────────────────────────────────────────────────

    /// Append one entry. Incremental — the index grows in place, no rebuild.
    pub fn add(&self, entry: &MemoryEntry) -> EngineResult<()> {
        self.insert_row(entry)?;
        if let Some(vector) = &entry.embedding {
            if let Err(e) = self.index.write().add(&entry.id, vector) {
                // A mismatched vector (embedding model switch) must not lose
                // the raw entry; it stays keyword-searchable.
                warn!("[store] entry {} not indexed: {}", &entry.id[..8], e);
            }
        }
        Ok(())
    }

    /// Nearest neighbors by cosine distance, ascending; ties broken by
    /// more-recent timestamp first. Returns at most `k` results.
    pub fn search(&self, query: &[f32], k: usize) -> EngineResult<Vec<(MemoryEntry, f64)>> {
        let hits = self.index.read().search(query, k);
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(hits.len());
        for (id, distance) in hits {
            if let Some(entry) = self.get(&id)? {
                results.push((entry, distance));
            }
        }

        results.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.created_at.cmp(&a.0.created_at))
        });
        results.truncate(k);
        Ok(results)
    }

    /// Full rebuild of the derived index from the raw entries, then persist.
    /// The recovery path for a missing or corrupt cache.
    pub fn rebuild_index(&self) -> EngineResult<usize> {
        let rows = self.all_embedded()?;
        let mut fresh = VectorIndex::default();
        let mut skipped = 0usize;
        for (id, vector) in &rows {
            if let Err(e) = fresh.add(id, vector) {
                warn!("[store] rebuild skipping {}: {}", &id[..8], e);
                skipped += 1;
            }
        }
        let count = fresh.len();
        *self.index.write() = fresh;
        self.persist()?;
        info!(
            "[store] rebuilt index: {} vectors{}",
            count,
            if skipped > 0 { format!(", {} skipped", skipped) } else { String::new() }
        );
        Ok(count)
    }

    /// Write the index cache to disk (atomic temp-file + rename).
    pub fn persist(&self) -> EngineResult<()> {
        self.index.read().save(&self.index_path)
    }

    pub fn index_len(&self) -> usize {
        self.index.read().len()
    }

    pub(crate) fn index_remove(&self, ids: &std::collections::HashSet<String>) {
        self.index.write().remove(ids);
    }

    pub(crate) fn index_add(&self, id: &str, vector: &[f32]) -> EngineResult<()> {
        self.index.write().add(id, vector)
    }

    pub fn index_path(&self) -> &std::path::Path {
        &self.index_path
    }
}
