use rusqlite::params;
use std::collections::HashSet;

use super::vectors::{bytes_to_f32_vec, f32_vec_to_bytes};
use super::{MemoryStore, StoreStats};
use crate::atoms::error::EngineResult;
use crate::atoms::types::{MemoryEntry, Role};

impl MemoryEntry {
    /// Map a row with columns (id, text, role, embedding, importance, tags,
    /// note_path, source_chunk, created_at) → MemoryEntry.
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let role: String = row.get(2)?;
        let embedding: Option<Vec<u8>> = row.get(3)?;
        let tags_json: String = row.get(5)?;
        let created_at: String = row.get(8)?;
        Ok(MemoryEntry {
            id: row.get(0)?,
            text: row.get(1)?,
            role: Role::parse(&role),
            embedding: embedding.map(|b| bytes_to_f32_vec(&b)),
            importance: row.get::<_, f64>(4)? as f32,
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            note_path: row.get(6)?,
            source_chunk: row.get(7)?,
            created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                .map(|d| d.with_timezone(&chrono::Utc))
                .unwrap_or(chrono::DateTime::UNIX_EPOCH),
        })
    }
}

const ENTRY_COLUMNS: &str =
    "id, text, role, embedding, importance, tags, note_path, source_chunk, created_at";

impl MemoryStore {
    // ── Row CRUD ───────────────────────────────────────────────────────────

    pub(crate) fn insert_row(&self, entry: &MemoryEntry) -> EngineResult<()> {
        let conn = self.conn.lock();
        let embedding = entry.embedding.as_ref().map(|v| f32_vec_to_bytes(v));
        conn.execute(
            "INSERT OR REPLACE INTO entries
                 (id, text, role, embedding, importance, tags, note_path, source_chunk, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.id,
                entry.text,
                entry.role.as_str(),
                embedding,
                entry.importance as f64,
                serde_json::to_string(&entry.tags)?,
                entry.note_path,
                entry.source_chunk,
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> EngineResult<Option<MemoryEntry>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            &format!("SELECT {} FROM entries WHERE id = ?1", ENTRY_COLUMNS),
            params![id],
            MemoryEntry::from_row,
        );
        match result {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Newest entries first.
    pub fn list_recent(&self, limit: usize) -> EngineResult<Vec<MemoryEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM entries ORDER BY created_at DESC LIMIT ?1",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![limit as i64], MemoryEntry::from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    /// Texts of the newest entries — the importance extractor's recent
    /// window snapshot.
    pub fn recent_texts(&self, limit: usize) -> EngineResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT text FROM entries ORDER BY created_at DESC LIMIT ?1")?;
        let texts = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(texts)
    }

    /// Entries newer than the cutoff, oldest first (for insight scans).
    pub fn entries_since(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
    ) -> EngineResult<Vec<MemoryEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM entries WHERE created_at >= ?1 ORDER BY created_at ASC",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![cutoff.to_rfc3339()], MemoryEntry::from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    // ── Backfill support ───────────────────────────────────────────────────

    /// Entries stored without a vector (embedding backend was down).
    pub fn list_without_embeddings(&self, limit: usize) -> EngineResult<Vec<MemoryEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM entries WHERE embedding IS NULL ORDER BY created_at DESC LIMIT ?1",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![limit as i64], MemoryEntry::from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    /// Backfill the embedding for an existing entry and index it.
    pub fn set_embedding(&self, id: &str, vector: &[f32]) -> EngineResult<()> {
        {
            let conn = self.conn.lock();
            conn.execute(
                "UPDATE entries SET embedding = ?2 WHERE id = ?1",
                params![id, f32_vec_to_bytes(vector)],
            )?;
        }
        self.index_add(id, vector)
    }

    // ── Entry mutation (the only fields that may change) ───────────────────

    pub fn set_importance(
        &self,
        id: &str,
        importance: f32,
        tags: &[crate::atoms::types::ImportanceTag],
    ) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE entries SET importance = ?2, tags = ?3 WHERE id = ?1",
            params![id, importance as f64, serde_json::to_string(tags)?],
        )?;
        Ok(())
    }

    /// Vault-path backfill once the note a memory landed in is known.
    pub fn set_note_path(&self, id: &str, note_path: &str) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE entries SET note_path = ?2 WHERE id = ?1",
            params![id, note_path],
        )?;
        Ok(())
    }

    // ── Note reconciliation (watcher) ──────────────────────────────────────

    pub fn entries_for_note(&self, note_path: &str) -> EngineResult<Vec<MemoryEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM entries WHERE note_path = ?1 ORDER BY created_at ASC",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![note_path], MemoryEntry::from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    /// Remove every entry sourced from a note (before re-chunking it).
    pub fn delete_for_note(&self, note_path: &str) -> EngineResult<usize> {
        let ids: Vec<String> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare("SELECT id FROM entries WHERE note_path = ?1")?;
            let ids = stmt
                .query_map(params![note_path], |row| row.get::<_, String>(0))?
                .filter_map(|r| r.ok())
                .collect();
            conn.execute("DELETE FROM entries WHERE note_path = ?1", params![note_path])?;
            ids
        };
        let gone: HashSet<String> = ids.iter().cloned().collect();
        self.index_remove(&gone);
        Ok(ids.len())
    }

    // ── Keyword search (degraded-mode ranking) ─────────────────────────────

    /// LIKE-based fallback search, importance then recency ordered. Needs no
    /// embeddings, so it works while the backend is down.
    pub fn keyword_search(&self, query: &str, limit: usize) -> EngineResult<Vec<MemoryEntry>> {
        let conn = self.conn.lock();
        let pattern = format!("%{}%", query.to_lowercase());
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM entries
             WHERE LOWER(text) LIKE ?1
             ORDER BY importance DESC, created_at DESC
             LIMIT ?2",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![pattern, limit as i64], MemoryEntry::from_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    /// Keyword search matching ANY whitespace-separated term of the query.
    /// Used when the full query string matches nothing.
    pub fn keyword_search_any(&self, query: &str, limit: usize) -> EngineResult<Vec<MemoryEntry>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut results = Vec::new();
        for term in query.split_whitespace().filter(|t| t.len() > 2) {
            for entry in self.keyword_search(term, limit)? {
                if seen.insert(entry.id.clone()) {
                    results.push(entry);
                }
            }
            if results.len() >= limit {
                break;
            }
        }
        results.truncate(limit);
        Ok(results)
    }

    // ── Diagnostics ────────────────────────────────────────────────────────

    pub fn stats(&self) -> EngineResult<StoreStats> {
        let conn = self.conn.lock();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |r| r.get(0))?;
        let embedded: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE embedding IS NOT NULL",
            [],
            |r| r.get(0),
        )?;
        let mut stmt = conn
            .prepare("SELECT role, COUNT(*) FROM entries GROUP BY role ORDER BY COUNT(*) DESC")?;
        let by_role = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(StoreStats { total, embedded, by_role })
    }

    pub(crate) fn count_embedded(&self) -> EngineResult<i64> {
        let conn = self.conn.lock();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE embedding IS NOT NULL",
            [],
            |r| r.get(0),
        )?)
    }

    /// (id, vector) for every embedded row — the rebuild source.
    pub(crate) fn all_embedded(&self) -> EngineResult<Vec<(String, Vec<f32>)>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT id, embedding FROM entries WHERE embedding IS NOT NULL ORDER BY created_at ASC")?;
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((id, bytes_to_f32_vec(&blob)))
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}
