// Mnemo Engine — Derived Vector Index
//
// The numeric index is a rebuildable cache over the raw entries, never the
// source of truth. It lives in memory as parallel id/vector arrays and is
// persisted as a MessagePack blob so startup skips re-reading every BLOB.
// A missing or unreadable file is answered by rebuild from SQLite — the
// recovery path, not an optimization.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use crate::atoms::error::{EngineError, EngineResult};
use crate::engine::store::vectors::cosine_distance;

/// How many extra candidates `search` returns past `k` so the caller can
/// break distance ties by timestamp without losing a tied row.
const TIE_SLACK: usize = 8;

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct VectorIndex {
    /// Dimensionality, fixed by the first vector added.
    dims: Option<usize>,
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub(crate) fn dims(&self) -> Option<usize> {
        self.dims
    }

    /// Incremental add — no rebuild. Rejects dimensionality mismatches so
    /// the same-dims invariant holds for every search.
    pub(crate) fn add(&mut self, id: &str, vector: &[f32]) -> EngineResult<()> {
        if vector.is_empty() {
            return Err(EngineError::Config("refusing to index an empty vector".into()));
        }
        match self.dims {
            None => self.dims = Some(vector.len()),
            Some(dims) if dims != vector.len() => {
                return Err(EngineError::Config(format!(
                    "vector of {} dims does not match index dims {}",
                    vector.len(),
                    dims
                )));
            }
            _ => {}
        }
        self.ids.push(id.to_string());
        self.vectors.push(vector.to_vec());
        Ok(())
    }

    /// Drop all rows whose id is in `gone`.
    pub(crate) fn remove(&mut self, gone: &HashSet<String>) {
        if gone.is_empty() {
            return;
        }
        let mut i = 0;
        while i < self.ids.len() {
            if gone.contains(&self.ids[i]) {
                self.ids.swap_remove(i);
                self.vectors.swap_remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// Brute-force nearest neighbors by cosine distance, ascending.
    /// Returns up to `k + TIE_SLACK` candidates; the store applies the
    /// newest-first tie-break and truncates to `k`.
    pub(crate) fn search(&self, query: &[f32], k: usize) -> Vec<(String, f64)> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(String, f64)> = self
            .ids
            .iter()
            .zip(self.vectors.iter())
            .map(|(id, vec)| (id.clone(), cosine_distance(query, vec)))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k + TIE_SLACK);
        scored
    }

    // ── Persistence ────────────────────────────────────────────────────────

    /// Load the index cache. Any read or decode failure is IndexCorrupt —
    /// the caller answers with rebuild_index(), never silent data loss.
    pub(crate) fn load(path: &Path) -> EngineResult<VectorIndex> {
        let bytes = std::fs::read(path)
            .map_err(|e| EngineError::IndexCorrupt(format!("{}: {}", path.display(), e)))?;
        let index: VectorIndex = rmp_serde::from_slice(&bytes)
            .map_err(|e| EngineError::IndexCorrupt(format!("{}: {}", path.display(), e)))?;
        // Shape check: a truncated file can decode into mismatched arrays.
        if index.ids.len() != index.vectors.len() {
            return Err(EngineError::IndexCorrupt(format!(
                "{}: {} ids vs {} vectors",
                path.display(),
                index.ids.len(),
                index.vectors.len()
            )));
        }
        Ok(index)
    }

    /// Write the cache atomically: temp file in the same directory, then
    /// rename into place. A failed write never leaves a half-written cache.
    pub(crate) fn save(&self, path: &Path) -> EngineResult<()> {
        let bytes = rmp_serde::to_vec(self)
            .map_err(|e| EngineError::Other(format!("index encode: {}", e)))?;

        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = match dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                tempfile::NamedTempFile::new_in(dir)?
            }
            None => tempfile::NamedTempFile::new_in(".")?,
        };
        tmp.write_all(&bytes)?;
        tmp.persist(path)
            .map_err(|e| EngineError::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_search_orders_by_distance() {
        let mut index = VectorIndex::default();
        index.add("a", &[1.0, 0.0]).unwrap();
        index.add("b", &[0.0, 1.0]).unwrap();
        index.add("c", &[0.9, 0.1]).unwrap();

        let hits = index.search(&[1.0, 0.0], 2);
        assert_eq!(hits[0].0, "a");
        assert_eq!(hits[1].0, "c");
        assert!(hits[0].1 < hits[1].1);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut index = VectorIndex::default();
        index.add("a", &[1.0, 0.0]).unwrap();
        assert!(index.add("b", &[1.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn remove_drops_rows() {
        let mut index = VectorIndex::default();
        index.add("a", &[1.0, 0.0]).unwrap();
        index.add("b", &[0.0, 1.0]).unwrap();
        let gone: HashSet<String> = ["a".to_string()].into();
        index.remove(&gone);
        assert_eq!(index.len(), 1);
        assert_eq!(index.search(&[1.0, 0.0], 5)[0].0, "b");
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.index");

        let mut index = VectorIndex::default();
        index.add("a", &[0.5, 0.5]).unwrap();
        index.save(&path).unwrap();

        let loaded = VectorIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.dims(), Some(2));
    }

    #[test]
    fn missing_file_is_index_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let err = VectorIndex::load(&dir.path().join("nope.index")).unwrap_err();
        assert!(matches!(err, EngineError::IndexCorrupt(_)));
    }

    #[test]
    fn garbage_file_is_index_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.index");
        std::fs::write(&path, b"definitely not messagepack").unwrap();
        let err = VectorIndex::load(&path).unwrap_err();
        assert!(matches!(err, EngineError::IndexCorrupt(_)));
    }
}
