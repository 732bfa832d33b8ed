// Mnemo Engine — Vault Watcher
//
// Background worker observing the vault directory for out-of-band edits.
// Bursts of filesystem events for one note debounce into a single logical
// update; on settle the changed note is re-read, the concept index updated,
// and the note's store entries re-chunked and re-embedded — only the
// changed note, never the whole vault (full rebuild stays available as the
// correctness fallback via VaultSync::rebuild_concepts / import_note).
//
// Lifecycle: start at process init, stop on shutdown. The stop flag plus
// thread join releases the filesystem watch cleanly. The engine's own note
// writes also surface here; re-reconciling them is a harmless replace.

use log::{debug, error, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use crate::atoms::constants::{WATCHER_DEBOUNCE_MS, WATCHER_POLL_MS, WATCHER_SELF_WRITE_GRACE_SECS};
use crate::atoms::error::EngineResult;
use crate::engine::memory::EmbeddingClient;
use crate::engine::store::MemoryStore;
use crate::engine::vault::concepts::ConceptIndex;
use crate::engine::vault::{reconcile_note_content, SelfWrites};

pub struct VaultWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl VaultWatcher {
    /// Watch the vault root and keep `concepts` + `store` reconciled with
    /// external edits. Returns once the watch is registered.
    pub fn start(
        root: PathBuf,
        store: Arc<MemoryStore>,
        embedder: Arc<EmbeddingClient>,
        concepts: Arc<RwLock<ConceptIndex>>,
        self_writes: Arc<SelfWrites>,
        chunk_max: usize,
        chunk_overlap: usize,
    ) -> EngineResult<VaultWatcher> {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
            tx.send(res).ok();
        })
        .map_err(|e| format!("watcher init failed: {}", e))?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| format!("cannot watch {}: {}", root.display(), e))?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("mnemo-vault-watcher".into())
            .spawn(move || {
                // Owning the watcher here keeps the OS watch alive for the
                // worker's lifetime and releases it on thread exit.
                let _watcher = watcher;
                run_loop(
                    &root,
                    rx,
                    stop_flag,
                    store,
                    embedder,
                    concepts,
                    self_writes,
                    chunk_max,
                    chunk_overlap,
                );
            })?;

        info!("[watcher] watching vault");
        Ok(VaultWatcher { stop, handle: Some(handle) })
    }

    /// Signal the worker and wait for it to release the watch.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
            info!("[watcher] stopped");
        }
    }
}

impl Drop for VaultWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
fn run_loop(
    root: &Path,
    rx: mpsc::Receiver<notify::Result<Event>>,
    stop: Arc<AtomicBool>,
    store: Arc<MemoryStore>,
    embedder: Arc<EmbeddingClient>,
    concepts: Arc<RwLock<ConceptIndex>>,
    self_writes: Arc<SelfWrites>,
    chunk_max: usize,
    chunk_overlap: usize,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("[watcher] no runtime, worker exiting: {}", e);
            return;
        }
    };

    let debounce = Duration::from_millis(WATCHER_DEBOUNCE_MS);
    let mut pending: HashMap<String, Instant> = HashMap::new();

    while !stop.load(Ordering::Relaxed) {
        match rx.recv_timeout(Duration::from_millis(WATCHER_POLL_MS)) {
            Ok(Ok(event)) => {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    for path in &event.paths {
                        if let Some(rel) = vault_relative_md(root, path) {
                            pending.insert(rel, Instant::now());
                        }
                    }
                }
            }
            Ok(Err(e)) => warn!("[watcher] event error: {}", e),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        let settled: Vec<String> = pending
            .iter()
            .filter(|(_, last)| last.elapsed() >= debounce)
            .map(|(path, _)| path.clone())
            .collect();

        for rel in settled {
            pending.remove(&rel);
            debug!("[watcher] settled: {}", rel);
            handle_changed_note(
                &runtime,
                root,
                &rel,
                &store,
                &embedder,
                &concepts,
                &self_writes,
                chunk_max,
                chunk_overlap,
            );
        }
    }
}

/// Vault-relative forward-slash path for a markdown event target; None for
/// non-notes and hidden trees (.obsidian and friends).
fn vault_relative_md(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let rel_str = rel.to_string_lossy().replace('\\', "/");
    if !rel_str.ends_with(".md") {
        return None;
    }
    if rel_str.split('/').any(|part| part.starts_with('.')) {
        return None;
    }
    Some(rel_str)
}

#[allow(clippy::too_many_arguments)]
fn handle_changed_note(
    runtime: &tokio::runtime::Runtime,
    root: &Path,
    rel: &str,
    store: &MemoryStore,
    embedder: &EmbeddingClient,
    concepts: &RwLock<ConceptIndex>,
    self_writes: &SelfWrites,
    chunk_max: usize,
    chunk_overlap: usize,
) {
    let full = root.join(rel);
    let content = match std::fs::read_to_string(&full) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            // Created-then-deleted within the debounce window.
            concepts.write().remove_path(rel);
            return;
        }
        Err(e) => {
            warn!("[watcher] skipping unreadable note {}: {}", rel, e);
            return;
        }
    };

    // Concepts first — the cheap update must land even if embedding is down.
    concepts.write().insert_path(rel);

    // Echo of our own write: the store already holds this content at turn
    // granularity; replacing it with note chunks would lose detail.
    if self_writes.is_recent(rel, Duration::from_secs(WATCHER_SELF_WRITE_GRACE_SECS)) {
        debug!("[watcher] self-write echo, store untouched: {}", rel);
        return;
    }

    match runtime.block_on(reconcile_note_content(
        store,
        embedder,
        rel,
        &content,
        chunk_max,
        chunk_overlap,
    )) {
        Ok(count) => debug!("[watcher] reconciled {} ({} chunks)", rel, count),
        Err(e) => warn!("[watcher] reconcile failed for {}: {}", rel, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::MemoryConfig;

    fn offline_embedder() -> Arc<EmbeddingClient> {
        Arc::new(EmbeddingClient::new(&MemoryConfig {
            embedding_base_url: "http://127.0.0.1:1".into(),
            ..Default::default()
        }))
    }

    #[test]
    fn external_edit_updates_concepts_and_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::open_in_memory().unwrap());
        let concepts = Arc::new(RwLock::new(ConceptIndex::new()));

        let mut watcher = VaultWatcher::start(
            dir.path().to_path_buf(),
            Arc::clone(&store),
            offline_embedder(),
            Arc::clone(&concepts),
            Arc::new(SelfWrites::default()),
            1000,
            200,
        )
        .unwrap();

        std::fs::write(dir.path().join("Quantum Computing.md"), "Notes on qubits.").unwrap();

        // Debounce window plus scheduling slack.
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline && !concepts.read().contains("Quantum Computing") {
            std::thread::sleep(Duration::from_millis(50));
        }

        assert!(concepts.read().contains("Quantum Computing"));
        let entries = store.entries_for_note("Quantum Computing.md").unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].text.contains("qubits"));

        watcher.stop();
    }

    #[test]
    fn stop_is_clean_and_reentrant() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::open_in_memory().unwrap());
        let concepts = Arc::new(RwLock::new(ConceptIndex::new()));
        let mut watcher = VaultWatcher::start(
            dir.path().to_path_buf(),
            store,
            offline_embedder(),
            concepts,
            Arc::new(SelfWrites::default()),
            1000,
            200,
        )
        .unwrap();
        watcher.stop();
        watcher.stop(); // second stop is a no-op
    }

    #[test]
    fn self_written_note_updates_concepts_but_not_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::open_in_memory().unwrap());
        let concepts = Arc::new(RwLock::new(ConceptIndex::new()));
        let self_writes = Arc::new(SelfWrites::default());

        let mut watcher = VaultWatcher::start(
            dir.path().to_path_buf(),
            Arc::clone(&store),
            offline_embedder(),
            Arc::clone(&concepts),
            Arc::clone(&self_writes),
            1000,
            200,
        )
        .unwrap();

        self_writes.record("Own Note.md");
        std::fs::write(dir.path().join("Own Note.md"), "Written by the engine itself.").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline && !concepts.read().contains("Own Note") {
            std::thread::sleep(Duration::from_millis(50));
        }

        assert!(concepts.read().contains("Own Note"));
        assert!(
            store.entries_for_note("Own Note.md").unwrap().is_empty(),
            "echo of a self-write must not replace store entries"
        );

        watcher.stop();
    }

    #[test]
    fn hidden_and_non_md_paths_are_ignored() {
        let root = Path::new("/vault");
        assert!(vault_relative_md(root, Path::new("/vault/a.md")).is_some());
        assert!(vault_relative_md(root, Path::new("/vault/.obsidian/app.md")).is_none());
        assert!(vault_relative_md(root, Path::new("/vault/image.png")).is_none());
        assert!(vault_relative_md(root, Path::new("/elsewhere/b.md")).is_none());
    }
}
