// Mnemo Engine — Vault Sync Layer
//
// One contract over the external note vault behind two interchangeable
// transports: a local HTTP API (probed once at startup) and the filesystem.
// Both produce identical logical results; differences are transport only.
//
// The vault is dual-ownership: a human edits it too. External content is
// authoritative — this layer only appends its own idempotent, id-keyed
// sections and never overwrites foreign edits wholesale.
//
// Module layout:
//   api.rs      — bearer-token HTTP transport + availability probe
//   fs.rs       — direct markdown files, atomic writes
//   concepts.rs — ConceptIndex + auto-linker
//   watcher.rs  — debounced external-edit reconciliation

pub mod api;
pub mod concepts;
pub mod fs;
pub mod watcher;

pub use api::ApiTransport;
pub use concepts::{linkify, ConceptIndex};
pub use fs::FsTransport;
pub use watcher::VaultWatcher;

use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::atoms::constants::{VAULT_DAILY_DIR, VAULT_MEMORY_DIR};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::VaultTransport;
use crate::atoms::types::{
    NoteMatch, NoteSummary, Role, SectionKind, TransportKind, VaultConfig, VaultNote,
};
use crate::engine::memory::{chunker, EmbeddingClient};
use crate::engine::store::MemoryStore;

// ── Note helpers shared by both transports ─────────────────────────────────

/// Build a VaultNote from raw content: extract `#tags` and flag daily notes.
/// Both transports funnel through here so their results stay identical.
pub(crate) fn note_from_content(
    path: &str,
    content: String,
    modified: Option<DateTime<Utc>>,
) -> VaultNote {
    let tags = extract_tags(&content);
    let is_daily = path.starts_with(VAULT_DAILY_DIR);
    VaultNote { path: path.to_string(), content, tags, is_daily, modified }
}

/// Collect `#tag` tokens from note text.
fn extract_tags(content: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for token in content.split_whitespace() {
        if let Some(tag) = token.strip_prefix('#') {
            let tag: String = tag
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
                .collect();
            if !tag.is_empty() && !tag.chars().all(|c| c.is_ascii_digit()) && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }
    tags
}

/// Stable identifier for an appended section, derived from its logical key.
pub fn section_id(kind: SectionKind, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(6).map(|b| format!("{:02x}", b)).collect()
}

// ── Self-write registry ────────────────────────────────────────────────────

/// Paths the engine itself wrote recently, with write times. The watcher
/// consults this to tell event echo from genuine external edits: for a
/// fresh self-write the concept index still updates but store
/// reconciliation is skipped, so turn-level entries survive the engine's
/// own note mirroring.
#[derive(Default)]
pub struct SelfWrites {
    inner: parking_lot::Mutex<std::collections::HashMap<String, std::time::Instant>>,
}

impl SelfWrites {
    pub(crate) fn record(&self, path: &str) {
        let mut inner = self.inner.lock();
        let now = std::time::Instant::now();
        // Keep the map small; stale entries carry no information.
        inner.retain(|_, at| now.duration_since(*at).as_secs() < 120);
        inner.insert(path.to_string(), now);
    }

    pub fn is_recent(&self, path: &str, within: std::time::Duration) -> bool {
        self.inner
            .lock()
            .get(path)
            .map(|at| at.elapsed() <= within)
            .unwrap_or(false)
    }
}

// ── VaultSync ──────────────────────────────────────────────────────────────

/// Dual-mode vault client. Transport is chosen once at connect time by the
/// API probe; all note semantics live above the transport.
pub struct VaultSync {
    transport: Box<dyn VaultTransport>,
    concepts: Arc<RwLock<ConceptIndex>>,
    self_writes: Arc<SelfWrites>,
}

impl VaultSync {
    /// Probe the API (unless forced to the filesystem) and select the
    /// transport for the session, then bulk-build the concept index.
    pub async fn connect(config: &VaultConfig) -> EngineResult<VaultSync> {
        let transport: Box<dyn VaultTransport> = if config.force_filesystem {
            Box::new(FsTransport::new(&config.root)?)
        } else {
            let api = ApiTransport::new(config);
            if api.probe().await {
                info!("[vault] api transport selected ({}:{})", config.api_host, config.api_port);
                Box::new(api)
            } else {
                warn!(
                    "[vault] api not reachable at {}:{} — falling back to filesystem at {}",
                    config.api_host, config.api_port, config.root
                );
                Box::new(FsTransport::new(&config.root)?)
            }
        };

        let sync = VaultSync {
            transport,
            concepts: Arc::new(RwLock::new(ConceptIndex::new())),
            self_writes: Arc::new(SelfWrites::default()),
        };
        sync.rebuild_concepts().await?;
        Ok(sync)
    }

    /// Filesystem-only constructor for tests and watchers.
    pub fn filesystem(root: &str) -> EngineResult<VaultSync> {
        Ok(VaultSync {
            transport: Box::new(FsTransport::new(root)?),
            concepts: Arc::new(RwLock::new(ConceptIndex::new())),
            self_writes: Arc::new(SelfWrites::default()),
        })
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Shared handle for the watcher's incremental updates.
    pub fn concepts(&self) -> Arc<RwLock<ConceptIndex>> {
        Arc::clone(&self.concepts)
    }

    /// Shared handle for the watcher's echo suppression.
    pub fn self_writes(&self) -> Arc<SelfWrites> {
        Arc::clone(&self.self_writes)
    }

    /// Bulk rebuild of the concept index from note titles.
    pub async fn rebuild_concepts(&self) -> EngineResult<usize> {
        let notes = self.transport.list_notes().await?;
        let mut index = ConceptIndex::new();
        for note in &notes {
            index.insert_path(&note.path);
        }
        let count = index.len();
        *self.concepts.write() = index;
        info!("[vault] concept index built: {} concepts", count);
        Ok(count)
    }

    /// Auto-link known concepts in a block of text.
    pub fn linkify(&self, text: &str) -> String {
        linkify(text, &self.concepts.read())
    }

    // ── Transport passthrough ──────────────────────────────────────────────

    pub async fn list_notes(&self) -> EngineResult<Vec<NoteSummary>> {
        self.transport.list_notes().await
    }

    pub async fn get_note(&self, path: &str) -> EngineResult<Option<VaultNote>> {
        self.transport.get_note(path).await
    }

    pub async fn create_note(&self, path: &str, content: &str) -> EngineResult<()> {
        self.transport.create_note(path, content).await?;
        self.self_writes.record(path);
        self.concepts.write().insert_path(path);
        Ok(())
    }

    pub async fn update_note(&self, path: &str, content: &str) -> EngineResult<()> {
        self.transport.update_note(path, content).await?;
        self.self_writes.record(path);
        Ok(())
    }

    pub async fn search_notes(&self, query: &str) -> EngineResult<Vec<NoteMatch>> {
        self.transport.search_notes(query).await
    }

    pub async fn rename_note(&self, from: &str, to: &str) -> EngineResult<()> {
        self.transport.rename_note(from, to).await?;
        self.self_writes.record(to);
        let mut concepts = self.concepts.write();
        concepts.remove_path(from);
        concepts.insert_path(to);
        Ok(())
    }

    // ── Daily notes ────────────────────────────────────────────────────────

    /// Ensure today's daily note exists. Idempotent: a second call the same
    /// day neither duplicates nor clears existing content.
    pub async fn ensure_daily_note(&self) -> EngineResult<String> {
        let date = Utc::now().format("%Y-%m-%d");
        let path = format!("{}/{}.md", VAULT_DAILY_DIR, date);
        if self.get_note(&path).await?.is_some() {
            return Ok(path);
        }
        let content = format!(
            "# Daily Note: {}\n\nCreated: {}\n\n## Conversations\n\n",
            date,
            Utc::now().format("%H:%M:%S")
        );
        self.create_note(&path, &content).await?;
        info!("[vault] created daily note {}", path);
        Ok(path)
    }

    /// Append a collapsible, kind-tagged section to a note, keyed by a
    /// stable section id. Re-appending the same logical event is a no-op.
    /// Returns true when the section was actually added.
    pub async fn append_section(
        &self,
        path: &str,
        kind: SectionKind,
        key: &str,
        body: &str,
    ) -> EngineResult<bool> {
        let id = section_id(kind, key);
        let marker = format!("<!-- mnemo:{}:{} -->", kind.as_str(), id);

        let existing = self.get_note(path).await?.map(|n| n.content).unwrap_or_default();
        if existing.contains(&marker) {
            return Ok(false);
        }

        let mut section = String::new();
        section.push_str(&marker);
        section.push('\n');
        section.push_str(&format!(
            "> [!{}]- {}\n",
            kind.as_str(),
            Utc::now().format("%Y-%m-%d %H:%M")
        ));
        for line in self.linkify(body).lines() {
            section.push_str("> ");
            section.push_str(line);
            section.push('\n');
        }

        let updated = if existing.is_empty() {
            section.clone()
        } else {
            format!("{}\n{}", existing.trim_end(), section)
        };

        if existing.is_empty() {
            self.create_note(path, &updated).await?;
        } else {
            self.update_note(path, &updated).await?;
        }
        Ok(true)
    }

    /// Link a conversation note from today's daily note, once.
    pub async fn add_conversation_link(
        &self,
        daily_path: &str,
        conversation_path: &str,
    ) -> EngineResult<()> {
        let stem = conversation_path.strip_suffix(".md").unwrap_or(conversation_path);
        let link = format!("[[{}]]", stem);

        let note = match self.get_note(daily_path).await? {
            Some(note) => note,
            None => return Err(EngineError::VaultUnavailable("daily note missing".into())),
        };
        if note.content.contains(&link) {
            return Ok(());
        }

        let entry = format!("- {}: {}\n", Utc::now().format("%H:%M:%S"), link);
        let updated = match note.content.find("## Conversations") {
            Some(pos) => {
                let insert_at = note.content[pos..]
                    .find('\n')
                    .map(|nl| pos + nl + 1)
                    .unwrap_or(note.content.len());
                let mut content = note.content.clone();
                content.insert_str(insert_at, &format!("\n{}", entry));
                content
            }
            None => format!("{}\n## Conversations\n\n{}", note.content.trim_end(), entry),
        };
        self.update_note(daily_path, &updated).await
    }

    // ── Conversation notes ─────────────────────────────────────────────────

    /// Write (or rewrite) a session's conversation note with auto-linked
    /// turn sections under a stable header.
    pub async fn write_conversation(
        &self,
        path: &str,
        title: &str,
        turns: &[(Role, String, DateTime<Utc>)],
    ) -> EngineResult<()> {
        let mut content = format!(
            "# {}\n\nCreated: {}\n\n## Conversation\n\n",
            title,
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        );
        content.push_str(&format_conversation(turns));
        let content = self.linkify(&content);

        if self.get_note(path).await?.is_some() {
            self.update_note(path, &content).await
        } else {
            self.create_note(path, &content).await
        }
    }

    /// Fresh conversation note path for an untitled session.
    pub fn conversation_path(timestamp: DateTime<Utc>) -> String {
        format!("{}/Conversation_{}.md", VAULT_MEMORY_DIR, timestamp.format("%Y%m%d_%H%M%S"))
    }

    // ── Import / reconciliation ────────────────────────────────────────────

    /// Re-chunk and re-embed one note's content into the store, replacing
    /// whatever entries it previously contributed. Malformed notes are
    /// skipped with a warning, never a crash.
    pub async fn import_note(
        &self,
        store: &MemoryStore,
        embedder: &EmbeddingClient,
        path: &str,
        chunk_max: usize,
        chunk_overlap: usize,
    ) -> EngineResult<usize> {
        let note = match self.get_note(path).await {
            Ok(Some(note)) => note,
            Ok(None) => return Ok(0),
            Err(EngineError::MalformedNote { path, message }) => {
                warn!("[vault] skipping malformed note {}: {}", path, message);
                return Ok(0);
            }
            Err(e) => return Err(e),
        };
        reconcile_note_content(store, embedder, path, &note.content, chunk_max, chunk_overlap).await
    }
}

/// Replace a note's store entries with fresh chunks of `content`.
/// Shared by VaultSync::import_note and the watcher.
pub(crate) async fn reconcile_note_content(
    store: &MemoryStore,
    embedder: &EmbeddingClient,
    path: &str,
    content: &str,
    chunk_max: usize,
    chunk_overlap: usize,
) -> EngineResult<usize> {
    store.delete_for_note(path)?;

    let chunks = chunker::split(content, path, chunk_max, chunk_overlap);
    let mut stored = 0usize;
    for chunk in &chunks {
        let mut entry = crate::atoms::types::MemoryEntry::new(chunk.text.clone(), Role::System);
        entry.note_path = Some(path.to_string());
        entry.source_chunk = Some(format!("{}:{}", path, chunk.start));
        let (score, tags) = crate::engine::memory::importance::score(&chunk.text, &[]);
        entry.importance = score;
        entry.tags = tags;
        match embedder.embed(&chunk.text).await {
            Ok(vector) => entry.embedding = Some(vector),
            Err(e) => warn!("[vault] embed failed for chunk of {} — stored without vector: {}", path, e),
        }
        store.add(&entry)?;
        stored += 1;
    }
    store.persist().ok();
    Ok(stored)
}

/// Role-labelled markdown sections, one per turn.
fn format_conversation(turns: &[(Role, String, DateTime<Utc>)]) -> String {
    let mut out = String::new();
    for (role, text, at) in turns {
        let label = match role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        };
        out.push_str(&format!("### {} ({})\n\n{}\n\n", label, at.format("%Y-%m-%d %H:%M:%S"), text));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_sync() -> (tempfile::TempDir, VaultSync) {
        let dir = tempfile::tempdir().unwrap();
        let sync = VaultSync::filesystem(dir.path().to_str().unwrap()).unwrap();
        (dir, sync)
    }

    #[test]
    fn tags_are_extracted_once() {
        let tags = extract_tags("notes #insight about #trip and #insight again");
        assert_eq!(tags, vec!["insight", "trip"]);
    }

    #[test]
    fn section_ids_are_stable_and_kind_scoped() {
        let a = section_id(SectionKind::Retrieved, "query:colorado");
        let b = section_id(SectionKind::Retrieved, "query:colorado");
        let c = section_id(SectionKind::Generated, "query:colorado");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 12);
    }

    #[tokio::test]
    async fn ensure_daily_note_is_idempotent() {
        let (_dir, sync) = scratch_sync();
        let path = sync.ensure_daily_note().await.unwrap();
        sync.append_section(&path, SectionKind::Generated, "seed", "hello").await.unwrap();
        let before = sync.get_note(&path).await.unwrap().unwrap().content;

        let again = sync.ensure_daily_note().await.unwrap();
        assert_eq!(path, again);
        let after = sync.get_note(&path).await.unwrap().unwrap().content;
        assert_eq!(before, after, "second ensure must not clear content");
    }

    #[tokio::test]
    async fn append_section_is_idempotent() {
        let (_dir, sync) = scratch_sync();
        let path = sync.ensure_daily_note().await.unwrap();

        let first = sync
            .append_section(&path, SectionKind::Retrieved, "event-1", "remembered thing")
            .await
            .unwrap();
        let second = sync
            .append_section(&path, SectionKind::Retrieved, "event-1", "remembered thing")
            .await
            .unwrap();
        assert!(first);
        assert!(!second);

        let content = sync.get_note(&path).await.unwrap().unwrap().content;
        let count = content.matches("[!retrieved]-").count();
        assert_eq!(count, 1, "section must not be duplicated");
    }

    #[tokio::test]
    async fn different_keys_append_distinct_sections() {
        let (_dir, sync) = scratch_sync();
        let path = sync.ensure_daily_note().await.unwrap();
        sync.append_section(&path, SectionKind::Retrieved, "e1", "one").await.unwrap();
        sync.append_section(&path, SectionKind::Retrieved, "e2", "two").await.unwrap();
        let content = sync.get_note(&path).await.unwrap().unwrap().content;
        assert_eq!(content.matches("[!retrieved]-").count(), 2);
    }

    #[tokio::test]
    async fn conversation_link_added_once() {
        let (_dir, sync) = scratch_sync();
        let daily = sync.ensure_daily_note().await.unwrap();
        sync.create_note("mnemo/Conversation_x.md", "# x\n").await.unwrap();

        sync.add_conversation_link(&daily, "mnemo/Conversation_x.md").await.unwrap();
        sync.add_conversation_link(&daily, "mnemo/Conversation_x.md").await.unwrap();

        let content = sync.get_note(&daily).await.unwrap().unwrap().content;
        assert_eq!(content.matches("[[mnemo/Conversation_x]]").count(), 1);
    }

    #[tokio::test]
    async fn appended_sections_are_auto_linked() {
        let (_dir, sync) = scratch_sync();
        sync.create_note("mnemo/Colorado.md", "# Colorado\n").await.unwrap();
        let daily = sync.ensure_daily_note().await.unwrap();

        sync.append_section(&daily, SectionKind::Generated, "g1", "Thinking about Colorado today")
            .await
            .unwrap();
        let content = sync.get_note(&daily).await.unwrap().unwrap().content;
        assert!(content.contains("[[Colorado]]"), "concept should be cross-referenced");
    }

    #[tokio::test]
    async fn import_note_replaces_previous_entries() {
        let (_dir, sync) = scratch_sync();
        let store = MemoryStore::open_in_memory().unwrap();
        let embedder = EmbeddingClient::new(&crate::atoms::types::MemoryConfig {
            embedding_base_url: "http://127.0.0.1:1".into(),
            ..Default::default()
        });

        sync.create_note("mnemo/Trip.md", "Plans for the Colorado trip in June.").await.unwrap();
        let first = sync.import_note(&store, &embedder, "mnemo/Trip.md", 1000, 200).await.unwrap();
        assert_eq!(first, 1);

        sync.update_note("mnemo/Trip.md", "Completely rewritten content.").await.unwrap();
        let second = sync.import_note(&store, &embedder, "mnemo/Trip.md", 1000, 200).await.unwrap();
        assert_eq!(second, 1);

        let entries = store.entries_for_note("mnemo/Trip.md").unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].text.contains("rewritten"));
    }
}
