// Mnemo Engine — Assistant Facade
//
// The only seam the (excluded) chat/UI layer touches:
//   store_turn(role, text) / retrieve_context(query, k)
//   get_session_title() / get_insights()
//
// Wiring: a chat turn blocks on chunk → embed → store → retrieve on the
// calling task; the vault watcher runs on its own background worker. Vault
// failures are deferred-and-retried-next-write, enrichment failures
// (naming, linking, insights) are swallowed and logged — the core memory
// path never aborts a turn over them.

use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use crate::atoms::error::EngineResult;
use crate::atoms::types::{
    EngineConfig, Insight, RetrievedContext, Role, SectionKind, Session, SessionTitle,
};
use crate::engine::insights::InsightGenerator;
use crate::engine::memory::{self, EmbeddingClient};
use crate::engine::naming::ConversationNamer;
use crate::engine::providers::AnyBackend;
use crate::engine::retrieval::Retriever;
use crate::engine::store::{MemoryStore, StoreStats};
use crate::engine::vault::{VaultSync, VaultWatcher};

pub struct Assistant {
    config: EngineConfig,
    store: Arc<MemoryStore>,
    embedder: Arc<EmbeddingClient>,
    retriever: Retriever,
    backend: AnyBackend,
    namer: ConversationNamer,
    insight_gen: InsightGenerator,
    /// None while no transport is reachable — memory operations continue
    /// locally and `vault_handle` re-probes on the next write.
    vault: RwLock<Option<Arc<VaultSync>>>,
    daily_note: Mutex<Option<String>>,
    session: Mutex<Session>,
    turns: Mutex<Vec<(Role, String, DateTime<Utc>)>>,
    watcher: Mutex<Option<VaultWatcher>>,
}

impl Assistant {
    /// Load configuration from the default path (falling back to defaults)
    /// and connect.
    pub async fn connect_default() -> EngineResult<Assistant> {
        let path = crate::engine::config::default_config_path();
        let config = crate::engine::config::load_config(&path)?;
        Self::connect(config).await
    }

    /// Bring the engine up: open the store, probe the vault, start the
    /// watcher, and open a fresh session.
    pub async fn connect(config: EngineConfig) -> EngineResult<Assistant> {
        let store = Arc::new(MemoryStore::open(&config.memory)?);
        let embedder = Arc::new(EmbeddingClient::new(&config.memory));
        let retriever = Retriever::new(config.retrieval.clone());
        let backend = AnyBackend::from_config(&config.completion);

        let vault = match VaultSync::connect(&config.vault).await {
            Ok(vault) => Some(Arc::new(vault)),
            Err(e) => {
                warn!("[engine] vault unavailable — memory continues locally: {}", e);
                None
            }
        };

        let mut daily_note = None;
        if let Some(vault) = &vault {
            match vault.ensure_daily_note().await {
                Ok(path) => daily_note = Some(path),
                Err(e) => warn!("[engine] daily note deferred: {}", e),
            }
        }

        let watcher = vault
            .as_ref()
            .and_then(|v| spawn_watcher(&config, &store, &embedder, v));

        let session = Session::new();
        info!("[engine] assistant up (session {})", session.id);
        Ok(Assistant {
            config,
            store,
            embedder,
            retriever,
            backend,
            namer: ConversationNamer::new(),
            insight_gen: InsightGenerator::new(),
            vault: RwLock::new(vault),
            daily_note: Mutex::new(daily_note),
            session: Mutex::new(session),
            turns: Mutex::new(Vec::new()),
            watcher: Mutex::new(watcher),
        })
    }

    // ── Core seam ──────────────────────────────────────────────────────────

    /// Record one conversation turn into long-term memory and the vault.
    /// Returns the ids of the stored entries.
    pub async fn store_turn(&self, role: Role, text: &str) -> EngineResult<Vec<String>> {
        let note_path = self.session.lock().note_path.clone();

        let ids = memory::store_text(
            &self.store,
            &self.embedder,
            text,
            role,
            note_path.as_deref(),
            self.config.memory.chunk_max_chars,
            self.config.memory.chunk_overlap_chars,
        )
        .await?;

        {
            let mut session = self.session.lock();
            if role == Role::User {
                session.user_turns.push(text.to_string());
            }
        }
        self.turns.lock().push((role, text.to_string(), Utc::now()));

        self.sync_conversation(&ids).await;
        self.store.persist().ok();
        Ok(ids)
    }

    /// Retrieve the ranked memory context for a query and log it to today's
    /// daily note as idempotent `prompt` + `retrieved` sections.
    pub async fn retrieve_context(&self, query: &str, k: usize) -> EngineResult<RetrievedContext> {
        let context = self
            .retriever
            .retrieve(&self.store, &self.embedder, query, k)
            .await?;

        if !context.entries.is_empty() {
            if let Some(vault) = self.vault_handle().await {
                // Guard dropped before the awaits below.
                let daily = self.daily_note.lock().clone();
                if let Some(daily) = daily {
                    // The query that drove this retrieval, once per day per query.
                    if let Err(e) =
                        vault.append_section(&daily, SectionKind::Prompt, query, query).await
                    {
                        warn!("[engine] prompt-section append deferred: {}", e);
                    }

                    let mut key = String::from(query);
                    for scored in &context.entries {
                        key.push(':');
                        key.push_str(&scored.entry.id);
                    }
                    let body = context.as_markdown();
                    if let Err(e) =
                        vault.append_section(&daily, SectionKind::Retrieved, &key, &body).await
                    {
                        warn!("[engine] retrieved-section append deferred: {}", e);
                    }
                }
            }
        }

        Ok(context)
    }

    /// The session's title once the namer has fired.
    pub fn get_session_title(&self) -> Option<String> {
        match &self.session.lock().title {
            SessionTitle::Named { title } => Some(title.clone()),
            SessionTitle::Untitled { .. } => None,
        }
    }

    /// Proactive suggestions and reflections over the recent window.
    /// Advisory only — failures inside degrade to an empty list.
    pub async fn get_insights(&self) -> Vec<Insight> {
        let vault = self.vault_handle().await;
        let insights = self
            .insight_gen
            .generate(&self.store, Some(&self.backend), vault.as_deref())
            .await;

        if let Some(vault) = &vault {
            let daily = self.daily_note.lock().clone();
            if let Some(daily) = daily {
                for insight in &insights {
                    let kind = match insight.kind {
                        crate::atoms::types::InsightKind::Suggestion => SectionKind::Generated,
                        crate::atoms::types::InsightKind::Reflection => SectionKind::Reflection,
                    };
                    if let Err(e) =
                        vault.append_section(&daily, kind, &insight.text, &insight.text).await
                    {
                        warn!("[engine] insight section append deferred: {}", e);
                    }
                }
            }
        }

        insights
    }

    // ── Supporting surface ─────────────────────────────────────────────────

    /// Session-start greeting built from yesterday's memories.
    pub fn welcome_message(&self) -> EngineResult<String> {
        self.insight_gen.welcome_message(&self.store)
    }

    /// Re-embed entries stored while the embedding backend was down.
    pub async fn backfill_embeddings(&self) -> EngineResult<(usize, usize)> {
        memory::backfill_embeddings(&self.store, &self.embedder).await
    }

    /// Import a vault note into the memory store (re-chunk + re-embed).
    pub async fn import_note(&self, path: &str) -> EngineResult<usize> {
        match self.vault_handle().await {
            Some(vault) => {
                vault
                    .import_note(
                        &self.store,
                        &self.embedder,
                        path,
                        self.config.memory.chunk_max_chars,
                        self.config.memory.chunk_overlap_chars,
                    )
                    .await
            }
            None => Ok(0),
        }
    }

    pub fn stats(&self) -> EngineResult<StoreStats> {
        self.store.stats()
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Stop the watcher and flush the index cache. Call on shutdown.
    pub fn shutdown(&self) {
        if let Some(mut watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
        self.store.persist().ok();
        info!("[engine] assistant shut down");
    }

    // ── Vault plumbing ─────────────────────────────────────────────────────

    /// The connected vault, re-probing lazily if startup found none. A
    /// successful late connect also backfills the daily note and starts the
    /// watcher, so a vault that comes up mid-session gets full service.
    async fn vault_handle(&self) -> Option<Arc<VaultSync>> {
        let connected = self.vault.read().clone();
        if let Some(vault) = connected {
            if self.daily_note.lock().is_none() {
                match vault.ensure_daily_note().await {
                    Ok(path) => *self.daily_note.lock() = Some(path),
                    Err(e) => warn!("[engine] daily note still deferred: {}", e),
                }
            }
            return Some(vault);
        }

        match VaultSync::connect(&self.config.vault).await {
            Ok(vault) => {
                let vault = Arc::new(vault);
                info!("[engine] vault reconnected ({:?})", vault.kind());
                *self.vault.write() = Some(Arc::clone(&vault));
                match vault.ensure_daily_note().await {
                    Ok(path) => *self.daily_note.lock() = Some(path),
                    Err(e) => warn!("[engine] daily note deferred: {}", e),
                }
                let mut watcher = self.watcher.lock();
                if watcher.is_none() {
                    *watcher = spawn_watcher(&self.config, &self.store, &self.embedder, &vault);
                }
                Some(vault)
            }
            Err(e) => {
                warn!("[engine] vault still unavailable — sync deferred: {}", e);
                None
            }
        }
    }

    /// Mirror the conversation into its vault note, link it from the daily
    /// note, and give the namer a chance to fire. All failures here defer to
    /// the next write.
    async fn sync_conversation(&self, new_entry_ids: &[String]) {
        let Some(vault) = self.vault_handle().await else { return };

        // Snapshot session + turns without holding locks across awaits.
        let (mut session, turns) = {
            let session = self.session.lock().clone();
            let turns = self.turns.lock().clone();
            (session, turns)
        };

        if session.note_path.is_none() {
            let started = match session.title {
                SessionTitle::Untitled { started } => started,
                SessionTitle::Named { .. } => Utc::now(),
            };
            session.note_path = Some(VaultSync::conversation_path(started));
        }
        let path = session.note_path.clone().unwrap_or_default();
        let title = match &session.title {
            SessionTitle::Named { title } => title.clone(),
            SessionTitle::Untitled { started } => {
                format!("Conversation {}", started.format("%Y-%m-%d %H:%M"))
            }
        };

        if let Err(e) = vault.write_conversation(&path, &title, &turns).await {
            warn!("[engine] conversation sync deferred: {}", e);
            return;
        }

        // Vault-path backfill for the entries this turn produced.
        for id in new_entry_ids {
            self.store.set_note_path(id, &path).ok();
        }

        let daily = self.daily_note.lock().clone();
        if let Some(daily) = &daily {
            if let Err(e) = vault.add_conversation_link(daily, &path).await {
                warn!("[engine] daily link deferred: {}", e);
            }
        }

        let path_before_naming = session.note_path.clone();
        match self.namer.maybe_name(&mut session, &self.backend, &vault).await {
            Ok(Some(_)) => {
                // The note moved — re-point its entries at the new path.
                if let (Some(old), Some(new)) = (&path_before_naming, &session.note_path) {
                    if old != new {
                        if let Ok(entries) = self.store.entries_for_note(old) {
                            for entry in entries {
                                self.store.set_note_path(&entry.id, new).ok();
                            }
                        }
                        if let Some(daily) = &daily {
                            vault.add_conversation_link(daily, new).await.ok();
                        }
                    }
                }
            }
            Ok(None) => {}
            Err(e) => warn!("[engine] naming deferred: {}", e),
        }

        *self.session.lock() = session;
    }
}

/// Start the background watcher for a connected vault; None (with a log
/// line) when the watch cannot be registered.
fn spawn_watcher(
    config: &EngineConfig,
    store: &Arc<MemoryStore>,
    embedder: &Arc<EmbeddingClient>,
    vault: &VaultSync,
) -> Option<VaultWatcher> {
    match VaultWatcher::start(
        std::path::PathBuf::from(&config.vault.root),
        Arc::clone(store),
        Arc::clone(embedder),
        vault.concepts(),
        vault.self_writes(),
        config.memory.chunk_max_chars,
        config.memory.chunk_overlap_chars,
    ) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!("[engine] watcher not started: {}", e);
            None
        }
    }
}

impl Drop for Assistant {
    fn drop(&mut self) {
        self.shutdown();
    }
}
