// ── Mnemo Atoms: Core Types ────────────────────────────────────────────────
// These are the data structures that flow through the entire engine.
// They are independent of any specific embedding or completion backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::atoms::constants::*;

// ── Roles ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn parse(s: &str) -> Role {
        match s {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::System,
        }
    }
}

// ── Importance tags ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ImportanceTag {
    /// First-person fact about the user (name, home, job…).
    PersonalFact,
    /// An expressed like, dislike, or preference.
    Preference,
    /// An explicit instruction ("always…", "remember that…").
    Instruction,
    /// Mentions a date, deadline, or scheduled event.
    DateBound,
    /// Carries frustration / negative-affect markers.
    NegativeAffect,
    /// Topic recurring across the recent window.
    Recurring,
}

// ── Memory entries ─────────────────────────────────────────────────────────

/// A single remembered span of conversation or imported note text.
///
/// Owned exclusively by the store. Immutable once created except for
/// importance re-scoring, embedding backfill, and vault-path backfill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub text: String,
    pub role: Role,
    /// None only while the embedding backend was unreachable at store time;
    /// backfilled later. Entries without a vector are still reachable via
    /// keyword search.
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    /// Heuristic significance in [0,1], recomputed before use in ranking.
    pub importance: f32,
    pub tags: Vec<ImportanceTag>,
    /// Vault note this entry was persisted into, once known.
    pub note_path: Option<String>,
    /// Identity of the source chunk, for retrieval dedup. Two entries with
    /// the same source chunk never appear together in one context.
    pub source_chunk: Option<String>,
}

impl MemoryEntry {
    pub fn new(text: impl Into<String>, role: Role) -> Self {
        MemoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            role,
            embedding: None,
            created_at: Utc::now(),
            importance: 0.0,
            tags: Vec::new(),
            note_path: None,
            source_chunk: None,
        }
    }
}

// ── Document chunks ────────────────────────────────────────────────────────

/// A bounded text span produced by the chunker from a note or a message.
/// Regenerated whenever the source is re-chunked.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    pub text: String,
    pub source_id: String,
    /// Byte offsets into the source text.
    pub start: usize,
    pub end: usize,
    pub embedding: Option<Vec<f32>>,
}

// ── Vault notes ────────────────────────────────────────────────────────────

/// A note in the external vault. Ownership is shared with the external
/// application — externally-modified content is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultNote {
    /// Path relative to the vault root, forward slashes.
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_daily: bool,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
}

/// Listing row for `list_notes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteSummary {
    pub path: String,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
}

/// Search hit for `search_notes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteMatch {
    pub path: String,
    pub snippet: String,
}

/// Which transport the vault sync layer selected at probe time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Api,
    Filesystem,
}

/// Fixed vocabulary of sections the engine appends to vault notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Retrieved,
    Generated,
    Prompt,
    Reflection,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Retrieved => "retrieved",
            SectionKind::Generated => "generated",
            SectionKind::Prompt => "prompt",
            SectionKind::Reflection => "reflection",
        }
    }
}

// ── Retrieval results ──────────────────────────────────────────────────────

/// One ranked retrieval result with its score breakdown.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub entry: MemoryEntry,
    /// Cosine similarity to the query, 0 when ranked without a semantic term.
    pub similarity: f64,
    /// Composite of semantic similarity, importance, and recency decay.
    pub score: f64,
}

/// The context block handed back to the chat layer.
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub entries: Vec<ScoredMemory>,
    /// True when the embedding backend was unavailable and ranking fell back
    /// to importance + recency only.
    pub degraded: bool,
}

impl RetrievedContext {
    /// Render the context as a markdown block for prompt injection.
    pub fn as_markdown(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        let mut lines = vec!["## Relevant Memories".to_string()];
        for scored in &self.entries {
            let when = scored.entry.created_at.format("%Y-%m-%d");
            lines.push(format!(
                "- ({}, {}) {}",
                when,
                scored.entry.role.as_str(),
                scored.entry.text
            ));
        }
        lines.join("\n")
    }
}

// ── Sessions ───────────────────────────────────────────────────────────────

/// Naming state for a conversation session. Terminal `Named` is never
/// re-entered by later turns.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionTitle {
    Untitled { started: DateTime<Utc> },
    Named { title: String },
}

/// An explicit session object passed to component calls — no global
/// "current session" state, so concurrent sessions cannot interfere.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub title: SessionTitle,
    /// Vault note accumulating this session's conversation, once created.
    pub note_path: Option<String>,
    pub user_turns: Vec<String>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Session {
            id: format!("{}-{}", now.timestamp(), &uuid::Uuid::new_v4().to_string()[..8]),
            title: SessionTitle::Untitled { started: now },
            note_path: None,
            user_turns: Vec::new(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

// ── Insights ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    /// A topic-frequency suggestion ("you've mentioned X a lot…").
    Suggestion,
    /// A reflective prompt triggered by a run of negative-affect days.
    Reflection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub text: String,
    #[serde(default)]
    pub topics: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// ── Configuration ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Embedding service base URL (Ollama or OpenAI-compatible).
    pub embedding_base_url: String,
    pub embedding_model: String,
    /// SQLite database path. ":memory:" is accepted for tests.
    pub db_path: String,
    /// Derived vector-index cache path.
    pub index_path: String,
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            embedding_base_url: "http://localhost:11434".into(),
            embedding_model: "nomic-embed-text".into(),
            db_path: "mnemo.db".into(),
            index_path: "mnemo.index".into(),
            chunk_max_chars: CHUNK_MAX_CHARS,
            chunk_overlap_chars: CHUNK_OVERLAP_CHARS,
        }
    }
}

/// Ranking weights are configuration, not hardcoded magic. The recency
/// weight is whatever `semantic_weight + importance_weight` leave of 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub semantic_weight: f64,
    pub importance_weight: f64,
    pub recency_half_life_days: f64,
    pub fetch_multiplier: usize,
    pub dedup_threshold: f64,
}

impl RetrievalConfig {
    pub fn recency_weight(&self) -> f64 {
        (1.0 - self.semantic_weight - self.importance_weight).max(0.0)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        RetrievalConfig {
            semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
            importance_weight: DEFAULT_IMPORTANCE_WEIGHT,
            recency_half_life_days: DEFAULT_RECENCY_HALF_LIFE_DAYS,
            fetch_multiplier: RETRIEVAL_FETCH_MULTIPLIER,
            dedup_threshold: RETRIEVAL_DEDUP_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Vault root on disk (filesystem transport, watcher).
    pub root: String,
    pub api_host: String,
    pub api_port: u16,
    /// Bearer token for the vault API. Never logged.
    pub api_token: String,
    /// Skip the API probe entirely and go straight to the filesystem.
    pub force_filesystem: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        VaultConfig {
            root: "vault".into(),
            api_host: "127.0.0.1".into(),
            api_port: 27124,
            api_token: String::new(),
            force_filesystem: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// OpenAI-compatible chat completion endpoint base URL.
    pub base_url: String,
    pub model: String,
    #[serde(default)]
    pub api_key: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        CompletionConfig {
            base_url: "http://localhost:11434/v1".into(),
            model: "llama3.2".into(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
}
