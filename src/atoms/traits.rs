// ── Mnemo Atoms: Boundary Traits ───────────────────────────────────────────
// The two seams where the engine meets the outside world:
//   CompletionBackend — the language-model backend (naming, insights).
//   VaultTransport    — the note vault, reachable over HTTP or the filesystem.
// Both are object-safe so callers hold `Box<dyn …>` and never know which
// concrete implementation is in use.

use async_trait::async_trait;

use crate::atoms::error::EngineResult;
use crate::atoms::types::{NoteMatch, NoteSummary, TransportKind, VaultNote};

/// Language-model backend. Synchronous request/response with a bounded
/// timeout; failures surface as `BackendUnavailable` and are never fatal to
/// the chat path.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, system_prompt: &str, prompt: &str) -> EngineResult<String>;

    /// Human-readable backend name for log lines.
    fn name(&self) -> &str;
}

/// Uniform note CRUD + search contract over the external vault.
///
/// The two implementations (API-backed, filesystem-backed) must produce
/// identical logical results for `get_note` / `search_notes` given the same
/// vault state; differences are restricted to transport, not semantics.
/// Writes are all-or-nothing — a failed write never leaves a half-written
/// note.
#[async_trait]
pub trait VaultTransport: Send + Sync {
    async fn list_notes(&self) -> EngineResult<Vec<NoteSummary>>;

    /// Ok(None) when the note does not exist.
    async fn get_note(&self, path: &str) -> EngineResult<Option<VaultNote>>;

    async fn create_note(&self, path: &str, content: &str) -> EngineResult<()>;

    async fn update_note(&self, path: &str, content: &str) -> EngineResult<()>;

    async fn search_notes(&self, query: &str) -> EngineResult<Vec<NoteMatch>>;

    /// Move a note to a new path, preserving content. Used by the
    /// conversation namer; both transports implement it atomically.
    async fn rename_note(&self, from: &str, to: &str) -> EngineResult<()>;

    fn kind(&self) -> TransportKind;
}
