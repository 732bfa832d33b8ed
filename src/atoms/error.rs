// ── Mnemo Atoms: Error Types ───────────────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, DB, Backend, Vault…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • Degradable conditions get their own variants so call sites can match on
//     them instead of string-sniffing: BackendUnavailable, VaultUnavailable,
//     IndexCorrupt, MalformedNote.
//   • No variant carries secret material (API tokens) in its message.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// SQLite / rusqlite database failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Embedding or completion backend unreachable. Retryable with backoff;
    /// after repeated failures callers degrade to importance+recency ranking
    /// (retrieval) or skip the feature (naming, insights).
    #[error("Backend unavailable: {backend}: {message}")]
    BackendUnavailable { backend: String, message: String },

    /// Neither vault transport is reachable. Memory operations continue
    /// locally; vault sync is deferred and retried on the next write.
    #[error("Vault unavailable: {0}")]
    VaultUnavailable(String),

    /// The derived vector index file is unreadable. Recovered by a full
    /// rebuild from the persisted raw entries — never silent data loss.
    #[error("Index corrupt: {0}")]
    IndexCorrupt(String),

    /// A vault note could not be parsed. Skipped with a logged warning,
    /// never propagated as a crash.
    #[error("Malformed note: {path}: {message}")]
    MalformedNote { path: String, message: String },

    /// Engine configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not yet have a dedicated variant.
    /// Prefer adding a specific variant over using this in new code.
    #[error("{0}")]
    Other(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl EngineError {
    /// Create a backend-unavailable error with backend name and message.
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendUnavailable { backend: backend.into(), message: message.into() }
    }

    /// Create a malformed-note error with note path and message.
    pub fn malformed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedNote { path: path.into(), message: message.into() }
    }

    /// True for conditions a caller should treat as "degrade, don't fail".
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            EngineError::BackendUnavailable { .. }
                | EngineError::VaultUnavailable(_)
                | EngineError::MalformedNote { .. }
        )
    }
}

// ── Migration bridge: String → EngineError ─────────────────────────────────
// Allows `?` on helpers still returning `Result<T, String>` inside functions
// that return `EngineResult<T>`.

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Other(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Other(s.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All engine operations should return this type.
pub type EngineResult<T> = Result<T, EngineError>;

// ── Conversion: EngineError → String ──────────────────────────────────────
// Lets embedding hosts with `Result<T, String>` boundaries call
// `.map_err(EngineError::into)` directly.

impl From<EngineError> for String {
    fn from(e: EngineError) -> Self {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degradable_variants() {
        assert!(EngineError::backend("ollama", "refused").is_degradable());
        assert!(EngineError::VaultUnavailable("no transport".into()).is_degradable());
        assert!(EngineError::malformed("a.md", "not utf-8").is_degradable());
        assert!(!EngineError::Config("bad".into()).is_degradable());
    }

    #[test]
    fn string_bridge_roundtrip() {
        let e: EngineError = "something failed".into();
        let s: String = e.into();
        assert_eq!(s, "something failed");
    }
}
