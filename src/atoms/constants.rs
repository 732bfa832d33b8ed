// ── Mnemo Atoms: Constants ─────────────────────────────────────────────────
// All named constants for the crate live here.
// Rationale: collecting constants in one place eliminates magic strings,
// makes auditing easier, and keeps every layer's code self-documenting.

// ── Chunking bounds ────────────────────────────────────────────────────────
// A chunk never exceeds CHUNK_MAX_CHARS; consecutive chunks share
// CHUNK_OVERLAP_CHARS of trailing context so retrieval can match text that
// straddles a boundary.
pub const CHUNK_MAX_CHARS: usize = 1000;
pub const CHUNK_OVERLAP_CHARS: usize = 200;

// ── Embedding client ───────────────────────────────────────────────────────
// Input longer than this must be chunked upstream; the client refuses it
// instead of silently truncating.
pub const EMBED_MAX_CHARS: usize = 8192;
// Consecutive failures before the client reports itself degraded and the
// retriever stops paying the timeout on every query.
pub const EMBED_FAILURE_THRESHOLD: u32 = 3;
pub const EMBED_REQUEST_TIMEOUT_SECS: u64 = 30;
// One bounded in-call retry after this pause; persistent failure feeds the
// degradation counter instead of blocking the turn longer.
pub const EMBED_RETRY_BACKOFF_MS: u64 = 250;

// ── Retrieval defaults ─────────────────────────────────────────────────────
// Composite = semantic_weight·sim + importance_weight·imp + recency·decay,
// where the recency weight is whatever the other two leave of 1.0.
pub const DEFAULT_SEMANTIC_WEIGHT: f64 = 0.6;
pub const DEFAULT_IMPORTANCE_WEIGHT: f64 = 0.25;
pub const DEFAULT_RECENCY_HALF_LIFE_DAYS: f64 = 30.0;
// Fetch this many × k candidates before re-ranking.
pub const RETRIEVAL_FETCH_MULTIPLIER: usize = 3;
// Word-overlap similarity above which two candidates count as duplicates.
pub const RETRIEVAL_DEDUP_THRESHOLD: f64 = 0.85;

// ── Importance extraction ──────────────────────────────────────────────────
// A content word recurring in at least this many recent-window entries earns
// the Recurring tag.
pub const RECURRENCE_MIN_ENTRIES: usize = 3;
// Entries scanned when building the recent window for recurrence checks.
pub const RECENT_WINDOW_SIZE: usize = 50;

// ── Vault ──────────────────────────────────────────────────────────────────
pub const VAULT_API_PROBE_TIMEOUT_SECS: u64 = 2;
pub const VAULT_API_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const VAULT_MEMORY_DIR: &str = "mnemo";
pub const VAULT_DAILY_DIR: &str = "mnemo/Daily Notes";
pub const VAULT_INSIGHTS_DIR: &str = "mnemo/Insights";

// ── Vault watcher ──────────────────────────────────────────────────────────
// A burst of filesystem events for one note settles into a single logical
// update after this long with no further events.
pub const WATCHER_DEBOUNCE_MS: u64 = 400;
pub const WATCHER_POLL_MS: u64 = 100;
// Events for a note the engine itself wrote within this window are echo,
// not external edits: concepts still update, store reconciliation is
// skipped so turn-level entries survive.
pub const WATCHER_SELF_WRITE_GRACE_SECS: u64 = 10;

// ── Conversation naming ────────────────────────────────────────────────────
// The namer fires once this many user turns exist.
pub const NAMER_MIN_USER_TURNS: usize = 2;
pub const NAMER_TITLE_MAX_CHARS: usize = 50;

// ── Proactive insights ─────────────────────────────────────────────────────
pub const INSIGHT_LOOKBACK_DAYS: i64 = 7;
// A topic mentioned at least this often in the window triggers a suggestion.
pub const INSIGHT_TOPIC_THRESHOLD: usize = 3;
// Consecutive days with negative-affect entries before a reflective prompt.
pub const INSIGHT_AFFECT_RUN_DAYS: usize = 3;
