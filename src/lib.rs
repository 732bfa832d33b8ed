// Mnemo — personal-assistant memory engine.
//
// The crate is split into two layers:
//   atoms/  — pure constants, error types, data types, and boundary traits.
//             Zero side effects; depends only on std and pure external crates.
//   engine/ — behavior: the memory pipeline (chunk → embed → store), the
//             retrieval ranker, the dual-transport vault sync layer, the
//             vault watcher, conversation naming, and proactive insights.
//
// The embedding service and the completion backend are external
// collaborators reached over HTTP; both degrade gracefully when
// unreachable instead of failing a chat turn.

pub mod atoms;
pub mod engine;

pub use atoms::error::{EngineError, EngineResult};
pub use atoms::types::{
    EngineConfig, ImportanceTag, MemoryEntry, RetrievedContext, Role, ScoredMemory,
};
pub use engine::assistant::Assistant;
