// Mnemo Engine — behavior layer.
//
// Module layout:
//   memory/    — chunker, embedding client, importance extractor
//   store/     — SQLite entries (source of truth) + derived vector index
//   retrieval  — composite semantic+importance+recency ranking
//   vault/     — dual-transport sync, concept linking, external-edit watcher
//   providers/ — completion backend (OpenAI-compatible wire format)
//   naming     — conversation titling state machine
//   insights   — proactive suggestions and reflections
//   assistant  — the outer seam the chat/UI layer talks to
//   config     — JSON config loading

pub mod assistant;
pub mod config;
pub mod insights;
pub mod memory;
pub mod naming;
pub mod providers;
pub mod retrieval;
pub mod store;
pub mod vault;
