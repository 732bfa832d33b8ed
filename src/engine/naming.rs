// Mnemo Engine — Conversation Namer
//
// Per-session state machine: Untitled(timestamp) → Named(title).
// The transition fires once enough user turns exist; the completion backend
// proposes a short descriptive title and the session's vault note is renamed
// to match. Named is terminal — later turns never re-name. A deleted and
// re-created note starts over as a fresh Session.
//
// Backend failures leave the state Untitled and are logged, never surfaced
// as chat failures.

use chrono::Utc;
use log::{info, warn};

use crate::atoms::constants::{NAMER_MIN_USER_TURNS, NAMER_TITLE_MAX_CHARS, VAULT_MEMORY_DIR};
use crate::atoms::error::EngineResult;
use crate::atoms::types::{Session, SessionTitle};
use crate::engine::providers::AnyBackend;
use crate::engine::vault::VaultSync;

const NAMING_SYSTEM_PROMPT: &str = "You are a helpful assistant that generates short, \
    descriptive titles for conversations. Generate only the title, no quotes or explanations.";

pub struct ConversationNamer {
    min_user_turns: usize,
}

impl ConversationNamer {
    pub fn new() -> Self {
        ConversationNamer { min_user_turns: NAMER_MIN_USER_TURNS }
    }

    /// Fire the Untitled → Named transition when ready.
    ///
    /// Returns the new title when naming happened this call, None otherwise
    /// (already named, not enough context, or backend/vault degraded).
    pub async fn maybe_name(
        &self,
        session: &mut Session,
        backend: &AnyBackend,
        vault: &VaultSync,
    ) -> EngineResult<Option<String>> {
        if matches!(session.title, SessionTitle::Named { .. }) {
            return Ok(None);
        }
        if session.user_turns.len() < self.min_user_turns {
            return Ok(None);
        }

        let mut prompt = String::from(
            "Based on this conversation, generate a short, descriptive title \
             (3-6 words) that captures the main topic:\n\n",
        );
        for turn in session.user_turns.iter().rev().take(3).rev() {
            prompt.push_str("User: ");
            prompt.push_str(turn);
            prompt.push('\n');
        }

        let raw = match backend.complete(NAMING_SYSTEM_PROMPT, &prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("[naming] backend unavailable, session stays untitled: {}", e);
                return Ok(None);
            }
        };

        let title = sanitize_title(&raw);
        if title.is_empty() {
            warn!("[naming] backend returned an unusable title: {:?}", raw);
            return Ok(None);
        }

        // Date-prefixed filename for uniqueness, suffixed if already taken.
        let stem = format!("{}_{}", Utc::now().format("%Y%m%d"), title.replace(' ', "_"));
        let mut new_path = format!("{}/{}.md", VAULT_MEMORY_DIR, stem);
        if vault.get_note(&new_path).await?.is_some() {
            new_path = format!("{}/{}_{}.md", VAULT_MEMORY_DIR, stem, Utc::now().format("%H%M%S"));
        }

        if let Some(old_path) = &session.note_path {
            if let Err(e) = vault.rename_note(old_path, &new_path).await {
                warn!("[naming] could not rename conversation note: {}", e);
                return Ok(None);
            }
        }

        info!("[naming] session {} named: {}", session.id, title);
        session.note_path = Some(new_path);
        session.title = SessionTitle::Named { title: title.clone() };
        Ok(Some(title))
    }
}

impl Default for ConversationNamer {
    fn default() -> Self {
        Self::new()
    }
}

/// Clean a model-proposed title for display and filename use: strip quotes
/// and filename-hostile characters, collapse whitespace, cap the length.
pub fn sanitize_title(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '\n' | '\r'))
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut end = collapsed.len().min(NAMER_TITLE_MAX_CHARS);
    while end > 0 && !collapsed.is_char_boundary(end) {
        end -= 1;
    }
    collapsed[..end].trim_end().to_string()
}
