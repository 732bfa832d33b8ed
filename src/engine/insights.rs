// Mnemo Engine — Proactive Insight Generator
//
// Periodic consumer of the memory store. Two signals:
//   • topic frequency — content words recurring past a threshold within the
//     lookback window produce a suggestion referencing them;
//   • negative-affect runs — NegativeAffect tags across enough consecutive
//     days produce a reflective prompt.
//
// Everything here is advisory. The scan itself is deterministic and local;
// the completion backend only rephrases (template fallback on failure), and
// vault persistence failures are swallowed and logged — never a blocking
// requirement for the chat path.

use chrono::{NaiveDate, Utc};
use log::{info, warn};
use std::collections::HashMap;

use crate::atoms::constants::{
    INSIGHT_AFFECT_RUN_DAYS, INSIGHT_LOOKBACK_DAYS, INSIGHT_TOPIC_THRESHOLD, VAULT_INSIGHTS_DIR,
};
use crate::atoms::error::EngineResult;
use crate::atoms::types::{ImportanceTag, Insight, InsightKind, Role};
use crate::engine::memory::importance::content_words;
use crate::engine::providers::AnyBackend;
use crate::engine::store::MemoryStore;
use crate::engine::vault::VaultSync;

pub struct InsightGenerator {
    lookback_days: i64,
    topic_threshold: usize,
    affect_run_days: usize,
}

impl InsightGenerator {
    pub fn new() -> Self {
        InsightGenerator {
            lookback_days: INSIGHT_LOOKBACK_DAYS,
            topic_threshold: INSIGHT_TOPIC_THRESHOLD,
            affect_run_days: INSIGHT_AFFECT_RUN_DAYS,
        }
    }

    /// Deterministic local scan of the recent window. No network, no vault.
    pub fn scan(&self, store: &MemoryStore) -> EngineResult<Vec<Insight>> {
        let cutoff = Utc::now() - chrono::Duration::days(self.lookback_days);
        let entries = store.entries_since(cutoff)?;
        let mut insights = Vec::new();

        // ── Signal 1: recurring topics ─────────────────────────────────
        let mut counts: HashMap<String, usize> = HashMap::new();
        for entry in entries.iter().filter(|e| e.role == Role::User) {
            let lower = entry.text.to_lowercase();
            for word in content_words(&lower) {
                *counts.entry(word.to_string()).or_default() += 1;
            }
        }
        let mut frequent: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(_, count)| *count >= self.topic_threshold)
            .collect();
        frequent.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        if frequent.len() >= 2 {
            let (first, first_n) = &frequent[0];
            let (second, second_n) = &frequent[1];
            insights.push(Insight {
                kind: InsightKind::Suggestion,
                text: format!(
                    "You've mentioned {} {} times and {} {} times recently — \
                     worth connecting the two?",
                    first, first_n, second, second_n
                ),
                topics: vec![first.clone(), second.clone()],
                created_at: Utc::now(),
            });
        }

        // ── Signal 2: negative-affect run across consecutive days ──────
        let mut affect_days: Vec<NaiveDate> = entries
            .iter()
            .filter(|e| e.tags.contains(&ImportanceTag::NegativeAffect))
            .map(|e| e.created_at.date_naive())
            .collect();
        affect_days.sort_unstable();
        affect_days.dedup();

        if longest_consecutive_run(&affect_days) >= self.affect_run_days {
            insights.push(Insight {
                kind: InsightKind::Reflection,
                text: format!(
                    "The last {} days have carried a stressed tone. Would it help \
                     to step back and talk through what's weighing on you?",
                    self.affect_run_days
                ),
                topics: Vec::new(),
                created_at: Utc::now(),
            });
        }

        Ok(insights)
    }

    /// Full pass: scan, optionally let the backend rephrase, persist to the
    /// vault. Every failure past the scan degrades to the local result.
    pub async fn generate(
        &self,
        store: &MemoryStore,
        backend: Option<&AnyBackend>,
        vault: Option<&VaultSync>,
    ) -> Vec<Insight> {
        let mut insights = match self.scan(store) {
            Ok(insights) => insights,
            Err(e) => {
                warn!("[insights] scan failed: {}", e);
                return Vec::new();
            }
        };
        if insights.is_empty() {
            return insights;
        }

        if let Some(backend) = backend {
            for insight in insights.iter_mut() {
                let prompt = format!(
                    "Rephrase this observation as one brief, friendly, non-intrusive \
                     sentence. Keep the facts, drop nothing:\n\n{}",
                    insight.text
                );
                match backend
                    .complete(
                        "You are a helpful assistant that writes brief, contextual \
                         suggestions based on a user's conversation history.",
                        &prompt,
                    )
                    .await
                {
                    Ok(polished) if !polished.trim().is_empty() => {
                        insight.text = polished.trim().to_string();
                    }
                    Ok(_) => {}
                    Err(e) => warn!("[insights] rephrase skipped: {}", e),
                }
            }
        }

        if let Some(vault) = vault {
            for insight in &insights {
                // Kind in the filename keeps a suggestion and a reflection
                // generated in the same second from colliding.
                let label = match insight.kind {
                    InsightKind::Suggestion => "Suggestion",
                    InsightKind::Reflection => "Reflection",
                };
                let path = format!(
                    "{}/{}_{}.md",
                    VAULT_INSIGHTS_DIR,
                    label,
                    insight.created_at.format("%Y%m%d_%H%M%S")
                );
                let content = format!(
                    "# Insight: {}\n\n{}\n\nTags: #insight #generated\n",
                    insight.created_at.format("%Y-%m-%d %H:%M:%S"),
                    insight.text
                );
                if let Err(e) = vault.create_note(&path, &content).await {
                    warn!("[insights] could not persist {}: {}", path, e);
                }
            }
        }

        info!("[insights] {} insight(s) generated", insights.len());
        insights
    }

    /// Session-start greeting: yesterday's weightiest user line, if any.
    pub fn welcome_message(&self, store: &MemoryStore) -> EngineResult<String> {
        let cutoff = Utc::now() - chrono::Duration::days(1);
        let recent = store.entries_since(cutoff)?;
        let quote = recent
            .iter()
            .filter(|e| e.role == Role::User)
            .max_by(|a, b| {
                a.importance
                    .partial_cmp(&b.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|e| e.text.clone());

        Ok(match quote {
            Some(quote) => {
                let short = if quote.len() > 120 {
                    let mut end = 120;
                    while end > 0 && !quote.is_char_boundary(end) {
                        end -= 1;
                    }
                    format!("{}…", &quote[..end])
                } else {
                    quote
                };
                format!("Welcome back.\n— Yesterday you said: \"{}\"", short)
            }
            None => "Welcome back.".to_string(),
        })
    }
}

impl Default for InsightGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Length of the longest run of consecutive dates (input sorted, deduped).
fn longest_consecutive_run(days: &[NaiveDate]) -> usize {
    let mut best = 0usize;
    let mut run = 0usize;
    let mut prev: Option<NaiveDate> = None;
    for &day in days {
        run = match prev {
            Some(p) if day == p + chrono::Duration::days(1) => run + 1,
            _ => 1,
        };
        best = best.max(run);
        prev = Some(day);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::MemoryEntry;

    fn seeded_store(texts: &[&str]) -> MemoryStore {
        let store = MemoryStore::open_in_memory().unwrap();
        for text in texts {
            store.add(&MemoryEntry::new(*text, Role::User)).unwrap();
        }
        store
    }

    #[test]
    fn recurring_topics_produce_a_suggestion() {
        let store = seeded_store(&[
            "thinking about the alaska trip",
            "alaska flights are expensive",
            "need to budget for alaska",
            "the budget spreadsheet is ready",
            "reviewing the budget again",
            "one more budget question",
        ]);
        let insights = InsightGenerator::new().scan(&store).unwrap();
        let suggestion = insights.iter().find(|i| i.kind == InsightKind::Suggestion).unwrap();
        assert!(suggestion.topics.contains(&"alaska".to_string()));
        assert!(suggestion.topics.contains(&"budget".to_string()));
    }

    #[test]
    fn one_topic_alone_is_not_enough() {
        let store = seeded_store(&[
            "alaska plans",
            "alaska flights",
            "alaska hotels",
        ]);
        let insights = InsightGenerator::new().scan(&store).unwrap();
        assert!(insights.iter().all(|i| i.kind != InsightKind::Suggestion));
    }

    #[test]
    fn negative_affect_run_produces_a_reflection() {
        let store = MemoryStore::open_in_memory().unwrap();
        for days_ago in 1..=3 {
            let mut entry = MemoryEntry::new("feeling stressed about work", Role::User);
            entry.tags = vec![ImportanceTag::NegativeAffect];
            entry.created_at = Utc::now() - chrono::Duration::days(days_ago);
            store.add(&entry).unwrap();
        }
        let insights = InsightGenerator::new().scan(&store).unwrap();
        assert!(insights.iter().any(|i| i.kind == InsightKind::Reflection));
    }

    #[test]
    fn scattered_affect_days_do_not_trigger() {
        let store = MemoryStore::open_in_memory().unwrap();
        for days_ago in [1, 3, 5] {
            let mut entry = MemoryEntry::new("rough day", Role::User);
            entry.tags = vec![ImportanceTag::NegativeAffect];
            entry.created_at = Utc::now() - chrono::Duration::days(days_ago);
            store.add(&entry).unwrap();
        }
        let insights = InsightGenerator::new().scan(&store).unwrap();
        assert!(insights.iter().all(|i| i.kind != InsightKind::Reflection));
    }

    #[test]
    fn consecutive_run_math() {
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        assert_eq!(longest_consecutive_run(&[]), 0);
        assert_eq!(longest_consecutive_run(&[d("2026-08-01")]), 1);
        assert_eq!(
            longest_consecutive_run(&[d("2026-08-01"), d("2026-08-02"), d("2026-08-04")]),
            2
        );
    }

    #[test]
    fn welcome_quotes_the_weightiest_user_line() {
        let store = MemoryStore::open_in_memory().unwrap();
        let mut minor = MemoryEntry::new("bought some milk", Role::User);
        minor.importance = 0.2;
        let mut major = MemoryEntry::new("Remember to check the storage payment", Role::User);
        major.importance = 0.9;
        store.add(&minor).unwrap();
        store.add(&major).unwrap();

        let message = InsightGenerator::new().welcome_message(&store).unwrap();
        assert!(message.contains("storage payment"));
    }

    #[test]
    fn welcome_without_history_is_plain() {
        let store = MemoryStore::open_in_memory().unwrap();
        assert_eq!(InsightGenerator::new().welcome_message(&store).unwrap(), "Welcome back.");
    }

    #[tokio::test]
    async fn generate_persists_to_the_vault() {
        let dir = tempfile::tempdir().unwrap();
        let vault = VaultSync::filesystem(dir.path().to_str().unwrap()).unwrap();
        let store = seeded_store(&[
            "alaska trip planning",
            "alaska flights priced",
            "alaska packing list",
            "budget review first pass",
            "budget review second pass",
            "budget numbers final",
        ]);

        let insights = InsightGenerator::new().generate(&store, None, Some(&vault)).await;
        assert!(!insights.is_empty());

        let notes = vault.list_notes().await.unwrap();
        assert!(notes.iter().any(|n| n.path.starts_with(VAULT_INSIGHTS_DIR)));
    }
}
