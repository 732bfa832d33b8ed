// Mnemo Engine — Importance Extractor
//
// Heuristic significance scoring for memory entries. Pure function of the
// text and a snapshot of the recent window — no hidden state, so identical
// input always produces identical output.
//
// Signals:
//   1. First-person personal facts (name, home, job)
//   2. Preference statements
//   3. Explicit instructions / emphasis markers
//   4. Date-bound phrases (deadlines, scheduled events)
//   5. Negative-affect markers (feeds the reflective-prompt pipeline)
//   6. Topic recurrence within the recent window

use regex::Regex;
use std::sync::OnceLock;

use crate::atoms::constants::RECURRENCE_MIN_ENTRIES;
use crate::atoms::types::ImportanceTag;

// ── Marker lexicons ────────────────────────────────────────────────────────

/// First-person fact patterns → PersonalFact.
const PERSONAL_MARKERS: &[&str] = &[
    "my name is",
    "call me",
    "i live in",
    "i live at",
    "i'm from",
    "i am from",
    "i work at",
    "i work as",
    "my job",
    "my birthday",
    "my wife",
    "my husband",
    "my partner",
    "my kids",
    "my dog",
    "my cat",
];

/// Expressed likes/dislikes → Preference.
const PREFERENCE_MARKERS: &[&str] = &[
    "i like",
    "i love",
    "i prefer",
    "i enjoy",
    "i hate",
    "i can't stand",
    "my favorite",
    "my favourite",
    "i use",
    "i always use",
];

/// Explicit instructions → Instruction.
const INSTRUCTION_MARKERS: &[&str] = &[
    "remember that",
    "remember to",
    "don't forget",
    "make sure to",
    "keep in mind",
    "always ",
    "never ",
];

/// Date-bound phrases → DateBound.
const DATE_MARKERS: &[&str] = &[
    "tomorrow",
    "tonight",
    "next week",
    "next month",
    "this weekend",
    "deadline",
    "due on",
    "due by",
    "appointment",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
    "january",
    "february",
    "march",
    "april",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Frustration / negative-affect markers → NegativeAffect.
const NEGATIVE_MARKERS: &[&str] = &[
    "frustrated",
    "frustrating",
    "stressed",
    "stressful",
    "anxious",
    "worried",
    "overwhelmed",
    "exhausted",
    "tired of",
    "sick of",
    "annoyed",
    "annoying",
    "angry",
    "upset",
    "terrible",
    "awful",
    "hate",
    "miserable",
    "struggling",
    "can't sleep",
    "burned out",
    "burnt out",
];

/// Filler words excluded from recurrence counting.
const STOPWORDS: &[&str] = &[
    "the", "and", "that", "this", "with", "from", "have", "has", "had", "was", "were", "will",
    "would", "could", "should", "about", "just", "like", "what", "when", "where", "your", "you",
    "they", "them", "then", "than", "there", "here", "been", "being", "very", "really", "some",
    "more", "most", "also", "into", "over", "because", "want", "need", "know", "think", "going",
];

fn iso_date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Static pattern; compilation cannot fail at runtime.
    RE.get_or_init(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("static regex"))
}

// ── Scoring ────────────────────────────────────────────────────────────────

/// Score a span of text for importance.
///
/// `recent_window` is a snapshot of recent entry texts used only for the
/// recurrence signal. Returns a score clamped to [0,1] and the matched tags.
pub fn score(text: &str, recent_window: &[&str]) -> (f32, Vec<ImportanceTag>) {
    let lower = text.to_lowercase();
    let mut tags = Vec::new();
    let mut score = 0.2f32; // everything remembered starts slightly above zero

    if contains_any(&lower, PERSONAL_MARKERS) {
        tags.push(ImportanceTag::PersonalFact);
        score += 0.25;
    }
    if contains_any(&lower, PREFERENCE_MARKERS) {
        tags.push(ImportanceTag::Preference);
        score += 0.2;
    }
    if contains_any(&lower, INSTRUCTION_MARKERS) {
        tags.push(ImportanceTag::Instruction);
        score += 0.25;
    }
    if contains_any(&lower, DATE_MARKERS) || iso_date_pattern().is_match(text) {
        tags.push(ImportanceTag::DateBound);
        score += 0.15;
    }
    if contains_any(&lower, NEGATIVE_MARKERS) {
        tags.push(ImportanceTag::NegativeAffect);
        score += 0.1;
    }

    // Emphasis: exclamation marks and shouted words nudge the score without
    // earning a tag of their own.
    let exclamations = text.chars().filter(|c| *c == '!').count();
    let caps_words = text
        .split_whitespace()
        .filter(|w| w.len() > 2 && w.chars().all(|c| !c.is_lowercase()) && w.chars().any(|c| c.is_alphabetic()))
        .count();
    if exclamations > 0 || caps_words > 0 {
        score += 0.05 * ((exclamations + caps_words).min(2)) as f32;
    }

    if recurs_in_window(&lower, recent_window) {
        tags.push(ImportanceTag::Recurring);
        score += 0.15;
    }

    (score.clamp(0.0, 1.0), tags)
}

fn contains_any(haystack: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| haystack.contains(m))
}

/// True when a content word of `lower` appears in at least
/// RECURRENCE_MIN_ENTRIES of the recent-window entries.
fn recurs_in_window(lower: &str, window: &[&str]) -> bool {
    if window.len() < RECURRENCE_MIN_ENTRIES {
        return false;
    }
    for word in content_words(lower) {
        let hits = window
            .iter()
            .filter(|entry| entry.to_lowercase().contains(word))
            .count();
        if hits >= RECURRENCE_MIN_ENTRIES {
            return true;
        }
    }
    false
}

/// Words long enough to carry topic signal, minus stopwords.
/// Shared with the insight generator's topic-frequency scan.
pub(crate) fn content_words(lower: &str) -> impl Iterator<Item = &str> {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3 && !STOPWORDS.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn personal_fact_is_tagged() {
        let (score, tags) = score_of("My name is Chris and I live in Dallas.");
        assert!(tags.contains(&ImportanceTag::PersonalFact));
        assert!(score > 0.4);
    }

    #[test]
    fn preference_is_tagged() {
        let (_, tags) = score_of("I love hiking in Colorado");
        assert!(tags.contains(&ImportanceTag::Preference));
    }

    #[test]
    fn instruction_is_tagged() {
        let (score, tags) = score_of("Remember that the server restarts at midnight");
        assert!(tags.contains(&ImportanceTag::Instruction));
        assert!(score > 0.4);
    }

    #[test]
    fn iso_date_is_date_bound() {
        let (_, tags) = score_of("The report is expected 2026-09-01");
        assert!(tags.contains(&ImportanceTag::DateBound));
    }

    #[test]
    fn negative_affect_is_tagged() {
        let (_, tags) = score_of("I'm so frustrated with this project");
        assert!(tags.contains(&ImportanceTag::NegativeAffect));
    }

    #[test]
    fn plain_text_scores_low_with_no_tags() {
        let (score, tags) = score_of("the weather changed a bit");
        assert!(tags.is_empty());
        assert!(score < 0.3);
    }

    #[test]
    fn score_is_clamped_to_unit_interval() {
        let loaded = "Remember that my name is Chris, I love hiking, deadline tomorrow, \
                      I'm frustrated!! IMPORTANT";
        let window = ["hiking trip", "hiking boots", "more hiking plans"];
        let (score, _) = score(loaded, &window);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn recurrence_needs_enough_window_hits() {
        let window = ["we talked about hiking", "hiking again", "hiking boots arrived"];
        let (_, tags) = score("planning another hiking trip", &window);
        assert!(tags.contains(&ImportanceTag::Recurring));

        let thin_window = ["we talked about hiking"];
        let (_, tags) = score("planning another hiking trip", &thin_window);
        assert!(!tags.contains(&ImportanceTag::Recurring));
    }

    #[test]
    fn deterministic_given_same_input() {
        let window = ["alpha beta", "beta gamma", "gamma delta"];
        let a = score("I love beta testing", &window);
        let b = score("I love beta testing", &window);
        assert_eq!(a, b);
    }

    fn score_of(text: &str) -> (f32, Vec<ImportanceTag>) {
        score(text, &[])
    }
}
