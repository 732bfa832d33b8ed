// Mnemo Engine — Concept Index & Auto-Linker
//
// Concepts are note titles; the linker rewrites generated text so the first
// occurrence of each known concept becomes a wiki-style cross-reference.
// Matching is case-insensitive and longest-first; running the linker twice
// never double-wraps a reference.

use std::collections::HashMap;

/// Case-normalized concept name → note path. Rebuilt in bulk at startup and
/// incrementally by the vault watcher. Last writer wins on collision.
#[derive(Debug, Default, Clone)]
pub struct ConceptIndex {
    by_key: HashMap<String, Concept>,
}

#[derive(Debug, Clone)]
struct Concept {
    display: String,
    path: String,
}

impl ConceptIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a concept under its note title. Case-normalized; a later
    /// insert with the same normalized name replaces the earlier one.
    pub fn insert(&mut self, title: &str, path: &str) {
        let title = title.trim();
        if title.is_empty() {
            return;
        }
        self.by_key.insert(
            title.to_lowercase(),
            Concept { display: title.to_string(), path: path.to_string() },
        );
    }

    /// Derive the concept from a note path's file stem and register it.
    pub fn insert_path(&mut self, path: &str) {
        if let Some(title) = title_from_path(path) {
            self.insert(&title, path);
        }
    }

    /// Drop every concept that points at `path`.
    pub fn remove_path(&mut self, path: &str) {
        self.by_key.retain(|_, c| c.path != path);
    }

    pub fn note_path(&self, concept: &str) -> Option<&str> {
        self.by_key.get(&concept.to_lowercase()).map(|c| c.path.as_str())
    }

    pub fn contains(&self, concept: &str) -> bool {
        self.by_key.contains_key(&concept.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    fn concepts_longest_first(&self) -> Vec<&Concept> {
        let mut concepts: Vec<&Concept> = self.by_key.values().collect();
        // Longest first so "New York" wins over "York"; name as the
        // tie-break keeps the scan order deterministic.
        concepts.sort_by(|a, b| {
            b.display.len().cmp(&a.display.len()).then_with(|| a.display.cmp(&b.display))
        });
        concepts
    }
}

/// Note title = file stem of the vault-relative path.
pub fn title_from_path(path: &str) -> Option<String> {
    let name = path.rsplit('/').next()?;
    let stem = name.strip_suffix(".md").unwrap_or(name);
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

// ── Linkify ────────────────────────────────────────────────────────────────

/// Wrap the first occurrence of each known concept in `[[…]]`.
///
/// Rules:
///   • longest-match-first, case-insensitive, word-boundary anchored;
///   • one link per concept per text;
///   • occurrences inside an existing `[[…]]` span are skipped, so the
///     function is idempotent;
///   • a concept already linked anywhere in the text is not linked again.
pub fn linkify(text: &str, index: &ConceptIndex) -> String {
    if text.is_empty() || index.is_empty() {
        return text.to_string();
    }

    let lower = text.to_lowercase();
    // Case folding that changes byte length breaks offset math; those texts
    // pass through case-sensitively instead of corrupting output.
    let fold = lower.len() == text.len();
    let haystack: &str = if fold { &lower } else { text };

    let mut occupied: Vec<(usize, usize)> = existing_link_spans(text);
    let mut replacements: Vec<(usize, usize)> = Vec::new();

    for concept in index.concepts_longest_first() {
        let needle_owned =
            if fold { concept.display.to_lowercase() } else { concept.display.clone() };
        let needle = needle_owned.as_str();
        if needle.is_empty() || needle.len() > haystack.len() {
            continue;
        }

        if already_linked(text, &occupied, needle, haystack) {
            continue;
        }

        let mut from = 0usize;
        while let Some(rel) = haystack[from..].find(needle) {
            let start = from + rel;
            let end = start + needle.len();
            let overlaps = occupied.iter().any(|&(s, e)| start < e && end > s);
            if !overlaps && on_word_boundary(text, start, end) {
                replacements.push((start, end));
                occupied.push((start, end));
                break; // first occurrence only
            }
            from = start + needle.len().max(1);
            while from < haystack.len() && !haystack.is_char_boundary(from) {
                from += 1;
            }
        }
    }

    if replacements.is_empty() {
        return text.to_string();
    }

    replacements.sort_by_key(|&(start, _)| std::cmp::Reverse(start));
    let mut out = text.to_string();
    for (start, end) in replacements {
        out.replace_range(start..end, &format!("[[{}]]", &text[start..end]));
    }
    out
}

/// Byte spans of every existing `[[…]]` link, including the brackets.
fn existing_link_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut from = 0usize;
    while let Some(rel) = text[from..].find("[[") {
        let start = from + rel;
        match text[start..].find("]]") {
            Some(close_rel) => {
                let end = start + close_rel + 2;
                spans.push((start, end));
                from = end;
            }
            None => break,
        }
    }
    spans
}

/// True when a concept occurrence is already wrapped somewhere in the text.
fn already_linked(text: &str, occupied: &[(usize, usize)], needle: &str, haystack: &str) -> bool {
    let mut from = 0usize;
    while let Some(rel) = haystack[from..].find(needle) {
        let start = from + rel;
        let end = start + needle.len();
        if occupied
            .iter()
            .any(|&(s, e)| start >= s && end <= e && text[s..].starts_with("[["))
        {
            return true;
        }
        from = end.max(from + 1);
        while from < haystack.len() && !haystack.is_char_boundary(from) {
            from += 1;
        }
    }
    false
}

fn on_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before_ok = start == 0
        || text[..start]
            .chars()
            .next_back()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
    let after_ok = end >= text.len()
        || text[end..]
            .chars()
            .next()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
    before_ok && after_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(titles: &[&str]) -> ConceptIndex {
        let mut index = ConceptIndex::new();
        for title in titles {
            index.insert(title, &format!("mnemo/{}.md", title));
        }
        index
    }

    #[test]
    fn links_first_occurrence_only() {
        let index = index_of(&["Colorado"]);
        let out = linkify("Colorado is great. I love Colorado.", &index);
        assert_eq!(out, "[[Colorado]] is great. I love Colorado.");
    }

    #[test]
    fn linkify_is_idempotent() {
        let index = index_of(&["Colorado", "Machine Learning"]);
        let once = linkify("Colorado and Machine Learning notes", &index);
        let twice = linkify(&once, &index);
        assert_eq!(once, twice);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let index = index_of(&["Colorado"]);
        let out = linkify("thinking about colorado today", &index);
        assert_eq!(out, "thinking about [[colorado]] today");
    }

    #[test]
    fn longest_match_wins() {
        let index = index_of(&["New York", "York"]);
        let out = linkify("Flying to New York tomorrow", &index);
        assert_eq!(out, "Flying to [[New York]] tomorrow");
    }

    #[test]
    fn substring_of_linked_span_is_skipped() {
        let index = index_of(&["York"]);
        let out = linkify("Visited [[New York]] last week", &index);
        assert_eq!(out, "Visited [[New York]] last week");
    }

    #[test]
    fn word_boundaries_prevent_partial_matches() {
        let index = index_of(&["Art"]);
        let out = linkify("Start of the Artful story about Art", &index);
        assert_eq!(out, "Start of the Artful story about [[Art]]");
    }

    #[test]
    fn last_writer_wins_on_collision() {
        let mut index = ConceptIndex::new();
        index.insert("Trip", "mnemo/old.md");
        index.insert("trip", "mnemo/new.md");
        assert_eq!(index.len(), 1);
        assert_eq!(index.note_path("TRIP"), Some("mnemo/new.md"));
    }

    #[test]
    fn title_comes_from_file_stem() {
        assert_eq!(title_from_path("mnemo/Daily Notes/2026-08-04.md").unwrap(), "2026-08-04");
        assert_eq!(title_from_path("Colorado.md").unwrap(), "Colorado");
        assert!(title_from_path(".md").is_none());
    }

    #[test]
    fn remove_path_drops_concepts() {
        let mut index = index_of(&["Colorado"]);
        index.remove_path("mnemo/Colorado.md");
        assert!(index.is_empty());
    }
}
