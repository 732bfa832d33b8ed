// Mnemo Engine — Filesystem Vault Transport
//
// Reads and writes markdown files directly under the vault root, with the
// same path semantics as the API transport. Writes are all-or-nothing:
// content goes to a temp file in the target directory which is then renamed
// into place, so a failed write never leaves a half-written note.

use async_trait::async_trait;
use log::{debug, warn};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::traits::VaultTransport;
use crate::atoms::types::{NoteMatch, NoteSummary, TransportKind, VaultNote};
use crate::engine::vault::note_from_content;

pub struct FsTransport {
    root: PathBuf,
}

impl FsTransport {
    /// Open the vault root, creating it if absent.
    pub fn new(root: impl Into<PathBuf>) -> EngineResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(FsTransport { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a vault-relative path, rejecting escapes.
    fn resolve(&self, path: &str) -> EngineResult<PathBuf> {
        let rel = Path::new(path);
        if rel.is_absolute()
            || rel.components().any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(EngineError::Config(format!("invalid vault path: {}", path)));
        }
        Ok(self.root.join(rel))
    }

    /// Atomic write: temp file beside the target, then rename into place.
    fn write_atomic(&self, path: &str, content: &str) -> EngineResult<()> {
        let target = self.resolve(path)?;
        let dir = target
            .parent()
            .ok_or_else(|| EngineError::Config(format!("invalid vault path: {}", path)))?;
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(&target).map_err(|e| EngineError::Io(e.error))?;
        debug!("[vault] wrote {} ({} bytes)", path, content.len());
        Ok(())
    }

    fn collect_notes(&self, dir: &Path, out: &mut Vec<NoteSummary>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("[vault] cannot read {}: {}", dir.display(), e);
                return;
            }
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue; // .obsidian and friends
            }
            if path.is_dir() {
                self.collect_notes(&path, out);
            } else if name.ends_with(".md") {
                let rel = path
                    .strip_prefix(&self.root)
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .unwrap_or(name);
                let modified = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .ok()
                    .map(chrono::DateTime::<chrono::Utc>::from);
                out.push(NoteSummary { path: rel, modified });
            }
        }
    }
}

#[async_trait]
impl VaultTransport for FsTransport {
    async fn list_notes(&self) -> EngineResult<Vec<NoteSummary>> {
        let mut notes = Vec::new();
        self.collect_notes(&self.root, &mut notes);
        notes.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(notes)
    }

    async fn get_note(&self, path: &str) -> EngineResult<Option<VaultNote>> {
        let target = self.resolve(path)?;
        let modified = std::fs::metadata(&target)
            .and_then(|m| m.modified())
            .ok()
            .map(chrono::DateTime::<chrono::Utc>::from);
        match std::fs::read_to_string(&target) {
            Ok(content) => Ok(Some(note_from_content(path, content, modified))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                Err(EngineError::malformed(path, "not valid UTF-8"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create_note(&self, path: &str, content: &str) -> EngineResult<()> {
        self.write_atomic(path, content)
    }

    async fn update_note(&self, path: &str, content: &str) -> EngineResult<()> {
        self.write_atomic(path, content)
    }

    async fn search_notes(&self, query: &str) -> EngineResult<Vec<NoteMatch>> {
        let needle = query.to_lowercase();
        let mut matches = Vec::new();
        for summary in self.list_notes().await? {
            let note = match self.get_note(&summary.path).await {
                Ok(Some(note)) => note,
                Ok(None) => continue,
                Err(EngineError::MalformedNote { path, message }) => {
                    warn!("[vault] skipping malformed note {}: {}", path, message);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if let Some(line) = note
                .content
                .lines()
                .find(|line| line.to_lowercase().contains(&needle))
            {
                matches.push(NoteMatch {
                    path: summary.path,
                    snippet: snippet_of(line),
                });
            }
        }
        Ok(matches)
    }

    async fn rename_note(&self, from: &str, to: &str) -> EngineResult<()> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;
        if let Some(dir) = dst.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::rename(&src, &dst)?;
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Filesystem
    }
}

fn snippet_of(line: &str) -> String {
    let line = line.trim();
    if line.len() <= 150 {
        line.to_string()
    } else {
        let mut end = 150;
        while end > 0 && !line.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &line[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> (tempfile::TempDir, FsTransport) {
        let dir = tempfile::tempdir().unwrap();
        let fs = FsTransport::new(dir.path()).unwrap();
        (dir, fs)
    }

    #[tokio::test]
    async fn create_then_get_roundtrip() {
        let (_dir, fs) = transport();
        fs.create_note("mnemo/Trip.md", "# Trip\n\nColorado plans").await.unwrap();
        let note = fs.get_note("mnemo/Trip.md").await.unwrap().unwrap();
        assert_eq!(note.content, "# Trip\n\nColorado plans");
        assert_eq!(note.path, "mnemo/Trip.md");
    }

    #[tokio::test]
    async fn missing_note_is_none() {
        let (_dir, fs) = transport();
        assert!(fs.get_note("nope.md").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn path_escapes_are_rejected() {
        let (_dir, fs) = transport();
        assert!(fs.get_note("../outside.md").await.is_err());
        assert!(fs.create_note("/etc/owned.md", "x").await.is_err());
    }

    #[tokio::test]
    async fn list_walks_subdirectories_and_skips_hidden() {
        let (_dir, fs) = transport();
        fs.create_note("a.md", "alpha").await.unwrap();
        fs.create_note("sub/b.md", "beta").await.unwrap();
        std::fs::create_dir_all(fs.root().join(".obsidian")).unwrap();
        std::fs::write(fs.root().join(".obsidian/app.md"), "config").unwrap();

        let paths: Vec<String> = fs.list_notes().await.unwrap().into_iter().map(|n| n.path).collect();
        assert_eq!(paths, vec!["a.md", "sub/b.md"]);
    }

    #[tokio::test]
    async fn search_returns_matching_snippet() {
        let (_dir, fs) = transport();
        fs.create_note("notes/colorado.md", "First line\nHiking in Colorado is great\n")
            .await
            .unwrap();
        fs.create_note("notes/other.md", "nothing relevant").await.unwrap();

        let hits = fs.search_notes("colorado").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "notes/colorado.md");
        assert!(hits[0].snippet.contains("Hiking"));
    }

    #[tokio::test]
    async fn rename_moves_content() {
        let (_dir, fs) = transport();
        fs.create_note("old.md", "body").await.unwrap();
        fs.rename_note("old.md", "new/renamed.md").await.unwrap();
        assert!(fs.get_note("old.md").await.unwrap().is_none());
        assert_eq!(fs.get_note("new/renamed.md").await.unwrap().unwrap().content, "body");
    }

    #[tokio::test]
    async fn update_overwrites_whole_note() {
        let (_dir, fs) = transport();
        fs.create_note("n.md", "v1").await.unwrap();
        fs.update_note("n.md", "v2").await.unwrap();
        assert_eq!(fs.get_note("n.md").await.unwrap().unwrap().content, "v2");
    }
}
