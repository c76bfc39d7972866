//! Final document assembly from chapter artifacts.

use crate::checkpoint::{ChapterArtifact, CheckpointStore};
use crate::docx::DocxBuilder;
use crate::error::PersistenceError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Top heading when the book has no title metadata.
pub const DEFAULT_BOOK_TITLE: &str = "Translated book";

/// Build the output document from every completed chapter's artifact,
/// in chapter order. Returns the number of chapters written.
///
/// Fails with [`PersistenceError::MissingArtifact`] rather than leaving a
/// translated chapter out of the book.
pub fn assemble(
    store: &CheckpointStore,
    book_title: Option<&str>,
    output: &Path,
) -> Result<usize, PersistenceError> {
    let completed = store.completed();
    let mut present: BTreeMap<usize, PathBuf> = BTreeMap::new();
    for (index, path) in store.artifacts()? {
        if completed.contains(index) && !completed.is_empty_chapter(index) {
            present.insert(index, path);
        } else {
            debug!(index, path = %path.display(), "Ignoring artifact of uncompleted chapter");
        }
    }

    if let Some(index) = completed.translated().find(|i| !present.contains_key(i)) {
        return Err(PersistenceError::MissingArtifact { index });
    }

    let title = book_title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_BOOK_TITLE);
    let mut document = DocxBuilder::new(title);

    for path in present.values() {
        let content =
            std::fs::read_to_string(path).map_err(|e| PersistenceError::io(path, e))?;
        let artifact = ChapterArtifact::parse(&content);
        if artifact.text.trim().is_empty() {
            warn!(path = %path.display(), "Artifact has an empty body");
        }

        document
            .heading(&artifact.title)
            .paragraph(&artifact.text)
            .page_break();
    }

    document.save(output)?;
    Ok(present.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::read_zip_entry;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> CheckpointStore {
        CheckpointStore::open(&dir.path().join("book.json"), &dir.path().join("book")).unwrap()
    }

    fn artifact(title: &str, text: &str) -> ChapterArtifact {
        ChapterArtifact {
            title: title.to_string(),
            text: text.to_string(),
        }
    }

    fn heading_order(xml: &str, titles: &[&str]) -> Vec<usize> {
        titles
            .iter()
            .map(|t| {
                xml.find(&format!(r#"<w:t xml:space="preserve">{}</w:t>"#, t))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_headings_follow_chapter_order() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        // Arrival order differs from chapter order.
        store.record_translated(2, &artifact("C", "third")).unwrap();
        store.record_translated(0, &artifact("A", "first")).unwrap();
        store.record_translated(1, &artifact("B", "second")).unwrap();

        let output = dir.path().join("out.docx");
        assert_eq!(assemble(&store, Some("Book"), &output).unwrap(), 3);

        let xml = read_zip_entry(&output, "word/document.xml");
        let positions = heading_order(&xml, &["Book", "A", "B", "C"]);
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", positions);
        assert_eq!(xml.matches(r#"<w:br w:type="page"/>"#).count(), 3);
    }

    #[test]
    fn test_default_title_and_empty_chapters() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.record_translated(0, &artifact("Only", "text")).unwrap();
        store.record_empty(1).unwrap();

        let output = dir.path().join("out.docx");
        assert_eq!(assemble(&store, None, &output).unwrap(), 1);

        let xml = read_zip_entry(&output, "word/document.xml");
        assert!(xml.contains(DEFAULT_BOOK_TITLE));
    }

    #[test]
    fn test_missing_artifact_is_error() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.record_translated(0, &artifact("A", "a")).unwrap();
        store.record_translated(1, &artifact("B", "b")).unwrap();
        std::fs::remove_file(store.artifact_path(1)).unwrap();

        let output = dir.path().join("out.docx");
        let err = assemble(&store, None, &output).unwrap_err();
        assert!(matches!(err, PersistenceError::MissingArtifact { index: 1 }));
        assert!(!output.exists());
    }

    #[test]
    fn test_stray_artifacts_ignored() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.record_translated(0, &artifact("Kept", "a")).unwrap();
        std::fs::write(store.artifact_path(5), "# Stray\nleftover").unwrap();

        let output = dir.path().join("out.docx");
        assert_eq!(assemble(&store, None, &output).unwrap(), 1);
        assert!(!read_zip_entry(&output, "word/document.xml").contains("Stray"));
    }
}
