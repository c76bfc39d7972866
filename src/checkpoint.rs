//! Per-project translation progress.
//!
//! The completed-chapter list lives inside the project record so a later
//! run (or another process) can resume where this one stopped. Translated
//! chapters are kept as artifact files in the project's `temp` directory
//! until the final document is assembled.

use crate::error::PersistenceError;
use crate::utils::write_atomic;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Name of the artifact directory inside a project's working directory.
pub const ARTIFACT_DIR: &str = "temp";

const COMPLETED_FIELD: &str = "completed_chapters";
const EMPTY_FIELD: &str = "empty_chapters";
const ARTIFACT_PREFIX: &str = "chapter_";
const ARTIFACT_SUFFIX: &str = ".txt";
const HEADING_PREFIX: &str = "# ";

/// Chapters already handled for a project.
///
/// Every completed index that is not also listed as empty has an artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletedSet {
    completed: Vec<usize>,
    empty: Vec<usize>,
}

impl CompletedSet {
    pub fn contains(&self, index: usize) -> bool {
        self.completed.contains(&index)
    }

    /// True if the chapter was completed without producing an artifact.
    pub fn is_empty_chapter(&self, index: usize) -> bool {
        self.empty.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// Completed indices in the order they were recorded.
    pub fn indices(&self) -> &[usize] {
        &self.completed
    }

    /// Completed indices that must have an artifact.
    pub fn translated(&self) -> impl Iterator<Item = usize> + '_ {
        self.completed
            .iter()
            .copied()
            .filter(|index| !self.empty.contains(index))
    }

    fn with(&self, index: usize, empty: bool) -> Self {
        let mut next = self.clone();
        if !next.completed.contains(&index) {
            next.completed.push(index);
        }
        if empty && !next.empty.contains(&index) {
            next.empty.push(index);
        }
        if !empty {
            next.empty.retain(|&i| i != index);
        }
        next
    }
}

/// A translated chapter as stored between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterArtifact {
    pub title: String,
    pub text: String,
}

impl ChapterArtifact {
    /// File contents: one heading line, then the body.
    pub fn render(&self) -> String {
        let title = self.title.replace(['\r', '\n'], " ");
        format!("{}{}\n{}", HEADING_PREFIX, title, self.text)
    }

    pub fn parse(contents: &str) -> Self {
        let (heading, body) = contents.split_once('\n').unwrap_or((contents, ""));
        let title = heading
            .strip_prefix(HEADING_PREFIX)
            .unwrap_or(heading)
            .trim_end_matches('\r')
            .to_string();

        Self {
            title,
            text: body.to_string(),
        }
    }
}

/// Artifact file name for a chapter index.
pub fn artifact_file_name(index: usize) -> String {
    format!("{}{:04}{}", ARTIFACT_PREFIX, index, ARTIFACT_SUFFIX)
}

fn parse_artifact_file_name(name: &str) -> Option<usize> {
    name.strip_prefix(ARTIFACT_PREFIX)?
        .strip_suffix(ARTIFACT_SUFFIX)?
        .parse()
        .ok()
}

/// Progress store for one project.
#[derive(Debug)]
pub struct CheckpointStore {
    /// Project record holding the completed lists.
    record_path: PathBuf,
    /// Directory with the chapter artifacts.
    artifact_dir: PathBuf,
    /// What has been durably written so far.
    completed: CompletedSet,
}

impl CheckpointStore {
    /// Open the store, loading the completed set from the record.
    ///
    /// A missing record is treated as a project with no progress.
    pub fn open(record_path: &Path, work_dir: &Path) -> Result<Self, PersistenceError> {
        let completed = load_completed(record_path)?;

        Ok(Self {
            record_path: record_path.to_path_buf(),
            artifact_dir: work_dir.join(ARTIFACT_DIR),
            completed,
        })
    }

    pub fn completed(&self) -> &CompletedSet {
        &self.completed
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    pub fn artifact_path(&self, index: usize) -> PathBuf {
        self.artifact_dir.join(artifact_file_name(index))
    }

    /// Persist a translated chapter, then mark it complete.
    pub fn record_translated(
        &mut self,
        index: usize,
        artifact: &ChapterArtifact,
    ) -> Result<(), PersistenceError> {
        write_atomic(&self.artifact_path(index), artifact.render().as_bytes())?;
        let next = self.completed.with(index, false);
        self.commit(next)
    }

    /// Mark a chapter complete that produced no text.
    pub fn record_empty(&mut self, index: usize) -> Result<(), PersistenceError> {
        let next = self.completed.with(index, true);
        self.commit(next)
    }

    /// Drop all progress: completed lists first, then the artifacts.
    ///
    /// Artifacts left behind by a failed removal belong to no completed
    /// chapter and are ignored by assembly.
    pub fn reset(&mut self) -> Result<(), PersistenceError> {
        self.commit(CompletedSet::default())?;
        if self.artifact_dir.exists() {
            std::fs::remove_dir_all(&self.artifact_dir)
                .map_err(|e| PersistenceError::io(&self.artifact_dir, e))?;
        }
        Ok(())
    }

    /// Artifacts present on disk, sorted by chapter index.
    pub fn artifacts(&self) -> Result<Vec<(usize, PathBuf)>, PersistenceError> {
        if !self.artifact_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.artifact_dir)
            .map_err(|e| PersistenceError::io(&self.artifact_dir, e))?;

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PersistenceError::io(&self.artifact_dir, e))?;
            let name = entry.file_name();
            if let Some(index) = name.to_str().and_then(parse_artifact_file_name) {
                artifacts.push((index, entry.path()));
            }
        }

        artifacts.sort_by_key(|(index, _)| *index);
        Ok(artifacts)
    }

    /// Write `next` to the record; only then adopt it in memory.
    fn commit(&mut self, next: CompletedSet) -> Result<(), PersistenceError> {
        let mut record = read_record(&self.record_path)?;
        record.insert(COMPLETED_FIELD.to_string(), Value::from(next.completed.clone()));
        record.insert(EMPTY_FIELD.to_string(), Value::from(next.empty.clone()));

        let content = serde_json::to_string_pretty(&Value::Object(record))
            .map_err(|e| PersistenceError::json(&self.record_path, e))?;
        write_atomic(&self.record_path, content.as_bytes())?;

        self.completed = next;
        Ok(())
    }
}

/// Read the completed set of a project record without opening a store.
pub fn load_completed(record_path: &Path) -> Result<CompletedSet, PersistenceError> {
    let record = read_record(record_path)?;
    let field = |name: &str| -> Result<Vec<usize>, PersistenceError> {
        match record.get(name) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| PersistenceError::json(record_path, e)),
        }
    };

    Ok(CompletedSet {
        completed: field(COMPLETED_FIELD)?,
        empty: field(EMPTY_FIELD)?,
    })
}

/// Read a project record as a JSON object. A missing file is an empty record.
pub(crate) fn read_record(path: &Path) -> Result<Map<String, Value>, PersistenceError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
        Err(e) => return Err(PersistenceError::io(path, e)),
    };
    match serde_json::from_str(&content).map_err(|e| PersistenceError::json(path, e))? {
        Value::Object(map) => Ok(map),
        _ => Err(PersistenceError::NotAnObject(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> CheckpointStore {
        CheckpointStore::open(
            &dir.path().join("novel.json"),
            &dir.path().join("novel"),
        )
        .unwrap()
    }

    fn artifact(title: &str, text: &str) -> ChapterArtifact {
        ChapterArtifact {
            title: title.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_fresh_store_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.completed().is_empty());
        assert!(store.artifacts().unwrap().is_empty());
    }

    #[test]
    fn test_progress_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        store.record_translated(0, &artifact("One", "text one")).unwrap();
        store.record_empty(1).unwrap();
        store.record_translated(2, &artifact("Three", "text three")).unwrap();

        let reopened = store_in(&dir);
        assert_eq!(reopened.completed().indices(), &[0, 1, 2]);
        assert!(reopened.completed().is_empty_chapter(1));
        assert_eq!(reopened.completed().translated().collect::<Vec<_>>(), vec![0, 2]);

        let artifacts = reopened.artifacts().unwrap();
        let indices: Vec<usize> = artifacts.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 2]);

        let stored = std::fs::read_to_string(reopened.artifact_path(2)).unwrap();
        assert_eq!(ChapterArtifact::parse(&stored), artifact("Three", "text three"));
    }

    #[test]
    fn test_record_preserves_other_fields() {
        let dir = TempDir::new().unwrap();
        let record = dir.path().join("novel.json");
        std::fs::write(&record, r#"{"model": "gemini-pro", "delay": 2.0}"#).unwrap();

        let mut store = store_in(&dir);
        store.record_empty(4).unwrap();

        let value: Value = serde_json::from_str(&std::fs::read_to_string(&record).unwrap()).unwrap();
        assert_eq!(value["model"], "gemini-pro");
        assert_eq!(value["completed_chapters"], serde_json::json!([4]));
        assert_eq!(value["empty_chapters"], serde_json::json!([4]));
    }

    #[test]
    fn test_duplicate_index_recorded_once() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.record_translated(3, &artifact("A", "a")).unwrap();
        store.record_translated(3, &artifact("A", "b")).unwrap();
        assert_eq!(store.completed().indices(), &[3]);
    }

    #[test]
    fn test_reset_clears_everything() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.record_translated(0, &artifact("One", "text")).unwrap();
        assert!(store.artifact_dir().exists());

        store.reset().unwrap();
        assert!(store.completed().is_empty());
        assert!(!store.artifact_dir().exists());
        assert!(store_in(&dir).completed().is_empty());
    }

    #[test]
    fn test_failed_reset_keeps_artifacts() {
        let dir = TempDir::new().unwrap();
        let record = dir.path().join("novel.json");
        let mut store = store_in(&dir);
        store.record_translated(0, &artifact("One", "text")).unwrap();

        std::fs::write(&record, "[1, 2, 3]").unwrap();
        assert!(store.reset().is_err());
        assert_eq!(store.completed().indices(), &[0]);
        assert!(store.artifact_path(0).exists());
    }

    #[test]
    fn test_failed_persist_keeps_memory_unchanged() {
        let dir = TempDir::new().unwrap();
        let record = dir.path().join("novel.json");
        let mut store = store_in(&dir);
        store.record_empty(0).unwrap();

        // A record that is no longer an object cannot be updated.
        std::fs::write(&record, "[1, 2, 3]").unwrap();
        assert!(store.record_empty(1).is_err());
        assert_eq!(store.completed().indices(), &[0]);
    }

    #[test]
    fn test_artifacts_sorted_numerically() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.artifact_dir()).unwrap();
        for index in [12, 2, 10000, 0] {
            std::fs::write(store.artifact_path(index), "# t\nx").unwrap();
        }
        std::fs::write(store.artifact_dir().join("notes.md"), "ignored").unwrap();

        let indices: Vec<usize> = store.artifacts().unwrap().iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 2, 12, 10000]);
    }

    #[test]
    fn test_artifact_format() {
        assert_eq!(artifact_file_name(7), "chapter_0007.txt");
        assert_eq!(
            artifact("Line\nbreak", "body\nmore").render(),
            "# Line break\nbody\nmore"
        );
        assert_eq!(
            ChapterArtifact::parse("# Only heading"),
            artifact("Only heading", "")
        );
    }
}
