//! Named translation projects.
//!
//! Each project is a pretty-printed JSON record `{projects_dir}/{name}.json`
//! with a working directory `{projects_dir}/{name}/` for intermediate files.
//! The completed-chapter fields of the record belong to
//! [`CheckpointStore`]; saving a project never touches them.

use crate::checkpoint::{CompletedSet, load_completed, read_record};
use crate::config::{Config, validate_delay, validate_template};
use crate::error::{ConfigError, PersistenceError};
use crate::glossary::GlossaryMode;
use crate::utils::write_atomic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Persisted project settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectRecord {
    /// Name of a stored API key to use, if any.
    pub api_key_name: Option<String>,
    /// EPUB file, or a directory of EPUB files.
    pub source_path: PathBuf,
    /// DOCX file, or a directory for batch output.
    pub output_path: PathBuf,
    /// Prompt template with `{text_to_translate}`.
    pub prompt: String,
    /// Glossary rules, one per line.
    pub glossary: String,
    /// Model identifier.
    pub model: String,
    /// Pause between chapters, in seconds.
    pub delay: f64,
    /// How the glossary is applied.
    pub glossary_mode: GlossaryMode,
}

impl Default for ProjectRecord {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ProjectRecord {
    /// A new project using the configured defaults.
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_key_name: None,
            source_path: PathBuf::new(),
            output_path: PathBuf::new(),
            prompt: config.prompts.translation.clone(),
            glossary: String::new(),
            model: config.api.model.clone(),
            delay: config.translation.delay_between_chapters_sec,
            glossary_mode: config.translation.glossary_mode,
        }
    }

    /// Check the settings a run depends on. Called before a record is saved
    /// so a bad override never reaches disk.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_delay("delay", self.delay)?;
        validate_template("prompt", &self.prompt)?;
        Ok(())
    }
}

/// Directory of project records.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn record_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.json", name))
    }

    pub fn work_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.record_path(name).exists()
    }

    /// Names of all saved projects, sorted.
    pub fn list(&self) -> Result<Vec<String>, PersistenceError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let entries =
            std::fs::read_dir(&self.root).map_err(|e| PersistenceError::io(&self.root, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PersistenceError::io(&self.root, e))?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    pub fn load(&self, name: &str) -> Result<ProjectRecord, PersistenceError> {
        let path = self.record_path(name);
        let content = std::fs::read_to_string(&path).map_err(|e| PersistenceError::io(&path, e))?;
        serde_json::from_str(&content).map_err(|e| PersistenceError::json(&path, e))
    }

    /// Save settings, keeping any progress fields already in the record.
    pub fn save(&self, name: &str, record: &ProjectRecord) -> Result<(), PersistenceError> {
        let path = self.record_path(name);

        let mut merged = read_record(&path)?;

        match serde_json::to_value(record).map_err(|e| PersistenceError::json(&path, e))? {
            Value::Object(fields) => merged.extend(fields),
            _ => return Err(PersistenceError::NotAnObject(path)),
        }

        let content = serde_json::to_string_pretty(&Value::Object(merged))
            .map_err(|e| PersistenceError::json(&path, e))?;
        write_atomic(&path, content.as_bytes())
    }

    /// Remove the record and the project's working directory.
    pub fn delete(&self, name: &str) -> Result<bool, PersistenceError> {
        let path = self.record_path(name);
        if !path.exists() {
            return Ok(false);
        }

        let work_dir = self.work_dir(name);
        if work_dir.exists() {
            std::fs::remove_dir_all(&work_dir).map_err(|e| PersistenceError::io(&work_dir, e))?;
        }
        std::fs::remove_file(&path).map_err(|e| PersistenceError::io(&path, e))?;
        Ok(true)
    }

    /// Completed chapters of a project, for display.
    pub fn completed(&self, name: &str) -> Result<CompletedSet, PersistenceError> {
        load_completed(&self.record_path(name))
    }
}

/// Project names double as file names.
pub fn validate_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidValue {
        key: "project name".to_string(),
        message: message.to_string(),
    };

    if name.trim().is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.starts_with('.') {
        return Err(invalid("must not start with '.'"));
    }
    if name
        .chars()
        .any(|c| matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control())
    {
        return Err(invalid("must not contain path separators or reserved characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{ChapterArtifact, CheckpointStore};
    use tempfile::TempDir;

    fn sample() -> ProjectRecord {
        ProjectRecord {
            source_path: PathBuf::from("/books/novel.epub"),
            output_path: PathBuf::from("/out/novel.docx"),
            glossary: "Fox -> Лиса".to_string(),
            glossary_mode: GlossaryMode::Pattern,
            ..ProjectRecord::default()
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = ProjectStore::new(dir.path());

        store.save("novel", &sample()).unwrap();
        assert!(store.exists("novel"));
        assert_eq!(store.load("novel").unwrap(), sample());
    }

    #[test]
    fn test_list_sorted() {
        let dir = TempDir::new().unwrap();
        let store = ProjectStore::new(dir.path());
        assert!(store.list().unwrap().is_empty());

        store.save("zeta", &sample()).unwrap();
        store.save("alpha", &sample()).unwrap();
        std::fs::create_dir_all(store.work_dir("alpha")).unwrap();

        assert_eq!(store.list().unwrap(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_save_keeps_progress() {
        let dir = TempDir::new().unwrap();
        let store = ProjectStore::new(dir.path());
        store.save("novel", &sample()).unwrap();

        let mut checkpoint =
            CheckpointStore::open(&store.record_path("novel"), &store.work_dir("novel")).unwrap();
        checkpoint
            .record_translated(
                0,
                &ChapterArtifact {
                    title: "One".to_string(),
                    text: "body".to_string(),
                },
            )
            .unwrap();

        let mut changed = sample();
        changed.model = "gemini-2.0-flash".to_string();
        store.save("novel", &changed).unwrap();

        assert_eq!(store.load("novel").unwrap().model, "gemini-2.0-flash");
        assert_eq!(store.completed("novel").unwrap().indices(), &[0]);
    }

    #[test]
    fn test_save_refuses_unreadable_record() {
        let dir = TempDir::new().unwrap();
        let store = ProjectStore::new(dir.path());
        let corrupt = r#"{"completed_chapters": [0, 1"#;
        std::fs::write(store.record_path("novel"), corrupt).unwrap();

        assert!(matches!(
            store.save("novel", &sample()),
            Err(PersistenceError::Json { .. })
        ));
        assert_eq!(
            std::fs::read_to_string(store.record_path("novel")).unwrap(),
            corrupt
        );

        std::fs::write(store.record_path("list"), "[]").unwrap();
        assert!(matches!(
            store.save("list", &sample()),
            Err(PersistenceError::NotAnObject(_))
        ));
    }

    #[test]
    fn test_delete_removes_work_dir() {
        let dir = TempDir::new().unwrap();
        let store = ProjectStore::new(dir.path());
        store.save("novel", &sample()).unwrap();
        std::fs::create_dir_all(store.work_dir("novel").join("temp")).unwrap();

        assert!(store.delete("novel").unwrap());
        assert!(!store.exists("novel"));
        assert!(!store.work_dir("novel").exists());
        assert!(!store.delete("novel").unwrap());
    }

    #[test]
    fn test_load_tolerates_missing_fields() {
        let dir = TempDir::new().unwrap();
        let store = ProjectStore::new(dir.path());
        std::fs::write(store.record_path("old"), r#"{"model": "gemini-pro"}"#).unwrap();

        let record = store.load("old").unwrap();
        assert_eq!(record.model, "gemini-pro");
        assert_eq!(record.glossary_mode, GlossaryMode::Literal);
    }

    #[test]
    fn test_record_validation() {
        assert!(sample().validate().is_ok());

        let negative = ProjectRecord {
            delay: -1.0,
            ..sample()
        };
        assert!(negative.validate().is_err());

        let no_placeholder = ProjectRecord {
            prompt: "Translate this".to_string(),
            ..sample()
        };
        assert!(matches!(
            no_placeholder.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "prompt"
        ));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("my novel").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../escape").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name(".hidden").is_err());
    }
}
