//! Batch runs on a dedicated worker task.
//!
//! [`plan_batch`] turns the project's source and output paths into
//! `(input, output)` pairs. [`Controller::spawn`] validates the settings,
//! then translates the books one after another on a single tokio task,
//! reporting through the event channel. `RunFinished` is always the last
//! event, however the run ends.

use crate::checkpoint::load_completed;
use crate::config::validate_delay;
use crate::error::{ConfigError, RunError};
use crate::events::{self, CancelToken, EventSender, RunEvent};
use crate::glossary::Glossary;
use crate::pipeline::{BookJob, BookOutcome, translate_book};
use crate::project::{ProjectRecord, ProjectStore, validate_name};
use crate::provider::Provider;
use crate::retry::RetryPolicy;
use crate::translator::ChapterTranslator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::info;

/// Suffix of output files generated for a directory of books.
const BATCH_OUTPUT_SUFFIX: &str = "_translated.docx";

/// One book of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookPair {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Work out which books to translate and where their output goes.
///
/// A single `.epub` maps to `output` (or `{output}/{stem}_translated.docx`
/// when `output` is a directory). A directory maps every `.epub` inside it,
/// sorted by name, to `{output}/{stem}_translated.docx`.
pub fn plan_batch(source: &Path, output: &Path) -> Result<Vec<BookPair>, ConfigError> {
    if source.is_dir() {
        let unreadable = |e: std::io::Error| ConfigError::InvalidValue {
            key: "input".to_string(),
            message: format!("cannot read {}: {}", source.display(), e),
        };

        let mut inputs = Vec::new();
        for entry in std::fs::read_dir(source).map_err(unreadable)? {
            let path = entry.map_err(unreadable)?.path();
            if path.is_file() && is_epub(&path) {
                inputs.push(path);
            }
        }
        inputs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        if inputs.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "input".to_string(),
                message: format!("no .epub files in {}", source.display()),
            });
        }

        return Ok(inputs
            .into_iter()
            .map(|input| BookPair {
                output: output.join(batch_output_name(&input)),
                input,
            })
            .collect());
    }

    if !source.is_file() {
        return Err(ConfigError::InvalidValue {
            key: "input".to_string(),
            message: format!("{} does not exist", source.display()),
        });
    }

    let output = if output.is_dir() {
        output.join(batch_output_name(source))
    } else {
        output.to_path_buf()
    };

    Ok(vec![BookPair {
        input: source.to_path_buf(),
        output,
    }])
}

fn is_epub(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("epub"))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "book".to_string())
}

fn batch_output_name(input: &Path) -> String {
    format!("{}{}", file_stem(input), BATCH_OUTPUT_SUFFIX)
}

/// Settings shared by every book of a run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Project the run belongs to.
    pub project: String,
    pub projects: ProjectStore,
    /// Prompt, glossary, model and delay for every book.
    pub record: ProjectRecord,
    pub retry: RetryPolicy,
    /// Discard existing progress instead of resuming.
    pub fresh: bool,
}

/// What a finished run achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Documents written.
    pub completed: Vec<PathBuf>,
    /// Books left with skipped chapters.
    pub incomplete: Vec<PathBuf>,
    pub cancelled: bool,
    /// The error that halted the batch.
    pub error: Option<String>,
}

/// A running batch.
#[derive(Debug)]
pub struct RunHandle {
    /// Events in emission order, ending with `RunFinished`.
    pub events: UnboundedReceiver<RunEvent>,
    /// Request cooperative cancellation.
    pub cancel: CancelToken,
    pub task: JoinHandle<BatchSummary>,
}

/// Drives one run of one or more books.
pub struct Controller {
    settings: RunSettings,
    provider: Arc<dyn Provider>,
}

impl Controller {
    pub fn new(settings: RunSettings, provider: Arc<dyn Provider>) -> Self {
        Self { settings, provider }
    }

    /// Validate the settings and start the batch on its own task.
    ///
    /// Nothing is written when validation fails.
    pub fn spawn(self, pairs: Vec<BookPair>) -> Result<RunHandle, ConfigError> {
        validate_name(&self.settings.project)?;
        self.settings.record.validate()?;
        if self.settings.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_attempts".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if pairs.is_empty() {
            return Err(ConfigError::MissingValue("input books".to_string()));
        }

        let (sender, receiver) = events::channel();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();

        let task = tokio::spawn(async move { self.run(pairs, sender, worker_cancel).await });

        Ok(RunHandle {
            events: receiver,
            cancel,
            task,
        })
    }

    async fn run(
        self,
        pairs: Vec<BookPair>,
        events: EventSender,
        cancel: CancelToken,
    ) -> BatchSummary {
        let total = pairs.len();
        let mut summary = BatchSummary::default();
        info!(project = %self.settings.project, books = total, "Run started");

        for (i, pair) in pairs.iter().enumerate() {
            if cancel.is_cancelled() {
                events.log("Run cancelled");
                summary.cancelled = true;
                break;
            }
            if total > 1 {
                events.log(format!(
                    "Book {}/{}: {}",
                    i + 1,
                    total,
                    pair.input.display()
                ));
            }

            match self.run_book(pair, total > 1, &events, &cancel).await {
                Ok(BookOutcome::Completed { output }) => summary.completed.push(output),
                Ok(BookOutcome::Incomplete { .. }) => summary.incomplete.push(pair.input.clone()),
                Ok(BookOutcome::Cancelled) => {
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    let detail = e.to_string();
                    events.log(format!("Error: {}", detail));
                    events.error(detail.clone());
                    summary.error = Some(detail);
                    break;
                }
            }
        }

        events.log(format!(
            "Run finished: {} of {} books written",
            summary.completed.len(),
            total
        ));
        events.finished();
        summary
    }

    async fn run_book(
        &self,
        pair: &BookPair,
        batch: bool,
        events: &EventSender,
        cancel: &CancelToken,
    ) -> Result<BookOutcome, RunError> {
        let settings = &self.settings;
        let name = if batch {
            format!("{}-{}", settings.project, file_stem(&pair.input))
        } else {
            settings.project.clone()
        };

        if batch {
            let record = ProjectRecord {
                source_path: pair.input.clone(),
                output_path: pair.output.clone(),
                ..settings.record.clone()
            };
            settings.projects.save(&name, &record)?;
        }

        let record_path = settings.projects.record_path(&name);
        let has_progress = !load_completed(&record_path)?.is_empty();
        let resume = has_progress && !settings.fresh;
        if has_progress && settings.fresh {
            events.log(format!("Discarding saved progress of '{}'", name));
        }

        let glossary = Glossary::parse(&settings.record.glossary);
        if !glossary.is_empty() {
            events.log(format!(
                "Glossary: {} rule(s), {} mode",
                glossary.rules().len(),
                settings.record.glossary_mode
            ));
        }

        let job = BookJob {
            input: pair.input.clone(),
            output: pair.output.clone(),
            record_path,
            work_dir: settings.projects.work_dir(&name),
            translator: ChapterTranslator::new(
                settings.record.prompt.clone(),
                glossary,
                settings.record.glossary_mode,
                settings.retry,
            ),
            delay: validate_delay("delay", settings.record.delay)?,
            resume,
        };

        translate_book(&job, self.provider.as_ref(), events, cancel).await
    }
}
