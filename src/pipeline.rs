//! One book, start to finish.
//!
//! Chapters are translated strictly in order. Each finished chapter is
//! checkpointed before the next one starts, so a later run with `resume`
//! picks up where this one stopped.

use crate::assembler::assemble;
use crate::checkpoint::{ChapterArtifact, CheckpointStore};
use crate::epub::Book;
use crate::error::RunError;
use crate::events::{CancelToken, EventSender};
use crate::provider::Provider;
use crate::translator::{ChapterOutcome, ChapterTranslator};
use std::path::PathBuf;
use std::time::Duration;

/// Everything needed to translate one book.
#[derive(Debug, Clone)]
pub struct BookJob {
    /// Source EPUB.
    pub input: PathBuf,
    /// Destination DOCX.
    pub output: PathBuf,
    /// Project record holding the completed set.
    pub record_path: PathBuf,
    /// Project working directory for artifacts.
    pub work_dir: PathBuf,
    pub translator: ChapterTranslator,
    /// Pause after each chapter that called the provider.
    pub delay: Duration,
    /// Keep existing progress instead of starting over.
    pub resume: bool,
}

/// How a book run ended, short of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookOutcome {
    /// Every chapter done and the document written.
    Completed { output: PathBuf },
    /// Some chapters were skipped; progress kept, nothing assembled.
    Incomplete { skipped: Vec<usize> },
    /// Stopped on request; progress kept.
    Cancelled,
}

/// Translate one book and assemble the output document.
pub async fn translate_book(
    job: &BookJob,
    provider: &dyn Provider,
    events: &EventSender,
    cancel: &CancelToken,
) -> Result<BookOutcome, RunError> {
    events.log(format!("Reading {}", job.input.display()));
    let book = Book::open(&job.input)?;
    let total = book.len();

    let mut store = CheckpointStore::open(&job.record_path, &job.work_dir)?;
    if !job.resume {
        store.reset()?;
    } else if !store.completed().is_empty() {
        events.log(format!(
            "Resuming: {} of {} chapters already done",
            store.completed().len(),
            total
        ));
    }

    events.log(format!(
        "Found {} chapters in \"{}\"",
        total,
        book.title().unwrap_or("untitled book")
    ));
    events.progress(store.completed().len().min(total), total);

    let mut skipped = Vec::new();

    for chapter in book.chapters() {
        let index = chapter.index;
        let number = index + 1;

        if cancel.is_cancelled() {
            events.log("Translation cancelled");
            return Ok(BookOutcome::Cancelled);
        }
        if store.completed().contains(index) {
            continue;
        }

        events.log(format!(
            "Translating chapter {}/{}: {}",
            number, total, chapter.title
        ));

        let called_provider = match job
            .translator
            .translate_chapter(chapter, provider, events, cancel)
            .await?
        {
            ChapterOutcome::Translated(text) => {
                let artifact = ChapterArtifact {
                    title: chapter.title.clone(),
                    text,
                };
                store.record_translated(index, &artifact)?;
                events.log(format!("Chapter {} saved", number));
                true
            }
            ChapterOutcome::Empty => {
                store.record_empty(index)?;
                events.log(format!("Chapter {} has no text, nothing to translate", number));
                false
            }
            ChapterOutcome::Skipped { .. } => {
                skipped.push(index);
                true
            }
            ChapterOutcome::Cancelled => {
                events.log("Translation cancelled");
                return Ok(BookOutcome::Cancelled);
            }
        };

        events.progress(store.completed().len(), total);

        let is_last = number == total;
        if called_provider && !is_last && !job.delay.is_zero() {
            events.log(format!(
                "Waiting {:.1} seconds before the next chapter...",
                job.delay.as_secs_f64()
            ));
            if !cancel.sleep(job.delay).await {
                events.log("Translation cancelled");
                return Ok(BookOutcome::Cancelled);
            }
        }
    }

    if !skipped.is_empty() {
        let numbers: Vec<String> = skipped.iter().map(|i| (i + 1).to_string()).collect();
        events.log(format!(
            "Skipped chapters: {}. Progress saved; run again to retry them",
            numbers.join(", ")
        ));
        return Ok(BookOutcome::Incomplete { skipped });
    }

    events.log("All chapters translated, assembling document...");
    let written = assemble(&store, book.title(), &job.output)?;
    store.reset()?;

    events.log(format!(
        "Wrote {} chapters to {}",
        written,
        job.output.display()
    ));
    events.done(job.output.clone());

    Ok(BookOutcome::Completed {
        output: job.output.clone(),
    })
}
