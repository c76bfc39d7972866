//! Per-chapter translation with retry and backoff.
//!
//! A chapter goes through glossary preparation, prompt rendering and a
//! retry loop around the [`Provider`]. Rate limits and filtered
//! responses are retried on the [`RetryPolicy`] schedule; any other
//! provider failure aborts the run.

use crate::config::{GLOSSARY_PLACEHOLDER, TEXT_PLACEHOLDER};
use crate::epub::Chapter;
use crate::error::RunError;
use crate::events::{CancelToken, EventSender};
use crate::glossary::{Glossary, GlossaryMode};
use crate::provider::{Completion, Provider};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::utils::preview;
use std::time::Duration;
use tracing::warn;

/// How a single chapter ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterOutcome {
    /// Translated text, trimmed.
    Translated(String),
    /// Nothing to translate; no provider call was made.
    Empty,
    /// Every attempt was rate limited or filtered.
    Skipped { attempts: u32 },
    /// Cancellation was requested while waiting.
    Cancelled,
}

/// Translates chapters with a fixed prompt, glossary and retry policy.
#[derive(Debug, Clone)]
pub struct ChapterTranslator {
    /// Prompt template with `{text_to_translate}` (and optionally `{glossary}`).
    template: String,
    glossary: Glossary,
    mode: GlossaryMode,
    retry: RetryPolicy,
}

impl ChapterTranslator {
    pub fn new(template: String, glossary: Glossary, mode: GlossaryMode, retry: RetryPolicy) -> Self {
        Self {
            template,
            glossary,
            mode,
            retry,
        }
    }

    /// Fill the template with the chapter text and, in instructions mode,
    /// the glossary block.
    pub fn render_prompt(&self, text: &str) -> String {
        let instructions = match self.mode {
            GlossaryMode::Instructions => self.glossary.instructions(),
            GlossaryMode::Literal | GlossaryMode::Pattern => String::new(),
        };

        let prompt = self
            .template
            .replace(GLOSSARY_PLACEHOLDER, &instructions)
            .replace(TEXT_PLACEHOLDER, text);

        if !instructions.is_empty() && !self.template.contains(GLOSSARY_PLACEHOLDER) {
            format!("{}\n\n{}", instructions, prompt)
        } else {
            prompt
        }
    }

    /// Run one chapter to completion.
    ///
    /// Only a non-transient provider failure is an error.
    pub async fn translate_chapter(
        &self,
        chapter: &Chapter,
        provider: &dyn Provider,
        events: &EventSender,
        cancel: &CancelToken,
    ) -> Result<ChapterOutcome, RunError> {
        let number = chapter.index + 1;

        if chapter.text.trim().is_empty() {
            return Ok(ChapterOutcome::Empty);
        }

        let (text, warnings) = self.glossary.prepare(&chapter.text, self.mode);
        for warning in &warnings {
            warn!(pattern = %warning.pattern, "Skipping glossary pattern");
            events.log(format!("Glossary rule skipped: {}", warning));
        }
        if text.trim().is_empty() {
            return Ok(ChapterOutcome::Empty);
        }

        let prompt = self.render_prompt(&text);
        let mut previous_delay: Option<Duration> = None;
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Ok(ChapterOutcome::Cancelled);
            }
            attempt += 1;

            let problem = match provider.generate(&prompt).await {
                Completion::Success(translated) if !translated.trim().is_empty() => {
                    return Ok(ChapterOutcome::Translated(translated.trim().to_string()));
                }
                Completion::Success(_) => "empty response".to_string(),
                Completion::Filtered(reason) => format!("response filtered ({})", reason),
                Completion::RateLimited(detail) => {
                    format!("rate limited ({})", preview(&detail, 120))
                }
                Completion::Fatal(detail) => {
                    return Err(RunError::Provider {
                        chapter: number,
                        detail,
                    });
                }
            };

            events.log(format!(
                "Chapter {}: {}, attempt {}/{}",
                number, problem, attempt, self.retry.max_attempts
            ));

            match self.retry.after_failure(attempt, previous_delay) {
                RetryDecision::Wait(delay) => {
                    events.log(format!("Retrying in {} seconds...", delay.as_secs()));
                    if !cancel.sleep(delay).await {
                        return Ok(ChapterOutcome::Cancelled);
                    }
                    previous_delay = Some(delay);
                }
                RetryDecision::GiveUp => {
                    events.log(format!(
                        "Chapter {} skipped after {} attempts",
                        number, attempt
                    ));
                    return Ok(ChapterOutcome::Skipped { attempts: attempt });
                }
            }
        }
    }
}
