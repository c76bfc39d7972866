//! Folio - EPUB to DOCX book translator.
//!
//! This library provides functionality for:
//! - Extracting chapters from EPUB books
//! - Translating them one by one through a generative language API,
//!   with glossary support, backoff on rate limits and resumable progress
//! - Assembling the translated chapters into a DOCX document

pub mod assembler;
pub mod checkpoint;
pub mod config;
pub mod console;
pub mod controller;
pub mod docx;
pub mod epub;
pub mod error;
pub mod events;
pub mod glossary;
pub mod keys;
pub mod pipeline;
pub mod project;
pub mod provider;
pub mod retry;
#[cfg(test)]
mod testing;
pub mod translator;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use console::Console;
pub use controller::{BatchSummary, BookPair, Controller, RunHandle, RunSettings, plan_batch};
pub use epub::{Book, Chapter};
pub use error::{ConfigError, KeyStoreError, PersistenceError, ProviderError, RunError, SourceError};
pub use events::{CancelToken, EventSender, RunEvent};
pub use glossary::{Glossary, GlossaryMode};
pub use pipeline::{BookJob, BookOutcome, translate_book};
pub use project::{ProjectRecord, ProjectStore};
pub use provider::{Completion, GeminiClient, Provider};
pub use retry::RetryPolicy;
pub use translator::{ChapterOutcome, ChapterTranslator};
