//! Folio CLI - EPUB to DOCX book translator.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use folio::config::{API_KEY_ENV, Config};
use folio::console::Console;
use folio::controller::{Controller, RunSettings, plan_batch};
use folio::events::RunEvent;
use folio::glossary::GlossaryMode;
use folio::keys::{ApiKeyStore, mask};
use folio::project::{ProjectRecord, ProjectStore, validate_name};
use folio::provider::GeminiClient;
use folio::retry::RetryPolicy;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// How often the event channel is drained.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Translate EPUB books into DOCX, chapter by chapter.
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate a book, or a directory of books, for a project.
    Translate(TranslateArgs),

    /// Manage saved projects.
    Projects {
        #[command(subcommand)]
        action: ProjectsAction,
    },

    /// Manage named API keys.
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },

    /// List the models available to an API key.
    Models {
        /// Use a stored API key.
        #[arg(long)]
        key_name: Option<String>,
    },
}

#[derive(clap::Args, Debug)]
struct TranslateArgs {
    /// Project name; created on first use.
    project: String,

    /// EPUB file or directory of EPUB files.
    #[arg(long)]
    input: Option<PathBuf>,

    /// DOCX file, or output directory for a batch.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Model identifier.
    #[arg(long)]
    model: Option<String>,

    /// Seconds to wait between chapters.
    #[arg(long)]
    delay: Option<f64>,

    /// Read glossary rules from this file.
    #[arg(long)]
    glossary_file: Option<PathBuf>,

    /// Read the prompt template from this file.
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    /// literal, pattern or instructions.
    #[arg(long)]
    glossary_mode: Option<GlossaryMode>,

    /// Use a stored API key.
    #[arg(long)]
    key_name: Option<String>,

    /// Start over instead of resuming saved progress.
    #[arg(long)]
    fresh: bool,
}

#[derive(Subcommand, Debug)]
enum ProjectsAction {
    /// List saved projects.
    List,
    /// Show a project's settings and progress.
    Show { name: String },
    /// Delete a project and its intermediate files.
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
enum KeysAction {
    /// List stored key names.
    List,
    /// Store a key under a name.
    Add { name: String, key: String },
    /// Remove a stored key.
    Remove { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let console = Console::new();

    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    match args.command {
        Command::Translate(translate) => run_translate(&config, &console, translate).await,
        Command::Projects { action } => run_projects(&config, &console, action),
        Command::Keys { action } => run_keys(&config, &console, action),
        Command::Models { key_name } => run_models(&config, &console, key_name.as_deref()).await,
    }
}

/// Initialize logging with RUST_LOG environment variable support
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn run_translate(config: &Config, console: &Console, args: TranslateArgs) -> Result<()> {
    console.section("Folio - EPUB Translator");

    validate_name(&args.project)?;
    let projects = ProjectStore::new(config.projects_dir()?);

    console.step(&format!("Loading project '{}'...", args.project));
    let mut record = if projects.exists(&args.project) {
        projects
            .load(&args.project)
            .with_context(|| format!("Failed to load project '{}'", args.project))?
    } else {
        console.info("New project, using configured defaults");
        ProjectRecord::from_config(config)
    };
    apply_overrides(&mut record, &args)?;

    if record.source_path.as_os_str().is_empty() {
        anyhow::bail!("No input book for project '{}'; pass --input", args.project);
    }
    if record.output_path.as_os_str().is_empty() {
        record.output_path = default_output(&record.source_path);
    }
    record
        .validate()
        .with_context(|| format!("Invalid settings for project '{}'", args.project))?;

    let api_key = resolve_key(config, record.api_key_name.as_deref())?;
    let client = GeminiClient::new(
        &config.api,
        api_key,
        record.model.clone(),
        Duration::from_secs(config.translation.request_timeout_sec),
    )?;

    let pairs = plan_batch(&record.source_path, &record.output_path)?;
    projects.save(&args.project, &record)?;
    console.success(&format!(
        "{} book(s) to translate with {}",
        pairs.len(),
        client.model()
    ));

    let settings = RunSettings {
        project: args.project.clone(),
        projects,
        record,
        retry: RetryPolicy::new(
            config.translation.max_attempts,
            Duration::from_secs(config.translation.initial_retry_delay_sec),
        ),
        fresh: args.fresh,
    };
    let mut handle = Controller::new(settings, Arc::new(client)).spawn(pairs)?;

    let cancel = handle.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            Console::new().warning("Cancelling, the current step will finish first...");
            cancel.cancel();
        }
    });

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut finished = false;
    while !finished {
        ticker.tick().await;
        loop {
            match handle.events.try_recv() {
                Ok(event) => {
                    console.render_event(&event);
                    if event == RunEvent::RunFinished {
                        finished = true;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    finished = true;
                    break;
                }
            }
        }
    }

    let summary = handle.task.await.context("Translation task failed")?;

    if let Some(error) = summary.error {
        anyhow::bail!("Translation stopped: {}", error);
    }
    if summary.cancelled {
        console.warning("Cancelled. Run the same command again to resume.");
    } else if !summary.incomplete.is_empty() {
        console.warning(&format!(
            "{} book(s) have skipped chapters. Run again to retry them.",
            summary.incomplete.len()
        ));
    } else {
        console.section("Done!");
    }

    Ok(())
}

fn apply_overrides(record: &mut ProjectRecord, args: &TranslateArgs) -> Result<()> {
    if let Some(ref input) = args.input {
        record.source_path = input.clone();
    }
    if let Some(ref output) = args.output {
        record.output_path = output.clone();
    }
    if let Some(ref model) = args.model {
        record.model = model.clone();
    }
    if let Some(delay) = args.delay {
        record.delay = delay;
    }
    if let Some(ref path) = args.glossary_file {
        record.glossary = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read glossary {}", path.display()))?;
    }
    if let Some(ref path) = args.prompt_file {
        record.prompt = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prompt {}", path.display()))?;
    }
    if let Some(mode) = args.glossary_mode {
        record.glossary_mode = mode;
    }
    if let Some(ref name) = args.key_name {
        record.api_key_name = Some(name.clone());
    }
    Ok(())
}

/// `book.epub` becomes `book_translated.docx` next to it; a directory
/// of books writes into itself.
fn default_output(source: &Path) -> PathBuf {
    if source.is_dir() {
        return source.to_path_buf();
    }
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "book".to_string());
    source.with_file_name(format!("{}_translated.docx", stem))
}

fn resolve_key(config: &Config, key_name: Option<&str>) -> Result<String> {
    let named = match key_name {
        Some(name) => {
            let keys = ApiKeyStore::load(&config.keys_path()?)?;
            Some(keys.require(name)?.to_string())
        }
        None => None,
    };

    let key = config.resolve_api_key(named.as_deref(), std::env::var(API_KEY_ENV).ok())?;
    Ok(key)
}

fn run_projects(config: &Config, console: &Console, action: ProjectsAction) -> Result<()> {
    let projects = ProjectStore::new(config.projects_dir()?);

    match action {
        ProjectsAction::List => {
            let names = projects.list()?;
            if names.is_empty() {
                console.info(&format!(
                    "No projects in {}",
                    projects.root().display()
                ));
            }
            for name in names {
                let done = projects.completed(&name)?.len();
                println!("{} {}", name, console.muted(&format!("({} chapters done)", done)));
            }
        }
        ProjectsAction::Show { name } => {
            let record = projects
                .load(&name)
                .with_context(|| format!("Failed to load project '{}'", name))?;
            let completed = projects.completed(&name)?;

            console.section(&name);
            println!("  Source:        {}", record.source_path.display());
            println!("  Output:        {}", record.output_path.display());
            println!("  Model:         {}", record.model);
            println!("  Delay:         {}s", record.delay);
            println!("  Glossary mode: {}", record.glossary_mode);
            println!("  Glossary:      {} line(s)", record.glossary.lines().count());
            println!(
                "  API key:       {}",
                record.api_key_name.as_deref().unwrap_or("(default)")
            );
            println!("  Completed:     {:?}", completed.indices());
        }
        ProjectsAction::Delete { name } => {
            if projects.delete(&name)? {
                console.success(&format!("Deleted project '{}'", name));
            } else {
                console.warning(&format!("No project named '{}'", name));
            }
        }
    }

    Ok(())
}

fn run_keys(config: &Config, console: &Console, action: KeysAction) -> Result<()> {
    let mut keys = ApiKeyStore::load(&config.keys_path()?)?;

    match action {
        KeysAction::List => {
            let names = keys.names();
            if names.is_empty() {
                console.info("No stored API keys");
            }
            for name in names {
                let value = keys.get(name).unwrap_or_default();
                println!("{} {}", name, console.muted(&mask(value)));
            }
        }
        KeysAction::Add { name, key } => {
            keys.add(&name, &key)?;
            console.success(&format!("Stored key '{}'", name));
        }
        KeysAction::Remove { name } => {
            if keys.remove(&name)? {
                console.success(&format!("Removed key '{}'", name));
            } else {
                console.warning(&format!("No key named '{}'", name));
            }
        }
    }

    Ok(())
}

async fn run_models(config: &Config, console: &Console, key_name: Option<&str>) -> Result<()> {
    let api_key = resolve_key(config, key_name)?;
    let client = GeminiClient::new(
        &config.api,
        api_key,
        config.api.model.clone(),
        Duration::from_secs(config.translation.request_timeout_sec),
    )?;

    console.step("Fetching model list...");
    let models = client
        .list_models()
        .await
        .context("Failed to list models")?;

    for model in &models {
        println!("  {}", model);
    }
    console.success(&format!("{} models support content generation", models.len()));
    Ok(())
}
