//! Command-line front end for Satchel.

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use satchel_attach::{
    AttachError, AttachmentManager, BlobRenderer, CancellationToken, IntegrityProblem,
    NewAttachment, RenderOutcome, StorageSession,
};
use satchel_core::config::AppConfig;
use satchel_core::media::Strategy;
use satchel_core::{TodoId, TodoRecord};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_CONFIG_PATH: &str = "satchel.toml";

/// Extension to MIME type, used when `--type` is not given.
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("wav", "audio/wav"),
    ("flac", "audio/flac"),
    ("mka", "audio/x-matroska"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
    ("mkv", "application/x-matroska"),
    ("pdf", "application/pdf"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("json", "application/json"),
    ("zip", "application/zip"),
];

#[derive(Parser)]
#[command(name = "satchel")]
#[command(about = "Todo list with file attachments")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(long, global = true, env = "SATCHEL_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print Prometheus metrics to stderr when the command finishes
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a todo, optionally with an attached file
    Add {
        /// Todo text
        text: String,

        /// File to attach
        #[arg(long)]
        file: Option<PathBuf>,

        /// MIME type of the file (guessed from the extension if omitted)
        #[arg(long = "type", requires = "file")]
        content_type: Option<String>,

        /// Storage strategy (defaults to attachments.strategy from config)
        #[arg(long, value_enum, requires = "file")]
        strategy: Option<StrategyArg>,
    },
    /// List todos in creation order
    List,
    /// Delete a todo and its attachment
    Rm {
        /// Todo id
        id: String,
    },
    /// Show a todo and load its attachment
    Show {
        /// Todo id
        id: String,

        /// Write the attachment bytes to this path
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Remove stored blob data that no todo references
    Sweep {
        /// Only report what would be removed
        #[arg(long)]
        dry_run: bool,
    },
    /// Report todos whose attachment data is missing
    Check,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    Chunked,
    FileArea,
    Inline,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Chunked => Strategy::Chunked,
            StrategyArg::FileArea => Strategy::FileArea,
            StrategyArg::Inline => Strategy::Inline,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        config,
        print_metrics,
        command,
    } = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&config)?;
    let session = StorageSession::open(config)
        .await
        .context("failed to open storage")?;

    let result = run(command, &session).await;
    session.close().await;

    if print_metrics {
        let text = satchel_attach::metrics::encode_text().context("failed to encode metrics")?;
        eprint!("{text}");
    }
    result
}

fn load_config(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if path.exists() {
        tracing::debug!(config_path = %path.display(), "loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!(config_path = %path.display(), "no config file, using defaults");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("SATCHEL_").ignore(&["CONFIG"]).split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;
    Ok(config)
}

async fn run(command: Commands, session: &Arc<StorageSession>) -> Result<()> {
    let manager = AttachmentManager::new(session.clone())?;

    match command {
        Commands::Add {
            text,
            file,
            content_type,
            strategy,
        } => handle_add(&manager, &text, file, content_type, strategy).await,
        Commands::List => handle_list(&manager).await,
        Commands::Rm { id } => {
            let id = parse_id(&id)?;
            manager
                .delete_attachment(id)
                .await
                .with_context(|| format!("failed to delete todo {id}"))?;
            println!("Deleted todo {id}");
            Ok(())
        }
        Commands::Show { id, out } => {
            let renderer = BlobRenderer::new(session.clone())?;
            handle_show(&manager, &renderer, parse_id(&id)?, out.as_deref()).await
        }
        Commands::Sweep { dry_run } => {
            let report = manager.sweep_orphans(dry_run).await?;
            let verb = if dry_run { "Would remove" } else { "Removed" };
            println!(
                "{verb} {} orphaned chunk(s) and {} orphaned file(s)",
                report.chunks_removed, report.files_removed
            );
            if report.errors > 0 {
                anyhow::bail!("{} orphan(s) could not be removed", report.errors);
            }
            Ok(())
        }
        Commands::Check => handle_check(&manager).await,
    }
}

async fn handle_add(
    manager: &AttachmentManager,
    text: &str,
    file: Option<PathBuf>,
    content_type: Option<String>,
    strategy: Option<StrategyArg>,
) -> Result<()> {
    let attachment = match &file {
        Some(path) => {
            let data = tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "attachment".to_string());
            let content_type = content_type.unwrap_or_else(|| guess_content_type(&name).to_string());
            Some(NewAttachment::new(name, content_type, Bytes::from(data)))
        }
        None => None,
    };

    let strategy = strategy
        .map(Strategy::from)
        .unwrap_or(manager.session().config().attachments.strategy);

    let show_progress = attachment.as_ref().is_some_and(|a| !a.data.is_empty());
    let id = manager
        .create_attachment_with(text, attachment, strategy, |percent| {
            if show_progress {
                eprint!("\rUploading... {percent}%");
                let _ = std::io::stderr().flush();
            }
        })
        .await
        .context("failed to add todo")?;
    if show_progress {
        eprintln!(); // newline after progress
    }

    println!("{id}");
    Ok(())
}

async fn handle_list(manager: &AttachmentManager) -> Result<()> {
    let records = manager.list_attachments().await?;
    if records.is_empty() {
        println!("No todos.");
        return Ok(());
    }

    println!("{:<16} {:<15} {:<10} Text", "ID", "State", "Media");
    for record in &records {
        println!(
            "{:<16} {:<15} {:<10} {}",
            record.id,
            record.state.as_str(),
            media_summary(record),
            record.text
        );
    }
    Ok(())
}

async fn handle_show(
    manager: &AttachmentManager,
    renderer: &BlobRenderer,
    id: TodoId,
    out: Option<&Path>,
) -> Result<()> {
    let record = match manager.get_attachment(id).await {
        Ok(record) => record,
        Err(AttachError::NotFound(_)) => anyhow::bail!("todo {id} not found"),
        Err(e) => return Err(e.into()),
    };

    println!("ID:      {}", record.id);
    println!("Text:    {}", record.text);
    println!("State:   {}", record.state.as_str());
    if record.is_pending_delete() {
        anyhow::bail!("todo {id} is pending delete, run `satchel rm {id}` to finish removing it");
    }
    let Some(media) = &record.media else {
        println!("Media:   none");
        return Ok(());
    };
    println!(
        "Media:   {} ({}, {} bytes, {})",
        media.name(),
        media.content_type(),
        media.size(),
        media.strategy()
    );

    match renderer.render(id, &CancellationToken::new()).await {
        RenderOutcome::Ready(rendered) => {
            println!("Display: {}", describe(&rendered.presentation));
            if let Some(path) = out {
                tokio::fs::write(path, rendered.handle.bytes())
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Saved {} bytes to {}", rendered.handle.len(), path.display());
            }
        }
        RenderOutcome::NoMedia => println!("Media:   none"),
        RenderOutcome::Placeholder { message, cause } => {
            println!("Display: {message}");
            tracing::warn!(todo_id = %id, cause = %cause, "attachment could not be loaded");
            if out.is_some() {
                anyhow::bail!("{message}: {cause}");
            }
        }
        RenderOutcome::Discarded => anyhow::bail!("todo {id} was deleted while loading"),
    }
    Ok(())
}

async fn handle_check(manager: &AttachmentManager) -> Result<()> {
    let report = manager.check_integrity().await?;
    for problem in &report.problems {
        match problem {
            IntegrityProblem::MissingChunk { id, chunk } => {
                println!("{id}: missing chunk {chunk}")
            }
            IntegrityProblem::MissingFile { id, name } => println!("{id}: missing file {name}"),
            IntegrityProblem::FileAreaUnavailable { id, name } => {
                println!("{id}: cannot check {name}, file area unavailable")
            }
            IntegrityProblem::PendingDelete { id } => {
                println!("{id}: delete did not finish, run `satchel rm {id}` again")
            }
        }
    }

    println!(
        "Chunk store: {} chunk(s) for {} file(s), {} bytes",
        report.chunks.count, report.chunks.files, report.chunks.total_size
    );
    if !report.file_area_healthy {
        println!("File area: unavailable");
    }

    if report.is_clean() {
        println!("Checked {} todo(s), no problems found", report.records_checked);
        Ok(())
    } else {
        anyhow::bail!(
            "checked {} todo(s), found {} problem(s)",
            report.records_checked,
            report.problems.len()
        )
    }
}

fn parse_id(raw: &str) -> Result<TodoId> {
    TodoId::parse(raw).with_context(|| format!("invalid todo id: {raw}"))
}

fn media_summary(record: &TodoRecord) -> &'static str {
    match &record.media {
        None => "-",
        Some(media) => media.kind().as_str(),
    }
}

fn describe(presentation: &satchel_attach::Presentation) -> String {
    use satchel_attach::Presentation;
    match presentation {
        Presentation::Image => "image".to_string(),
        Presentation::Audio { muted } => format!("audio{}", if *muted { " (muted)" } else { "" }),
        Presentation::Video { muted } => format!("video{}", if *muted { " (muted)" } else { "" }),
        Presentation::File { label } => label.clone(),
    }
}

/// MIME type for `name` by extension, or empty when unknown.
fn guess_content_type(name: &str) -> &'static str {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return "";
    };
    let ext = ext.to_ascii_lowercase();
    CONTENT_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, content_type)| *content_type)
        .unwrap_or("")
}
