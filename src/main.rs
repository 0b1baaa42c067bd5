use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};

use dispatch_intake::config::{ExtractionConfig, MailboxConfig};
use dispatch_intake::invoice::{InvoiceExtractor, MediaType};
use dispatch_intake::llm::AnthropicModel;
use dispatch_intake::mailbox::{RawMessage, poll_once, spawn_poller};
use dispatch_intake::pipeline::aggregator::{WorkOrderRecord, record_invoice};
use dispatch_intake::pipeline::extractor::FieldExtractor;
use dispatch_intake::pipeline::processor::DispatchProcessor;
use dispatch_intake::pipeline::sanitize::sanitize;
use dispatch_intake::store::{DraftSink, JsonLinesSink};

#[derive(Parser)]
#[command(name = "dispatch-intake", version, about = "Dispatch email and invoice intake")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the mailbox and write draft work orders to stdout as JSON lines.
    Poll {
        /// Run a single cycle and exit.
        #[arg(long)]
        once: bool,
    },
    /// Extract a work-order draft from a saved .eml file.
    Parse {
        file: PathBuf,
        /// The file holds notice text pasted without headers.
        #[arg(long)]
        pasted: bool,
    },
    /// Extract an invoice draft from a PDF or image.
    Invoice {
        file: PathBuf,
        /// MIME type of the file. Guessed from the extension when omitted.
        #[arg(long)]
        media_type: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Poll { once } => poll(once).await,
        Command::Parse { file, pasted } => parse(&file, pasted),
        Command::Invoice { file, media_type } => invoice(&file, media_type.as_deref()).await,
    }
}

async fn poll(once: bool) -> anyhow::Result<()> {
    let config = MailboxConfig::from_env()?;
    let processor = Arc::new(DispatchProcessor::default());
    let sink: Arc<dyn DraftSink> = Arc::new(JsonLinesSink::new(std::io::stdout()));

    if once {
        let report = poll_once(&config, &processor, &sink).await?;
        eprintln!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    let (handle, shutdown) = spawn_poller(config, processor, sink);
    tokio::signal::ctrl_c().await?;
    shutdown.store(true, Ordering::Relaxed);
    handle.abort();
    Ok(())
}

fn parse(file: &Path, pasted: bool) -> anyhow::Result<()> {
    if pasted {
        let text =
            std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
        let extraction = FieldExtractor::pasted().extract("", &sanitize(&text));
        println!("{}", serde_json::to_string_pretty(&extraction)?);
        return Ok(());
    }

    let raw = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let processed = DispatchProcessor::default().process(&RawMessage::new(0, vec![], raw), Utc::now())?;
    let record = WorkOrderRecord::from_processed(&processed);
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn invoice(file: &Path, media_type: Option<&str>) -> anyhow::Result<()> {
    let config = ExtractionConfig::from_env()?;
    let payload = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let media_type = media_type
        .map(MediaType::from_mime)
        .unwrap_or_else(|| MediaType::from_path(file));

    let extractor = InvoiceExtractor::new(Arc::new(AnthropicModel::from_config(&config)))
        .with_max_tokens(config.max_tokens);
    let draft = extractor.extract(payload, media_type, config.timeout).await?;
    let sink = JsonLinesSink::new(std::io::stdout());
    let record = record_invoice(file.display().to_string(), media_type, draft, &sink).await?;
    if record.review.needs_review() {
        tracing::warn!(id = %record.id, "Invoice draft needs review");
    }
    Ok(())
}
