//! tenk-rag command line
//!
//! Run with: cargo run -p tenk-rag -- <command>

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tenk_rag::chat::ChatSession;
use tenk_rag::config::AnswerStrategy;
use tenk_rag::generation::{context_preview, render_answer, Answerer};
use tenk_rag::ingestion::{
    chunk_dir, convert_dir, BatchReport, EdgarClient, FilingNormalizer, SectionChunker,
};
use tenk_rag::providers::Models;
use tenk_rag::retrieval::{IndexStore, Indexer, Retriever};
use tenk_rag::RagConfig;

#[derive(Parser, Debug)]
#[command(
    name = "tenk-rag",
    version,
    about = "Ask questions about SEC 10-K filings and get cited answers"
)]
struct Cli {
    /// TOML configuration file; defaults apply to anything it omits
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download 10-K filings from SEC EDGAR
    Fetch {
        /// Output directory for `{TICKER}/*.htm`
        #[arg(long)]
        raw_dir: Option<PathBuf>,
        /// Tickers to download (comma separated)
        #[arg(long, value_delimiter = ',')]
        tickers: Vec<String>,
        /// Filing years to keep (comma separated)
        #[arg(long, value_delimiter = ',')]
        years: Vec<i32>,
    },
    /// Convert raw HTML filings to normalized text
    Convert {
        #[arg(long)]
        raw_dir: Option<PathBuf>,
        #[arg(long)]
        txt_dir: Option<PathBuf>,
    },
    /// Split normalized text into labeled chunks
    Chunk {
        #[arg(long)]
        txt_dir: Option<PathBuf>,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Drop chunks with fewer words
        #[arg(long)]
        min_words: Option<usize>,
        /// Paragraph length that lets a blank line end a chunk
        #[arg(long)]
        max_chars: Option<usize>,
    },
    /// Embed chunks into the vector index
    Index {
        #[arg(long)]
        chunks_dir: Option<PathBuf>,
        #[arg(long)]
        index_path: Option<PathBuf>,
        #[arg(long)]
        metadata_path: Option<PathBuf>,
    },
    /// Answer one question
    Ask {
        question: String,
        /// Restrict to one ticker
        #[arg(long)]
        company: Option<String>,
        /// Summarize with the LLM instead of extracting a span
        #[arg(long)]
        summary: bool,
        /// Print the context the answer came from
        #[arg(long)]
        show_context: bool,
    },
    /// Interactive question loop
    Chat {
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        summary: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tenk_rag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => RagConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RagConfig::default(),
    };

    match cli.command {
        Command::Fetch {
            raw_dir,
            tickers,
            years,
        } => {
            if !tickers.is_empty() {
                config.edgar.tickers = tickers;
            }
            if !years.is_empty() {
                config.edgar.years = years;
            }
            let raw_dir = raw_dir.unwrap_or(config.paths.raw_dir);
            let client = EdgarClient::new(&config.edgar)?;
            let report = client.fetch_all(&raw_dir).await;
            print_report("Downloaded", &report);
        }
        Command::Convert { raw_dir, txt_dir } => {
            let raw_dir = raw_dir.unwrap_or(config.paths.raw_dir);
            let txt_dir = txt_dir.unwrap_or(config.paths.txt_dir);
            let normalizer = FilingNormalizer::new(config.normalizer);
            let report = convert_dir(&raw_dir, &txt_dir, &normalizer)?;
            print_report("Converted", &report);
        }
        Command::Chunk {
            txt_dir,
            output_dir,
            min_words,
            max_chars,
        } => {
            if let Some(min_words) = min_words {
                config.chunking.min_chunk_words = min_words;
            }
            if let Some(max_chars) = max_chars {
                config.chunking.max_chunk_chars = max_chars;
            }
            config.validate()?;
            let txt_dir = txt_dir.unwrap_or(config.paths.txt_dir);
            let output_dir = output_dir.unwrap_or(config.paths.chunks_dir);
            let chunker = SectionChunker::new(config.chunking);
            let report = chunk_dir(&txt_dir, &output_dir, &chunker)?;
            print_report("Chunked", &report);
        }
        Command::Index {
            chunks_dir,
            index_path,
            metadata_path,
        } => {
            let chunks_dir = chunks_dir.unwrap_or_else(|| config.paths.chunks_dir.clone());
            let index_path = index_path.unwrap_or_else(|| config.paths.index_path.clone());
            let metadata_path = metadata_path.unwrap_or_else(|| config.paths.metadata_path.clone());
            build_index(&config, &chunks_dir, &index_path, &metadata_path).await?;
        }
        Command::Ask {
            question,
            company,
            summary,
            show_context,
        } => {
            let strategy = strategy(&mut config, summary);
            let answerer = load_answerer(&config).await?;
            let answer = answerer
                .ask(&question, company.as_deref(), strategy)
                .await?;

            println!("{}", render_answer(&answer));
            if show_context {
                if let Some(context) = answer.context() {
                    println!(
                        "\n{}\n{}",
                        style("Context:").dim(),
                        context_preview(context, config.answer.preview_chars)
                    );
                }
            }
        }
        Command::Chat { company, summary } => {
            let strategy = strategy(&mut config, summary);
            let answerer = load_answerer(&config).await?;
            let mut session = ChatSession::new(answerer, strategy, company);
            session
                .run(std::io::stdin().lock(), std::io::stdout())
                .await?;
        }
    }

    Ok(())
}

/// Summary answers need the LLM loaded
fn strategy(config: &mut RagConfig, summary: bool) -> AnswerStrategy {
    if summary {
        config.answer.strategy = AnswerStrategy::Summary;
    }
    if config.answer.strategy == AnswerStrategy::Summary {
        config.llm.enabled = true;
    }
    config.answer.strategy
}

async fn build_index(
    config: &RagConfig,
    chunks_dir: &std::path::Path,
    index_path: &std::path::Path,
    metadata_path: &std::path::Path,
) -> Result<()> {
    let indexer = Indexer::from_config(&config.chunking, &config.embeddings);
    let records = indexer
        .collect(chunks_dir)
        .with_context(|| format!("Failed to read chunks from {}", chunks_dir.display()))?;
    if records.is_empty() {
        bail!("No indexable chunks found in {}", chunks_dir.display());
    }

    let embedder = Models::load_embedder(config).await?;

    let progress = ProgressBar::new(records.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} chunks")?
            .progress_chars("=> "),
    );
    let store = indexer
        .build(records, embedder.as_ref(), |n| progress.set_position(n as u64))
        .await?;
    progress.finish_and_clear();

    store
        .save(index_path, metadata_path)
        .with_context(|| format!("Failed to write {}", index_path.display()))?;
    println!(
        "{} {} chunks from {} companies",
        style("Indexed").green().bold(),
        store.len(),
        store.companies().len()
    );
    Ok(())
}

async fn load_answerer(config: &RagConfig) -> Result<Answerer> {
    let store = IndexStore::open(&config.paths.index_path, &config.paths.metadata_path)
        .with_context(|| {
            format!(
                "Failed to open index {}; run `tenk-rag index` first",
                config.paths.index_path.display()
            )
        })?;
    let models = Models::load(config).await?;

    if store.index().dimensions() != models.embedder.dimensions() {
        bail!(
            "Index has {} dimensions but {} produces {}; rebuild the index",
            store.index().dimensions(),
            models.embedder.name(),
            models.embedder.dimensions()
        );
    }

    let retriever = Retriever::new(
        models.embedder.clone(),
        Arc::new(store),
        config.retrieval.clone(),
    );
    Ok(Answerer::from_models(retriever, &models, config.answer.clone()))
}

fn print_report(verb: &str, report: &BatchReport) {
    let failed = if report.failed > 0 {
        style(format!("{} failed", report.failed)).red().to_string()
    } else {
        "0 failed".to_string()
    };
    println!(
        "{} {} files, {}",
        style(verb).green().bold(),
        report.processed,
        failed
    );
}
