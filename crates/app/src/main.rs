use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use whisperchain_core::{
    discover_pdf_files, load_corpus, read_documents, split_text, BatchPolicy, ChunkingConfig,
    ConversationTurn, LopdfExtractor, PipelineConfig, ProcessSummary, ProviderKind,
    ProviderSettings, RetryPolicy, ScoredChunk, Services, Session, UploadedDocument,
    VectorStoreKind,
};

#[derive(Parser)]
#[command(name = "whisperchain", version, about = "Chat with your PDF documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pipeline: PipelineArgs,

    #[command(flatten)]
    providers: ProviderArgs,
}

#[derive(Args)]
struct PipelineArgs {
    /// Model family for embeddings and answers: hosted (paid), self-hosted (free)
    /// or offline (no network, extractive answers)
    #[arg(long, env = "WHISPERCHAIN_PROVIDER", default_value = "hosted")]
    provider: ProviderKind,

    /// Maximum chunk length in characters
    #[arg(long, default_value_t = 1_000)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, default_value_t = 200)]
    chunk_overlap: usize,

    /// Preferred split point; \n and \t escapes are understood
    #[arg(long, default_value = "\\n")]
    separator: String,

    /// Number of chunks retrieved per question
    #[arg(long, default_value_t = 4)]
    top_k: usize,

    /// Where vectors live: in_memory or managed
    #[arg(long, env = "WHISPERCHAIN_VECTOR_STORE", default_value = "in_memory")]
    vector_store: VectorStoreKind,

    /// Collection name used by the managed vector store
    #[arg(long, env = "WHISPERCHAIN_INDEX_NAME", default_value = "whisperchain")]
    index_name: String,

    /// What to do with unreadable PDFs: abort or skip
    #[arg(long, default_value = "skip")]
    batch_policy: BatchPolicy,

    /// Past turns included in the answer prompt
    #[arg(long, default_value_t = 6)]
    history_window: usize,

    /// Do not rewrite follow-up questions before retrieval
    #[arg(long, default_value_t = false)]
    no_rephrase: bool,

    /// Clear the conversation whenever documents are processed again
    #[arg(long, default_value_t = false)]
    reset_history_on_process: bool,

    /// Texts per embedding request
    #[arg(long, default_value_t = 64)]
    embedding_batch_size: usize,
}

impl PipelineArgs {
    fn to_config(&self) -> PipelineConfig {
        PipelineConfig {
            provider: self.provider,
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            separator: unescape(&self.separator),
            top_k: self.top_k,
            vector_store: self.vector_store,
            index_name: self.index_name.clone(),
            batch_policy: self.batch_policy,
            history_window: self.history_window,
            rephrase_question: !self.no_rephrase,
            reset_history_on_process: self.reset_history_on_process,
            embedding_batch_size: self.embedding_batch_size,
        }
    }
}

#[derive(Args)]
struct ProviderArgs {
    /// OpenAI API key for the hosted provider
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    openai_base_url: String,

    /// Hosted embedding model
    #[arg(long, env = "WHISPERCHAIN_EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    openai_embedding_model: String,

    /// Hosted chat model
    #[arg(long, env = "WHISPERCHAIN_CHAT_MODEL", default_value = "gpt-4o-mini")]
    openai_chat_model: String,

    /// Sampling temperature for answers
    #[arg(long, default_value_t = 0.2)]
    temperature: f32,

    /// Maximum tokens generated per answer
    #[arg(long, default_value_t = 512)]
    max_tokens: u32,

    /// Self-hosted embedding server (text-embeddings-inference)
    #[arg(long, env = "INSTRUCT_EMBEDDING_URL", default_value = "http://127.0.0.1:8080")]
    instruct_embedding_url: String,

    /// Self-hosted embedding model name
    #[arg(long, default_value = "hkunlp/instructor-xl")]
    instruct_embedding_model: String,

    /// Self-hosted generation server (text-generation-inference)
    #[arg(long, env = "INSTRUCT_CHAT_URL", default_value = "http://127.0.0.1:8081")]
    instruct_chat_url: String,

    /// Self-hosted generation model name
    #[arg(long, default_value = "google/flan-t5-xxl")]
    instruct_chat_model: String,

    /// Token for the self-hosted inference servers
    #[arg(long, env = "HUGGINGFACEHUB_API_TOKEN", hide_env_values = true)]
    instruct_api_key: Option<String>,

    /// Managed vector database URL (region-specific cluster endpoint)
    #[arg(long, env = "QDRANT_URL", default_value = "http://127.0.0.1:6333")]
    qdrant_url: String,

    /// Managed vector database API key
    #[arg(long, env = "QDRANT_API_KEY", hide_env_values = true)]
    qdrant_api_key: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Attempts per external call, including the first
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    /// First retry delay in milliseconds, doubled on every further retry
    #[arg(long, default_value_t = 500)]
    retry_base_ms: u64,
}

impl ProviderArgs {
    fn to_settings(&self) -> ProviderSettings {
        let defaults = ProviderSettings::default();
        let base_delay = Duration::from_millis(self.retry_base_ms);
        ProviderSettings {
            openai_api_key: self.openai_api_key.clone(),
            openai_base_url: self.openai_base_url.clone(),
            openai_embedding_model: self.openai_embedding_model.clone(),
            openai_chat_model: self.openai_chat_model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            instruct_embedding_url: self.instruct_embedding_url.clone(),
            instruct_embedding_model: self.instruct_embedding_model.clone(),
            instruct_chat_url: self.instruct_chat_url.clone(),
            instruct_chat_model: self.instruct_chat_model.clone(),
            instruct_api_key: self.instruct_api_key.clone(),
            qdrant_url: self.qdrant_url.clone(),
            qdrant_api_key: self.qdrant_api_key.clone(),
            request_timeout: Duration::from_secs(self.timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                base_delay,
                max_delay: defaults.retry.max_delay.max(base_delay),
            },
            ..defaults
        }
    }
}

#[derive(Args)]
struct DocumentArgs {
    /// PDF file to load; repeat for several, order is kept
    #[arg(long = "pdf")]
    pdfs: Vec<PathBuf>,

    /// Folder searched recursively for PDFs
    #[arg(long)]
    folder: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive session: process documents, then ask questions.
    Chat {
        #[command(flatten)]
        documents: DocumentArgs,
        /// Print the retrieved chunks after every answer.
        #[arg(long, default_value_t = false)]
        show_sources: bool,
    },
    /// Process documents and answer a single question.
    Ask {
        #[command(flatten)]
        documents: DocumentArgs,
        /// Question to answer
        #[arg(long)]
        question: String,
        /// Print the retrieved chunks after the answer.
        #[arg(long, default_value_t = false)]
        show_sources: bool,
    },
    /// Extract and chunk documents without calling any service.
    Chunks {
        #[command(flatten)]
        documents: DocumentArgs,
        /// Number of chunks to print.
        #[arg(long, default_value_t = 3)]
        preview: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.pipeline.to_config();
    config.validate()?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        provider = %config.provider,
        vector_store = %config.vector_store,
        "whisperchain boot"
    );

    match cli.command {
        Command::Chunks { documents, preview } => {
            let uploaded = collect_documents(&documents.pdfs, documents.folder.as_ref())?;
            let report = load_corpus(&uploaded, &LopdfExtractor, config.batch_policy)?;
            for skipped in &report.skipped {
                println!("skipped {}: {}", skipped.filename, skipped.reason);
            }
            for coverage in &report.coverage {
                println!(
                    "{}: {} page(s), {} without text, {} chars, sha256={}",
                    coverage.filename,
                    coverage.page_count,
                    coverage.pages_without_text(),
                    coverage.extracted_chars,
                    coverage.checksum
                );
            }

            let chunks = split_text(&report.corpus, &ChunkingConfig::from(&config))?;
            println!("{} chunk(s) from {} chars", chunks.len(), report.corpus.chars().count());
            for chunk in chunks.iter().take(preview) {
                println!(
                    "--- chunk {} (start={}, len={}) ---\n{}",
                    chunk.index,
                    chunk.start,
                    chunk.char_len(),
                    chunk.text
                );
            }
        }
        Command::Ask {
            documents,
            question,
            show_sources,
        } => {
            let mut session = open_session(config, &cli.providers)?;
            let uploaded = collect_documents(&documents.pdfs, documents.folder.as_ref())?;
            let summary = session.process(&uploaded).await?;
            print_summary(&summary);

            let turns = session.ask(&question).await?;
            print_turns(turns);
            if show_sources {
                print_sources(session.last_sources());
            }
        }
        Command::Chat {
            documents,
            show_sources,
        } => {
            let mut session = open_session(config, &cli.providers)?;
            if !documents.pdfs.is_empty() || documents.folder.is_some() {
                let uploaded = collect_documents(&documents.pdfs, documents.folder.as_ref())?;
                match session.process(&uploaded).await {
                    Ok(summary) => print_summary(&summary),
                    Err(error) => println!("error: {error}"),
                }
            }
            run_repl(&mut session, show_sources).await?;
        }
    }

    Ok(())
}

fn open_session(config: PipelineConfig, providers: &ProviderArgs) -> anyhow::Result<Session> {
    let settings = providers.to_settings();
    let services = Services::from_config(&config, &settings)
        .context("provider configuration is incomplete")?;
    let session = Session::new(config, services)?;
    info!(session = %session.id(), "session started");
    Ok(session)
}

fn collect_documents(
    pdfs: &[PathBuf],
    folder: Option<&PathBuf>,
) -> anyhow::Result<Vec<UploadedDocument>> {
    let mut paths = Vec::new();
    for path in pdfs {
        if path.is_dir() {
            paths.extend(discover_pdf_files(path));
        } else {
            paths.push(path.clone());
        }
    }
    if let Some(folder) = folder {
        paths.extend(discover_pdf_files(folder));
    }

    if paths.is_empty() {
        bail!("no pdf files given; use --pdf <file> or --folder <dir>");
    }
    Ok(read_documents(&paths)?)
}

const HELP: &str = "commands:
  /process <pdf or folder>...  extract, chunk and index documents
  /history                     show the whole conversation
  /sources                     show chunks behind the last answer
  /info                        describe the current index
  /reset                       forget the conversation
  /quit                        leave
anything else is asked as a question";

async fn run_repl(session: &mut Session, show_sources: bool) -> anyhow::Result<()> {
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "/quit" | "/exit" => break,
            "/help" => println!("{HELP}"),
            "/history" => print_turns(session.history()),
            "/sources" => print_sources(session.last_sources()),
            "/reset" => {
                session.reset_history();
                println!("conversation cleared");
            }
            "/info" => match session.index_info() {
                Some(info) => println!(
                    "index: {} chunk(s), {} dims, embedder={}, store={}{}, built {}",
                    info.chunk_count,
                    info.dimensions,
                    info.embedder,
                    info.store,
                    info.index_name
                        .as_ref()
                        .map(|name| format!(" ({name})"))
                        .unwrap_or_default(),
                    info.built_at.to_rfc3339()
                ),
                None => println!("no index yet; use /process"),
            },
            "/process" => {
                let paths = rest.split_whitespace().map(PathBuf::from).collect::<Vec<_>>();
                let uploaded = match collect_documents(&paths, None) {
                    Ok(uploaded) => uploaded,
                    Err(error) => {
                        println!("error: {error}");
                        continue;
                    }
                };
                match session.process(&uploaded).await {
                    Ok(summary) => print_summary(&summary),
                    Err(error) => println!("error: {error}"),
                }
            }
            _ => match session.ask(line).await {
                Ok(turns) => {
                    let start = turns.len().saturating_sub(2);
                    print_turns(&turns[start..]);
                    if show_sources {
                        print_sources(session.last_sources());
                    }
                }
                Err(error) => {
                    warn!(error = %error, "question failed");
                    println!("error: {error}");
                }
            },
        }
    }

    Ok(())
}

fn print_summary(summary: &ProcessSummary) {
    for skipped in &summary.skipped {
        println!("skipped {}: {}", skipped.filename, skipped.reason);
    }
    for coverage in &summary.coverage {
        let blank = coverage.pages_without_text();
        if blank > 0 {
            println!(
                "{}: {} of {} page(s) have no extractable text (scanned?)",
                coverage.filename, blank, coverage.page_count
            );
        } else {
            println!("{}: {} page(s)", coverage.filename, coverage.page_count);
        }
    }
    println!(
        "indexed {} chunk(s) from {} chars with {}",
        summary.index.chunk_count, summary.corpus_chars, summary.index.embedder
    );
}

fn print_turns(turns: &[ConversationTurn]) {
    for turn in turns {
        println!("{}: {}", turn.role, turn.text);
    }
}

fn print_sources(sources: &[ScoredChunk]) {
    for (position, chunk) in sources.iter().enumerate() {
        println!(
            "[{}] score={:.4} chunk={} source={}\n{}",
            position + 1,
            chunk.score,
            chunk.id,
            chunk.source,
            chunk.text.trim()
        );
    }
}

fn unescape(value: &str) -> String {
    value.replace("\\n", "\n").replace("\\t", "\t")
}
