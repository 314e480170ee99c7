use chrono::Utc;
use clap::{Parser, Subcommand};
use doc_chat_core::{
    ChatModelConfig, IndexStore, OpenAiCompatModel, RagCoordinator,
};
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "doc-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding index configs and vector index blobs
    #[arg(long, default_value = "./doc-chat-data")]
    data_dir: String,

    /// OpenAI-compatible chat completions endpoint
    #[arg(long, env = "CHAT_MODEL_ENDPOINT", default_value = "http://localhost:11434")]
    chat_endpoint: String,

    /// API key for the chat endpoint
    #[arg(long, env = "CHAT_MODEL_API_KEY")]
    chat_api_key: Option<String>,

    /// Model name requested from the endpoint
    #[arg(long, env = "CHAT_MODEL_NAME", default_value = "mistral-small")]
    chat_model: String,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a PDF or DOCX file and build its vector index.
    Ingest {
        /// Path to the document.
        #[arg(long)]
        file: String,
    },
    /// List all indexed documents in ingestion order.
    List,
    /// Delete an index and its config. Unknown ids are a no-op.
    Delete {
        #[arg(long)]
        index_id: String,
    },
    /// Detect (and cache) the dominant language of a document.
    DetectLanguage {
        #[arg(long)]
        index_id: String,
    },
    /// Summarize a document according to its language.
    Summarize {
        #[arg(long)]
        index_id: String,
    },
    /// Translate the first page to French and summarize it.
    SummarizeFirstPageFr {
        #[arg(long)]
        index_id: String,
    },
    /// Ask a question grounded in one or more indexed documents.
    Ask {
        /// The question to answer.
        #[arg(long)]
        question: String,
        /// Index id to search; repeat the flag to widen the scope.
        #[arg(long = "index")]
        indices: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let store = Arc::new(
        IndexStore::open(&cli.data_dir).map_err(|error| anyhow::anyhow!(error.to_string()))?,
    );
    let model = Arc::new(OpenAiCompatModel::new(ChatModelConfig {
        endpoint: cli.chat_endpoint.trim_end_matches('/').to_string(),
        api_key: cli.chat_api_key.clone(),
        model: cli.chat_model.clone(),
    }));
    let coordinator = RagCoordinator::new(store, model);

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "doc-chat boot"
    );

    match cli.command {
        Command::Ingest { file } => {
            let config = coordinator
                .create_vector_store_index(Path::new(&file))
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!(
                "indexed {} as {} at {}",
                config.document_name(),
                config.index_id,
                config.created_at.to_rfc3339()
            );
        }
        Command::List => {
            let configs = coordinator.list_vector_store_index().await;
            if configs.is_empty() {
                println!("no documents indexed yet");
            }
            for config in configs {
                println!(
                    "[{}] {} ingested_at={} language={}",
                    config.index_id,
                    config.document_name(),
                    config.created_at.to_rfc3339(),
                    config.language.as_deref().unwrap_or("?")
                );
            }
        }
        Command::Delete { index_id } => {
            coordinator
                .delete_vector_store_index(&index_id)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("deleted {index_id}");
        }
        Command::DetectLanguage { index_id } => {
            let language = coordinator
                .detect_document_language(&index_id)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("{language}");
        }
        Command::Summarize { index_id } => {
            let summary = coordinator
                .summarize_document_index(&index_id)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("{summary}");
        }
        Command::SummarizeFirstPageFr { index_id } => {
            let summary = coordinator
                .translate_and_summarize_first_page_fr(&index_id)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("{summary}");
        }
        Command::Ask { question, indices } => {
            if indices.is_empty() {
                anyhow::bail!("select at least one index with --index");
            }

            let (mut tokens, sources) = coordinator
                .complete_chat(&question, &[], &indices)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            let mut stdout = std::io::stdout();
            while let Some(token) = tokens.next_token().await {
                let token = token.map_err(|error| anyhow::anyhow!(error.to_string()))?;
                print!("{token}");
                stdout.flush()?;
            }
            println!();

            for source in sources {
                println!(
                    "source: index={} chunk={} page={} score={:.4}",
                    source.index_id, source.chunk_offset, source.source_page, source.score
                );
            }
        }
    }

    Ok(())
}
