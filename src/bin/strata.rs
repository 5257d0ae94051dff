//! Strata CLI
//!
//! Ingest PDFs into per-document collections and answer questions against
//! them. Output is JSON on stdout; diagnostics go to stderr via tracing.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use strata::{
    CollectionLocks, ChromaIndex, IngestPipeline, LongestAnswer, NodeStore, OpenAiClient,
    PdfTextExtractor, PipelineConfig, QueryEngine, QueryOutcome, VectorIndex,
};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Hierarchical RAG over PDF documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a PDF file or every PDF in a directory
    Ingest {
        /// File or directory; defaults to the configured PDF directory
        path: Option<PathBuf>,
    },
    /// Ask a question
    Query {
        /// The question to answer
        question: String,
        /// Query one collection instead of fanning out to all
        #[arg(short, long)]
        collection: Option<String>,
        /// With fan-out, print every collection's answer instead of the best
        #[arg(long)]
        all: bool,
    },
    /// List collections and their node-store status
    Collections,
}

#[derive(Serialize)]
struct IngestOutput {
    succeeded: Vec<IngestItem>,
    failed: Vec<FailedItem>,
}

#[derive(Serialize)]
struct IngestItem {
    collection: String,
    pages: usize,
    segments: usize,
    leaves: usize,
}

#[derive(Serialize)]
struct FailedItem {
    file: String,
    error: String,
}

#[derive(Serialize)]
struct QueryOutput {
    collection: String,
    answer: String,
    context_units: usize,
    used_auto_merging: bool,
}

#[derive(Serialize)]
struct CollectionOutput {
    name: String,
    has_node_store: bool,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = run(cli).await;

    match result {
        Ok(json) => println!("{}", json),
        Err(e) => {
            let error = ErrorOutput { error: e.to_string() };
            println!("{}", serde_json::to_string(&error).unwrap_or_default());
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<String> {
    let config = Arc::new(PipelineConfig::from_env()?);
    let index = Arc::new(ChromaIndex::new(&config.chroma_url));
    let locks = Arc::new(CollectionLocks::new());

    match cli.command {
        Commands::Ingest { path } => {
            config.validate()?;
            let client = Arc::new(OpenAiClient::new(&config)?);
            let pipeline = IngestPipeline::new(
                Arc::clone(&config),
                PdfTextExtractor,
                client.clone(),
                client,
                index,
                locks,
            );

            let target = path.unwrap_or_else(|| config.pdf_dir.clone());
            let report = if target.is_dir() {
                pipeline.ingest_dir(&target).await?
            } else {
                let summary = pipeline.ingest_file(&target).await?;
                strata::IngestReport {
                    succeeded: vec![summary],
                    failed: vec![],
                }
            };

            let output = IngestOutput {
                succeeded: report
                    .succeeded
                    .into_iter()
                    .map(|s| IngestItem {
                        collection: s.collection,
                        pages: s.pages,
                        segments: s.segments,
                        leaves: s.leaves,
                    })
                    .collect(),
                failed: report
                    .failed
                    .into_iter()
                    .map(|(file, error)| FailedItem {
                        file: file.display().to_string(),
                        error,
                    })
                    .collect(),
            };
            Ok(serde_json::to_string_pretty(&output)?)
        }

        Commands::Query {
            question,
            collection,
            all,
        } => {
            config.validate()?;
            let client = Arc::new(OpenAiClient::new(&config)?);
            let engine = QueryEngine::new(
                Arc::clone(&config),
                client.clone(),
                client,
                index,
                locks,
            );

            if let Some(name) = collection {
                let outcome = engine.query_collection(&name, &question).await?;
                Ok(serde_json::to_string_pretty(&query_output(outcome))?)
            } else if all {
                let results = engine.query_all(&question).await?;
                let items: Vec<serde_json::Value> = results
                    .into_iter()
                    .map(|(name, result)| match result {
                        Ok(outcome) => serde_json::json!(query_output(outcome)),
                        Err(error) => serde_json::json!({ "collection": name, "error": error }),
                    })
                    .collect();
                Ok(serde_json::to_string_pretty(&items)?)
            } else {
                let outcome = engine.query_best(&question, &LongestAnswer).await?;
                Ok(serde_json::to_string_pretty(&query_output(outcome))?)
            }
        }

        Commands::Collections => {
            let names = index.list_collections().await?;
            let items: Vec<CollectionOutput> = names
                .into_iter()
                .map(|name| CollectionOutput {
                    has_node_store: NodeStore::exists(&config.docstore_dir, &name),
                    name,
                })
                .collect();
            Ok(serde_json::to_string_pretty(&items)?)
        }
    }
}

fn query_output(outcome: QueryOutcome) -> QueryOutput {
    QueryOutput {
        collection: outcome.collection,
        answer: outcome.answer,
        context_units: outcome.context.units.len(),
        used_auto_merging: outcome.context.used_auto_merging,
    }
}
