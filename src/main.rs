use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voyage_embedders::{
    document::{read_documents, write_documents},
    ContextualizedEmbedderConfig, DocumentEmbedderConfig, InputType, RankerConfig, Secret,
    TextEmbedderConfig, VoyageContextualizedDocumentEmbedder, VoyageDocumentEmbedder,
    VoyageRanker, VoyageTextEmbedder,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Embed a single string and print the vector
    Embed {
        #[arg(short, long)]
        key: Option<String>,
        #[arg(short, long)]
        string: String,
        #[arg(short, long, default_value = "voyage-2")]
        model: String,
        #[arg(long, value_enum, default_value_t = InputType::Query)]
        input_type: InputType,
    },
    /// Embed a JSONL file of documents into another JSONL file
    EmbedDocuments {
        #[arg(short, long)]
        key: Option<String>,
        #[arg(short, long)]
        input: String,
        #[arg(short, long)]
        output: String,
        #[arg(short, long)]
        model: Option<String>,
        #[arg(short, long, default_value_t = 32)]
        batch_size: usize,
        #[arg(long)]
        metadata_field: Vec<String>,
        /// Embed chunks together with the other chunks of their source document
        #[arg(long)]
        contextualized: bool,
        #[arg(long, default_value = "source_id")]
        source_id_field: String,
    },
    /// Rerank a JSONL file of documents against a query, printing them best first
    Rerank {
        #[arg(short, long)]
        key: Option<String>,
        #[arg(short, long)]
        query: String,
        #[arg(short, long)]
        input: String,
        #[arg(short, long)]
        top_k: Option<usize>,
        #[arg(short, long, default_value = "rerank-2")]
        model: String,
    },
}

fn key_or_env(key: Option<String>) -> Secret {
    key.map(Secret::from_token).unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Embed {
            key,
            string,
            model,
            input_type,
        } => {
            let embedder = VoyageTextEmbedder::new(TextEmbedderConfig {
                api_key: key_or_env(key),
                model,
                input_type: Some(input_type),
                ..Default::default()
            })?;
            let result = embedder.run(&string).await?;
            info!(total_tokens = result.meta.total_tokens, "embedded string");
            println!("{}", json!(result.embedding));
        }
        Commands::EmbedDocuments {
            key,
            input,
            output,
            model,
            batch_size,
            metadata_field,
            contextualized,
            source_id_field,
        } => {
            let documents = read_documents(BufReader::new(File::open(&input)?))?;
            info!(documents = documents.len(), input = %input, "read documents");
            let result = if contextualized {
                let defaults = ContextualizedEmbedderConfig::default();
                let embedder =
                    VoyageContextualizedDocumentEmbedder::new(ContextualizedEmbedderConfig {
                        api_key: key_or_env(key),
                        model: model.unwrap_or_else(|| defaults.model.clone()),
                        batch_size,
                        metadata_fields_to_embed: metadata_field,
                        source_id_field,
                        ..defaults
                    })?;
                embedder.run(documents).await?
            } else {
                let defaults = DocumentEmbedderConfig::default();
                let embedder = VoyageDocumentEmbedder::new(DocumentEmbedderConfig {
                    api_key: key_or_env(key),
                    model: model.unwrap_or_else(|| defaults.model.clone()),
                    batch_size,
                    metadata_fields_to_embed: metadata_field,
                    ..defaults
                })?;
                embedder.run(documents).await?
            };

            let mut writer = BufWriter::new(File::create(&output)?);
            write_documents(&mut writer, &result.documents)?;
            writer.flush()?;
            info!(
                documents = result.documents.len(),
                total_tokens = result.meta.total_tokens,
                output = %output,
                "wrote embedded documents"
            );
        }
        Commands::Rerank {
            key,
            query,
            input,
            top_k,
            model,
        } => {
            let documents = read_documents(BufReader::new(File::open(&input)?))?;
            let ranker = VoyageRanker::new(RankerConfig {
                api_key: key_or_env(key),
                model,
                ..Default::default()
            })?;
            let result = ranker.run(&query, documents, top_k).await?;
            info!(total_tokens = result.meta.total_tokens, "reranked documents");
            write_documents(io::stdout().lock(), &result.documents)?;
        }
    }

    Ok(())
}
