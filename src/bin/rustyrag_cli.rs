//! Command-line front end for the question-answering pipeline.
//!
//! Runs the same pipeline as the HTTP server against local files, which is handy for scripting
//! and for inspecting the persisted index without starting a server.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use rustyrag::{
    config, logging,
    index::IndexStorage,
    processing::{Pipeline, PipelineRequest},
    protocol::ChatTurn,
};
use serde_json::json;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "rustyrag-cli",
    about = "Ask questions about local documents and manage the vector index"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest documents and answer a question about them.
    Ask {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long)]
        query: String,
        /// JSON file holding prior turns as `[{"query": ..., "answer": ...}]`.
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Replace the vector index with the given documents.
    Rebuild {
        #[command(flatten)]
        inputs: Inputs,
    },
    /// Print the persisted index manifest.
    Stats,
}

#[derive(Args)]
struct Inputs {
    /// Document to ingest; repeatable.
    #[arg(long = "file")]
    files: Vec<PathBuf>,
    /// Directory whose files are ingested recursively; repeatable.
    #[arg(long = "dir")]
    dirs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();

    match cli.command {
        Command::Ask {
            inputs,
            query,
            history,
        } => {
            let file_paths = collect_files(&inputs)?;
            let history = match history {
                Some(path) => read_history(&path)?,
                None => Vec::new(),
            };
            let pipeline = Pipeline::from_config(config)
                .await
                .context("failed to initialize pipeline")?;
            let envelope = pipeline
                .run(PipelineRequest {
                    file_paths,
                    query,
                    history,
                })
                .await
                .context("pipeline run failed")?;
            print_json(&envelope)
        }
        Command::Rebuild { inputs } => {
            let file_paths = collect_files(&inputs)?;
            let pipeline = Pipeline::from_config(config)
                .await
                .context("failed to initialize pipeline")?;
            let outcome = pipeline
                .rebuild(file_paths)
                .await
                .context("index rebuild failed")?;
            print_json(&outcome)
        }
        Command::Stats => {
            let storage = IndexStorage::new(&config.vector_store_dir);
            let persisted = storage.load().await.with_context(|| {
                format!("failed to read index at {}", storage.dir().display())
            })?;
            match persisted {
                Some(persisted) => print_json(&persisted.manifest),
                None => print_json(&json!({ "present": false })),
            }
        }
    }
}

/// Expand `--file` and `--dir` arguments into an ordered list of file paths.
fn collect_files(inputs: &Inputs) -> Result<Vec<String>> {
    let mut paths: Vec<String> = inputs
        .files
        .iter()
        .map(|path| path.to_string_lossy().into_owned())
        .collect();

    for dir in &inputs.dirs {
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry =
                entry.with_context(|| format!("failed to walk directory {}", dir.display()))?;
            if entry.file_type().is_file() {
                paths.push(entry.path().to_string_lossy().into_owned());
            }
        }
    }

    if paths.is_empty() {
        bail!("no input documents; pass --file or --dir");
    }
    Ok(paths)
}

fn read_history(path: &Path) -> Result<Vec<ChatTurn>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read history at {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse history json at {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}
