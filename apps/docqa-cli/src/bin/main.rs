use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use docqa_core::config::{Config, Settings};
use docqa_core::data_processor::DataProcessor;
use docqa_core::traits::Generator;
use docqa_core::types::{Answer, DocumentId};
use docqa_embed::EmbeddingGateway;
use docqa_hybrid::{build_engine, generator_from_settings, AnswerPipeline, RetrievalEngine};

const USAGE: &str = "Usage: docqa-cli <ask|repl|stats> <data_dir> [\"<question>\"] [--doc <id>]... [--json]";

struct Args {
    cmd: String,
    data_dir: PathBuf,
    question: Option<String>,
    documents: Vec<DocumentId>,
    json: bool,
}

fn usage_exit(msg: &str) -> ! {
    eprintln!("{msg}\n{USAGE}");
    std::process::exit(1)
}

fn parse_args() -> Args {
    let mut args = env::args().skip(1);
    let cmd = args.next().unwrap_or_else(|| usage_exit("missing command"));
    if !matches!(cmd.as_str(), "ask" | "repl" | "stats") {
        usage_exit(&format!("unknown command: {cmd}"));
    }
    let data_dir = args.next().map(PathBuf::from).unwrap_or_else(|| usage_exit("missing data directory"));
    let mut parsed = Args { cmd, data_dir, question: None, documents: Vec::new(), json: false };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--doc" => match args.next().and_then(|v| v.parse::<DocumentId>().ok()) {
                Some(id) => parsed.documents.push(id),
                None => usage_exit("--doc requires a numeric document id"),
            },
            "--json" => parsed.json = true,
            _ if !arg.starts_with('-') && parsed.question.is_none() => parsed.question = Some(arg),
            other => usage_exit(&format!("unexpected argument: {other}")),
        }
    }
    if parsed.cmd == "ask" && parsed.question.is_none() {
        usage_exit("ask requires a question");
    }
    parsed
}

/// Indexes every `.txt` file under `data_dir`; document ids start at 1.
async fn ingest(settings: &Settings, data_dir: &Path, engine: &RetrievalEngine) -> anyhow::Result<()> {
    let processor = DataProcessor::with_config(settings.chunking.clone());
    let documents = processor.process_directory(data_dir, 1)?;
    for doc in &documents {
        engine.add_documents(&doc.chunks).await?;
        info!(document_id = doc.document_id, path = %doc.path.display(), chunks = doc.chunks.len(), "indexed file");
    }
    let stats = engine.stats();
    info!(documents = documents.len(), vectors = stats.vector_count, lexical = stats.lexical_chunk_count, "ingest complete");
    Ok(())
}

fn print_answer(answer: &Answer, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(answer)?);
        return Ok(());
    }
    println!("\n{}\n", answer.answer);
    for (source, snippet) in answer.sources.iter().zip(&answer.source_snippets) {
        println!("  - {source}: {snippet}");
    }
    let embed = answer.embed_mode.map_or("n/a", |m| m.as_str());
    print!("[{:?} | {:?} | embed {} | {} ms", answer.answer_type, answer.selection, embed, answer.latency_ms);
    match &answer.fallback_reason {
        Some(reason) => println!(" | fallback: {reason}]"),
        None => println!("]"),
    }
    Ok(())
}

fn print_stats(engine: &RetrievalEngine, gateway: &EmbeddingGateway) {
    let stats = engine.stats();
    let health = gateway.health();
    println!("vectors: {}  lexical chunks: {}", stats.vector_count, stats.lexical_chunk_count);
    println!(
        "embedder: {}  model vectors: {}  fallback vectors: {}",
        health.model_id.as_deref().unwrap_or("hash"),
        health.model_vectors,
        health.fallback_vectors
    );
    if let (Some(err), Some(at)) = (&health.last_error, health.last_error_at) {
        println!("last embedding error at {}: {err}", at.to_rfc3339());
    }
}

async fn repl(pipeline: &AnswerPipeline, gateway: &EmbeddingGateway, json: bool) -> anyhow::Result<()> {
    println!("Ask a question, or :stats, :delete <id>, :reset, :quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line.split_whitespace().collect::<Vec<_>>().as_slice() {
            [] => continue,
            [":quit"] | [":q"] => break,
            [":stats"] => print_stats(pipeline.engine(), gateway),
            [":reset"] => {
                pipeline.engine().reset().await?;
                println!("indexes cleared");
            }
            [":delete", id] => match id.parse::<DocumentId>() {
                Ok(id) => {
                    let removed = pipeline.engine().delete_document(id).await?;
                    println!("removed {removed} chunks of document {id}");
                }
                Err(_) => eprintln!("not a document id: {id}"),
            },
            [cmd, ..] if cmd.starts_with(':') => eprintln!("unknown command: {cmd}"),
            _ => print_answer(&pipeline.ask(line, &[]).await, json)?,
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    let settings = Config::load()
        .and_then(|c| c.settings())
        .map_err(|e| {
            eprintln!("Error loading config: {e}");
            e
        })?;

    let (engine, gateway) = build_engine(&settings).await?;
    ingest(&settings, &args.data_dir, &engine).await?;
    let generator = generator_from_settings(&settings.generation)?;
    info!(generator = generator.name(), "answer generator ready");

    match args.cmd.as_str() {
        "ask" => {
            let question = args.question.as_deref().unwrap_or_default();
            let pipeline = AnswerPipeline::new(Arc::clone(&engine), Arc::clone(&generator));
            print_answer(&pipeline.ask(question, &args.documents).await, args.json)?;
        }
        "repl" => {
            let pipeline = AnswerPipeline::new(Arc::clone(&engine), Arc::clone(&generator));
            repl(&pipeline, &gateway, args.json).await?;
        }
        "stats" => print_stats(&engine, &gateway),
        other => usage_exit(&format!("unknown command: {other}")),
    }
    Ok(())
}
