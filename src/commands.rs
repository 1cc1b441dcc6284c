use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::dataset::load_dataset;
use crate::documents::build_documents;
use crate::llm::OpenAiClient;
use crate::query::QueryEngine;
use crate::session::{
    ChatSession, KnowledgeBase, LoadState, NOT_LOADED_MESSAGE, SubmitOutcome, load_knowledge_base,
};

fn indexing_progress() -> ProgressBar {
    if console::user_attended_stderr() {
        ProgressBar::new(0).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding records {wide_bar}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        )
    } else {
        ProgressBar::hidden()
    }
}

fn load_client(config_dir: &Path) -> Result<(Config, OpenAiClient)> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    if config.api_key().is_none() {
        warn!(
            "{} is not set; requests are sent without an API key",
            config.service.api_key_env
        );
    }
    let client = OpenAiClient::new(&config).context("Failed to create service client")?;
    Ok((config, client))
}

fn knowledge_state(
    knowledge: &KnowledgeBase,
    config: &Config,
    client: &OpenAiClient,
) -> Arc<LoadState> {
    knowledge.get_or_load(|| load_knowledge_base(config, client, indexing_progress()))
}

fn print_not_loaded(reason: &str) {
    println!("{}", style(NOT_LOADED_MESSAGE).red());
    eprintln!("  {}", style(reason).dim());
}

/// Interactive question loop over the configured dataset
#[inline]
pub fn chat(config_dir: &Path) -> Result<()> {
    let (config, client) = load_client(config_dir)?;
    let knowledge = KnowledgeBase::new();
    let state = knowledge_state(&knowledge, &config, &client);

    println!("{}", style("📊 Table RAG Chat").bold().cyan());
    if let Some(reason) = state.failure() {
        print_not_loaded(reason);
    } else {
        println!(
            "Loaded {} records from {}",
            style(state.records()).cyan(),
            style(config.dataset.path.display()).cyan()
        );
    }
    println!(
        "{}",
        style("Type a question, /reset to clear the conversation, /quit to leave.").dim()
    );
    println!();

    let mut session = ChatSession::new(state, &client, &client, config.retrieval.top_k);

    loop {
        let line: String = match Input::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()
        {
            Ok(line) => line,
            Err(e) => {
                info!("Input closed: {}", e);
                break;
            }
        };

        match line.trim() {
            "/quit" | "/exit" => break,
            "/reset" => {
                session.reset();
                println!("{}", style("Conversation cleared.").yellow());
                continue;
            }
            _ => {}
        }

        match session.submit(&line) {
            SubmitOutcome::Ignored => {}
            SubmitOutcome::NotLoaded(reason) => print_not_loaded(&reason),
            SubmitOutcome::Answered(answer) => {
                println!("{} {}", style("Assistant:").bold().green(), answer);
                println!();
            }
            SubmitOutcome::Failed(apology) => {
                println!("{} {}", style("Assistant:").bold().red(), apology);
                println!();
            }
        }
    }

    println!(
        "Answered {} questions since {}",
        session.query_count(),
        session.started_at().format("%Y-%m-%d %H:%M:%S")
    );
    Ok(())
}

/// Answer a single question and print the answer to stdout.
///
/// A blank question is ignored before any file or service access.
#[inline]
pub fn ask(
    config_dir: &Path,
    question: &str,
    top_k: Option<usize>,
    show_context: bool,
) -> Result<()> {
    if question.trim().is_empty() {
        info!("Ignoring blank question");
        return Ok(());
    }

    let (config, client) = load_client(config_dir)?;
    let knowledge = KnowledgeBase::new();
    let state = knowledge_state(&knowledge, &config, &client);

    let Some(bundle) = state.bundle() else {
        anyhow::bail!(
            "{} ({})",
            NOT_LOADED_MESSAGE,
            state.failure().unwrap_or_default()
        );
    };

    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    let engine = QueryEngine::new(&client, &client);

    let retrieved = engine
        .retrieve(question, bundle, top_k)
        .context("Failed to retrieve context")?;

    if show_context {
        eprintln!("{}", style("Context:").bold().yellow());
        for item in &retrieved {
            eprintln!(
                "  [row {} | distance {:.4}] {}",
                item.document.row_index, item.distance, item.document.text
            );
        }
        eprintln!();
    }

    let answer = engine
        .answer_from(question, &retrieved)
        .context("Failed to answer question")?;
    println!("{}", answer);

    Ok(())
}

/// Print the flattened documents without contacting the service
#[inline]
pub fn list_documents(config_dir: &Path, limit: Option<usize>) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    let dataset = load_dataset(&config.dataset.path, config.dataset.sheet.as_deref())
        .with_context(|| format!("Failed to load {}", config.dataset.path.display()))?;
    let documents = build_documents(&dataset);

    if documents.is_empty() {
        println!("The dataset has no rows.");
        return Ok(());
    }

    let shown = limit.unwrap_or(documents.len()).min(documents.len());
    for document in documents.iter().take(shown) {
        println!("{:>4}  {}", style(document.row_index).dim(), document.text);
    }
    if shown < documents.len() {
        println!();
        println!("... {} more rows", documents.len() - shown);
    }

    Ok(())
}

/// Summarise configuration, dataset and endpoint without building the index
#[inline]
pub fn show_status(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).unwrap_or_else(|e| {
        warn!("Using default configuration: {:#}", e);
        Config {
            base_dir: config_dir.to_path_buf(),
            ..Config::default()
        }
    });

    println!("📊 Table RAG Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("⚙️  Configuration:");
    let config_path = config.config_file_path();
    if config_path.exists() {
        println!("   ✅ Config file: {}", config_path.display());
    } else {
        println!("   ⚠️  Config file: {} (using defaults)", config_path.display());
    }

    println!();
    println!("📄 Dataset Status:");
    println!("   Path: {}", config.dataset.path.display());
    match load_dataset(&config.dataset.path, config.dataset.sheet.as_deref()) {
        Ok(dataset) => {
            println!("   ✅ Records: {}", dataset.len());
            println!("   📋 Columns: {}", dataset.columns().join(", "));
        }
        Err(e) => {
            println!("   ❌ Failed to load - {}", e);
        }
    }

    println!();
    println!("🤖 Service Status:");
    println!("   Flavor: {}", config.service.flavor);
    match config.endpoint_url() {
        Ok(url) => println!("   ✅ Endpoint: {}", url),
        Err(e) => println!("   ❌ Endpoint: {}", e),
    }
    println!("   📋 Embedding Model: {}", config.service.embedding_model);
    println!("   💬 Chat Model: {}", config.service.chat_model);
    if config.api_key().is_some() {
        println!("   🔑 API Key: set ({})", config.service.api_key_env);
    } else {
        println!("   ⚠️  API Key: {} is not set", config.service.api_key_env);
    }

    println!();
    println!("🔍 Retrieval:");
    println!("   Max Neighbors: {}", config.retrieval.max_neighbors);
    println!("   Top K: {}", config.retrieval.top_k);

    Ok(())
}
