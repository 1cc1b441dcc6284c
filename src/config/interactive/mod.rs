
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{ApiFlavor, Config, ConfigError, DatasetConfig, RetrievalConfig, ServiceConfig};

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Table RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Service Configuration").bold().yellow());
    eprintln!("Configure the embedding and chat-completion endpoint.");
    eprintln!();

    configure_service(&mut config.service)?;

    eprintln!();
    eprintln!("{}", style("Dataset & Retrieval").bold().yellow());
    configure_dataset(&mut config.dataset)?;
    configure_retrieval(&mut config.retrieval)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if config.dataset.path.exists() {
        eprintln!("{}", style("✓ Dataset file found!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Dataset file not found").yellow()
        );
        eprintln!("You can continue, but the data will not load until the file exists.");
    }

    if config.api_key().is_none() {
        eprintln!(
            "{}",
            style(format!(
                "⚠ Warning: {} is not set; requests will be sent without an API key",
                config.service.api_key_env
            ))
            .yellow()
        );
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Service Settings:").bold().yellow());
    eprintln!("  Flavor: {}", style(config.service.flavor).cyan());
    match config.endpoint_url() {
        Ok(url) => eprintln!("  Endpoint: {}", style(url).cyan()),
        Err(e) => eprintln!("  Endpoint: {} ({})", style("Invalid").red(), e),
    }
    if config.service.flavor == ApiFlavor::Azure {
        eprintln!("  API Version: {}", style(&config.service.api_version).cyan());
    }
    eprintln!(
        "  Embedding Model: {}",
        style(&config.service.embedding_model).cyan()
    );
    eprintln!("  Chat Model: {}", style(&config.service.chat_model).cyan());
    eprintln!(
        "  API Key: {} ({})",
        style(&config.service.api_key_env).cyan(),
        if config.api_key().is_some() {
            style("set").green()
        } else {
            style("not set").red()
        }
    );
    eprintln!("  Timeout: {}s", style(config.service.timeout_seconds).cyan());

    eprintln!();
    eprintln!("{}", style("Dataset Settings:").bold().yellow());
    eprintln!("  Path: {}", style(config.dataset.path.display()).cyan());
    eprintln!(
        "  Sheet: {}",
        style(config.dataset.sheet.as_deref().unwrap_or("(first)")).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Retrieval Settings:").bold().yellow());
    eprintln!(
        "  Max Neighbors: {}",
        style(config.retrieval.max_neighbors).cyan()
    );
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            }
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_service(service: &mut ServiceConfig) -> Result<()> {
    let flavors = &[ApiFlavor::Azure, ApiFlavor::OpenAi];
    let default_index = flavors
        .iter()
        .position(|&f| f == service.flavor)
        .unwrap_or(0);

    let flavor_index = Select::new()
        .with_prompt("API flavor")
        .default(default_index)
        .items(&["azure (deployment URLs, api-key header)", "openai (/v1 URLs, bearer token)"])
        .interact()?;

    let flavor = flavors[flavor_index];

    let endpoint: String = Input::new()
        .with_prompt("Endpoint URL")
        .default(service.endpoint.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = ServiceConfig {
                endpoint: input.clone(),
                ..ServiceConfig::default()
            };
            temp_config.endpoint_url()?;
            Ok(())
        })
        .interact_text()?;

    let api_version: String = if flavor == ApiFlavor::Azure {
        Input::new()
            .with_prompt("API version")
            .default(service.api_version.clone())
            .validate_with(|input: &String| -> Result<(), &str> {
                if input.trim().is_empty() {
                    Err("API version cannot be empty")
                } else {
                    Ok(())
                }
            })
            .interact_text()?
    } else {
        service.api_version.clone()
    };

    let embedding_model: String = Input::new()
        .with_prompt("Embedding deployment/model")
        .default(service.embedding_model.clone())
        .interact_text()?;

    let chat_model: String = Input::new()
        .with_prompt("Chat deployment/model")
        .default(service.chat_model.clone())
        .interact_text()?;

    let api_key_env: String = Input::new()
        .with_prompt("Environment variable holding the API key")
        .default(service.api_key_env.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Variable name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let timeout_seconds: u64 = Input::new()
        .with_prompt("Request timeout (seconds)")
        .default(service.timeout_seconds)
        .validate_with(|input: &u64| -> Result<(), &str> {
            if (1..=600).contains(input) {
                Ok(())
            } else {
                Err("Timeout must be between 1 and 600 seconds")
            }
        })
        .interact_text()?;

    service.flavor = flavor;
    service.set_endpoint(endpoint)?;
    service.api_version = api_version;
    service.set_embedding_model(embedding_model)?;
    service.set_chat_model(chat_model)?;
    service.api_key_env = api_key_env;
    service.set_timeout_seconds(timeout_seconds)?;

    Ok(())
}

fn configure_dataset(dataset: &mut DatasetConfig) -> Result<()> {
    let path: String = Input::new()
        .with_prompt("Dataset file (xlsx, xls, ods or csv)")
        .default(dataset.path.display().to_string())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Dataset path cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let sheet: String = Input::new()
        .with_prompt("Worksheet name (blank for the first sheet)")
        .default(dataset.sheet.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()?;

    dataset.path = PathBuf::from(path.trim());
    dataset.sheet = Some(sheet.trim().to_string()).filter(|s| !s.is_empty());

    Ok(())
}

fn configure_retrieval(retrieval: &mut RetrievalConfig) -> Result<()> {
    let max_neighbors: usize = Input::new()
        .with_prompt("Maximum neighbors kept by the index")
        .default(retrieval.max_neighbors)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err("Max neighbors must be between 1 and 100")
            }
        })
        .interact_text()?;

    retrieval.set_max_neighbors(max_neighbors)?;

    let top_k: usize = Input::new()
        .with_prompt("Documents retrieved per question")
        .default(retrieval.top_k)
        .validate_with(|input: &usize| -> Result<(), String> {
            if *input == 0 || *input > max_neighbors {
                Err(format!("Top k must be between 1 and {}", max_neighbors))
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    retrieval.set_top_k(top_k)?;

    Ok(())
}
