use clap::{Parser, Subcommand};
use std::path::PathBuf;
use table_rag::Result;
use table_rag::commands::{ask, chat, list_documents, show_status};
use table_rag::config::{get_config_dir, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "table-rag")]
#[command(about = "Ask questions about spreadsheet data using retrieval-augmented generation")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (defaults to ~/.table-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the service endpoint, dataset and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Start an interactive chat over the dataset
    Chat,
    /// Answer a single question
    Ask {
        /// The question to answer
        question: String,
        /// Number of records to retrieve as context
        #[arg(long)]
        top_k: Option<usize>,
        /// Print the retrieved records to stderr before the answer
        #[arg(long)]
        show_context: bool,
    },
    /// Print the flattened dataset rows
    Documents {
        /// Maximum number of rows to print
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show configuration, dataset and service status
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = get_config_dir(cli.config_dir.as_deref())?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Chat => {
            chat(&config_dir)?;
        }
        Commands::Ask {
            question,
            top_k,
            show_context,
        } => {
            ask(&config_dir, &question, top_k, show_context)?;
        }
        Commands::Documents { limit } => {
            list_documents(&config_dir, limit)?;
        }
        Commands::Status => {
            show_status(&config_dir)?;
        }
    }

    Ok(())
}
