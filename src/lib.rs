use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] dataset::DatasetError),

    #[error("Indexing error: {0}")]
    Index(#[from] index::IndexError),

    #[error("Query error: {0}")]
    Query(#[from] query::QueryError),

    #[error("Service error: {0}")]
    Service(#[from] llm::ClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod dataset;
pub mod documents;
pub mod index;
pub mod llm;
pub mod query;
pub mod session;
