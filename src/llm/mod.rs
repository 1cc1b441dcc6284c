// Hosted model collaborators
// Traits for the embedding and chat-completion services plus the HTTP client

pub mod openai;

#[cfg(test)]
pub(crate) mod fakes;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use openai::OpenAiClient;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("Service returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Service returned no {0}")]
    EmptyResponse(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Turns text into a fixed-dimension vector
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ClientError>;
}

/// Generates a reply for an ordered message list
pub trait ChatCompleter: Send + Sync {
    fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String, ClientError>;
}
