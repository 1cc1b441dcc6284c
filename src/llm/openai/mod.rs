
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{ChatCompleter, ChatMessage, ClientError, Embedder};
use crate::config::{ApiFlavor, Config};

const EMBEDDINGS_PATH: &[&str] = &["embeddings"];
const CHAT_COMPLETIONS_PATH: &[&str] = &["chat", "completions"];

/// Blocking client for Azure OpenAI deployments and OpenAI-compatible `/v1` servers.
///
/// Every call is a single HTTP request; failures are returned to the caller untouched.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: Url,
    flavor: ApiFlavor,
    api_version: String,
    embedding_model: String,
    chat_model: String,
    api_key: Option<String>,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let base_url = config
            .endpoint_url()
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;

        Ok(Self {
            base_url,
            flavor: config.service.flavor,
            api_version: config.service.api_version.clone(),
            embedding_model: config.service.embedding_model.clone(),
            chat_model: config.service.chat_model.clone(),
            api_key: config.api_key(),
            agent: build_agent(config.service.timeout()),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// URL of `operation` for the given deployment (azure) or model (openai)
    fn operation_url(&self, deployment: &str, operation: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        let has_version_segment = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            == Some("v1");

        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| ClientError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty();

            match self.flavor {
                ApiFlavor::Azure => {
                    segments.extend(["openai", "deployments", deployment]);
                }
                ApiFlavor::OpenAi if !has_version_segment => {
                    segments.push("v1");
                }
                ApiFlavor::OpenAi => {}
            }
            segments.extend(operation);
        }

        if self.flavor == ApiFlavor::Azure {
            url.query_pairs_mut()
                .append_pair("api-version", &self.api_version);
        }

        Ok(url)
    }

    /// Model name sent in the request body; azure addresses the model through the URL
    fn body_model<'a>(&self, model: &'a str) -> Option<&'a str> {
        match self.flavor {
            ApiFlavor::Azure => None,
            ApiFlavor::OpenAi => Some(model),
        }
    }

    fn post_json<T: Serialize>(&self, url: &Url, body: &T) -> Result<String, ClientError> {
        let request_json = serde_json::to_string(body)
            .map_err(|e| ClientError::MalformedResponse(format!("unencodable request: {}", e)))?;

        let mut request = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json");

        if let Some(key) = &self.api_key {
            request = match self.flavor {
                ApiFlavor::Azure => request.header("api-key", key.as_str()),
                ApiFlavor::OpenAi => request.header("Authorization", format!("Bearer {}", key)),
            };
        }

        debug!("POST {}", url);

        let transport_error = |error: ureq::Error| ClientError::Transport {
            url: url.to_string(),
            message: error.to_string(),
        };

        let mut response = request
            .send(request_json.as_str())
            .map_err(transport_error)?;
        let status = response.status();
        let response_text = response
            .body_mut()
            .read_to_string()
            .map_err(transport_error)?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&response_text).map_or_else(
                |_| response_text.trim().to_string(),
                |body| body.error.message,
            );
            warn!("Request to {} failed with HTTP {}: {}", url, status, message);
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response_text)
    }
}

impl Embedder for OpenAiClient {
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>, ClientError> {
        debug!("Generating embedding for text (length: {})", text.len());

        let url = self.operation_url(&self.embedding_model, EMBEDDINGS_PATH)?;
        let request = EmbedRequest {
            input: text,
            model: self.body_model(&self.embedding_model),
        };

        let response_text = self.post_json(&url, &request)?;
        let response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| ClientError::MalformedResponse(format!("embedding response: {}", e)))?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .filter(|embedding| !embedding.is_empty())
            .ok_or(ClientError::EmptyResponse("embedding"))?;

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }
}

impl ChatCompleter for OpenAiClient {
    #[inline]
    fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String, ClientError> {
        debug!(
            "Requesting chat completion for {} messages (temperature {})",
            messages.len(),
            temperature
        );

        let url = self.operation_url(&self.chat_model, CHAT_COMPLETIONS_PATH)?;
        let request = ChatRequest {
            messages,
            temperature,
            model: self.body_model(&self.chat_model),
        };

        let response_text = self.post_json(&url, &request)?;
        let response: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| ClientError::MalformedResponse(format!("chat response: {}", e)))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ClientError::EmptyResponse("completion"))?;

        debug!("Received completion ({} chars)", content.len());
        Ok(content)
    }
}
