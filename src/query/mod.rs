
use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, info};

use crate::documents::Document;
use crate::index::{IndexBundle, IndexError};
use crate::llm::{ChatCompleter, ChatMessage, ClientError, Embedder};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. Always answer using only the data provided. \
Pay close attention to every column of each record; all of them may be relevant to the question.";

/// Fixed so repeated identical questions get the same answer
pub const ANSWER_TEMPERATURE: f32 = 0.0;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Question is empty")]
    EmptyQuestion,
    #[error("top_k must be at least 1")]
    InvalidTopK,
    #[error("Embedding the question failed: {0}")]
    Embedding(#[source] ClientError),
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] IndexError),
    #[error("Chat completion failed: {0}")]
    Completion(#[source] ClientError),
    #[error("Neighbor {0} has no matching document")]
    MissingDocument(usize),
}

/// A document returned by retrieval, in relevance order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievedDocument<'a> {
    pub document: &'a Document,
    pub distance: f32,
}

/// Answers questions against an [`IndexBundle`] with the given collaborators.
///
/// Nothing is cached: every call embeds, retrieves and generates again.
#[derive(Clone, Copy)]
pub struct QueryEngine<'a> {
    embedder: &'a dyn Embedder,
    chat: &'a dyn ChatCompleter,
}

impl<'a> QueryEngine<'a> {
    #[inline]
    pub fn new(embedder: &'a dyn Embedder, chat: &'a dyn ChatCompleter) -> Self {
        Self { embedder, chat }
    }

    /// Embed the question and return the `top_k` nearest documents, closest first.
    #[inline]
    pub fn retrieve<'b>(
        &self,
        question: &str,
        bundle: &'b IndexBundle,
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument<'b>>, QueryError> {
        if question.trim().is_empty() {
            return Err(QueryError::EmptyQuestion);
        }
        if top_k == 0 {
            return Err(QueryError::InvalidTopK);
        }

        let query_vector = self
            .embedder
            .embed(question)
            .map_err(QueryError::Embedding)?;

        let neighbors = bundle.index().search(&query_vector, top_k)?;

        neighbors
            .into_iter()
            .map(|neighbor| {
                bundle
                    .document(neighbor.index)
                    .map(|document| RetrievedDocument {
                        document,
                        distance: neighbor.distance,
                    })
                    .ok_or(QueryError::MissingDocument(neighbor.index))
            })
            .collect()
    }

    /// Retrieve context for `question` and ask the chat model to answer from it.
    ///
    /// The model's text is returned unmodified.
    #[inline]
    pub fn answer(
        &self,
        question: &str,
        bundle: &IndexBundle,
        top_k: usize,
    ) -> Result<String, QueryError> {
        let retrieved = self.retrieve(question, bundle, top_k)?;
        self.answer_from(question, &retrieved)
    }

    /// Generate an answer from documents already returned by [`Self::retrieve`].
    ///
    /// No embedding request is made; the context is exactly `retrieved`.
    #[inline]
    pub fn answer_from(
        &self,
        question: &str,
        retrieved: &[RetrievedDocument<'_>],
    ) -> Result<String, QueryError> {
        if question.trim().is_empty() {
            return Err(QueryError::EmptyQuestion);
        }
        debug!(
            "Answering from rows {:?}",
            retrieved
                .iter()
                .map(|r| r.document.row_index)
                .collect::<Vec<_>>()
        );

        let context = build_context(retrieved);
        let messages = build_prompt(&context, question);

        let answer = self
            .chat
            .complete(&messages, ANSWER_TEMPERATURE)
            .map_err(QueryError::Completion)?;

        info!(
            "Answered question from {} documents ({} chars)",
            retrieved.len(),
            answer.len()
        );
        Ok(answer)
    }
}

/// Join retrieved documents with newlines, keeping relevance order
#[inline]
pub fn build_context(retrieved: &[RetrievedDocument<'_>]) -> String {
    retrieved.iter().map(|r| r.document.text.as_str()).join("\n")
}

/// The system instruction followed by one user message carrying context and question
#[inline]
pub fn build_prompt(context: &str, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!("Data:\n{}\n\nQuestion: {}", context, question)),
    ]
}
