//! Deterministic in-process collaborators for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ChatCompleter, ChatMessage, ClientError, Embedder};

/// Embeds text as keyword counts, one dimension per keyword plus a constant bias.
pub(crate) struct KeywordEmbedder {
    keywords: Vec<String>,
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
}

impl KeywordEmbedder {
    pub(crate) fn new(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            calls: AtomicUsize::new(0),
            fail_on_call: None,
        }
    }

    /// Fail the `call`-th request (zero based) and every one after it
    pub(crate) fn failing_from(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for KeywordEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, ClientError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_call.is_some_and(|fail| call >= fail) {
            return Err(ClientError::Status {
                status: 429,
                message: "Rate limit exceeded".to_string(),
            });
        }

        let lowered = text.to_lowercase();
        let mut vector: Vec<f32> = self
            .keywords
            .iter()
            .map(|keyword| lowered.matches(keyword.as_str()).count() as f32)
            .collect();
        vector.push(0.1);
        Ok(vector)
    }
}

type Reply = Box<dyn Fn(&[ChatMessage]) -> Result<String, ClientError> + Send + Sync>;

/// Records every prompt and answers through a closure.
pub(crate) struct ScriptedChat {
    reply: Reply,
    prompts: Mutex<Vec<(Vec<ChatMessage>, f32)>>,
}

impl ScriptedChat {
    pub(crate) fn new<F>(reply: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> Result<String, ClientError> + Send + Sync + 'static,
    {
        Self {
            reply: Box::new(reply),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answers with the first context line of the user message
    pub(crate) fn first_context_line() -> Self {
        Self::new(|messages| {
            let user = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
            Ok(user.lines().nth(1).unwrap_or_default().to_string())
        })
    }

    pub(crate) fn failing() -> Self {
        Self::new(|_| {
            Err(ClientError::Transport {
                url: "http://chat.invalid".to_string(),
                message: "connection refused".to_string(),
            })
        })
    }

    pub(crate) fn prompts(&self) -> Vec<(Vec<ChatMessage>, f32)> {
        self.prompts.lock().expect("prompt log lock").clone()
    }
}

impl ChatCompleter for ScriptedChat {
    fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String, ClientError> {
        self.prompts
            .lock()
            .expect("prompt log lock")
            .push((messages.to_vec(), temperature));
        (self.reply)(messages)
    }
}
