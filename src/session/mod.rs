//! Process-wide knowledge base and per-user chat sessions.
//!
//! The knowledge base is loaded at most once; a failed load is remembered and
//! every session built on it reports that the data is not loaded.


use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Local};
use indicatif::ProgressBar;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::dataset::load_dataset;
use crate::documents::build_documents;
use crate::index::{IndexBuilder, IndexBundle};
use crate::llm::{ChatCompleter, Embedder};
use crate::query::QueryEngine;

pub const NOT_LOADED_MESSAGE: &str = "Data not loaded. Check the dataset path and the embedding service, then restart.";

/// Outcome of loading and indexing the dataset
#[derive(Debug)]
pub enum LoadState {
    Ready { bundle: IndexBundle, records: usize },
    Failed { reason: String },
}

impl LoadState {
    #[inline]
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    #[inline]
    pub fn bundle(&self) -> Option<&IndexBundle> {
        match self {
            Self::Ready { bundle, .. } => Some(bundle),
            Self::Failed { .. } => None,
        }
    }

    /// Rows loaded from the dataset, zero when loading failed
    #[inline]
    pub fn records(&self) -> usize {
        match self {
            Self::Ready { records, .. } => *records,
            Self::Failed { .. } => 0,
        }
    }

    #[inline]
    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Ready { .. } => None,
            Self::Failed { reason } => Some(reason),
        }
    }
}

/// Load the configured dataset, flatten it and build the neighbor index.
///
/// Every failure is folded into [`LoadState::Failed`].
#[inline]
pub fn load_knowledge_base(
    config: &Config,
    embedder: &dyn Embedder,
    progress: ProgressBar,
) -> LoadState {
    let path = &config.dataset.path;
    info!("Loading dataset from {}", path.display());

    let dataset = match load_dataset(path, config.dataset.sheet.as_deref()) {
        Ok(dataset) => dataset,
        Err(e) => {
            error!("Failed to load dataset {}: {}", path.display(), e);
            return LoadState::Failed {
                reason: format!("Failed to load dataset {}: {}", path.display(), e),
            };
        }
    };

    let records = dataset.len();
    let documents = build_documents(&dataset);

    let built = IndexBuilder::new(embedder)
        .with_max_neighbors(config.retrieval.max_neighbors)
        .with_progress(progress)
        .build(documents);

    match built {
        Ok(bundle) => {
            info!("Knowledge base ready with {} records", records);
            LoadState::Ready { bundle, records }
        }
        Err(e) => {
            error!("Failed to index dataset: {}", e);
            LoadState::Failed {
                reason: format!("Failed to index dataset: {}", e),
            }
        }
    }
}

/// Memoizes the first [`LoadState`] for the lifetime of the process
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    state: OnceLock<Arc<LoadState>>,
}

impl KnowledgeBase {
    #[inline]
    pub const fn new() -> Self {
        Self {
            state: OnceLock::new(),
        }
    }

    /// Already-resolved knowledge base, skipping the loader entirely
    #[inline]
    pub fn with_state(state: LoadState) -> Self {
        Self {
            state: OnceLock::from(Arc::new(state)),
        }
    }

    /// Run `load` on first access only; later calls return the stored state
    #[inline]
    pub fn get_or_load<F>(&self, load: F) -> Arc<LoadState>
    where
        F: FnOnce() -> LoadState,
    {
        Arc::clone(self.state.get_or_init(|| Arc::new(load())))
    }

    #[inline]
    pub fn get(&self) -> Option<Arc<LoadState>> {
        self.state.get().map(Arc::clone)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

impl fmt::Display for Speaker {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub speaker: Speaker,
    pub message: String,
    pub at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input, nothing happened
    Ignored,
    /// The knowledge base failed to load; carries the load failure
    NotLoaded(String),
    Answered(String),
    /// The query failed; carries the apology recorded in history
    Failed(String),
}

/// One conversation against a shared knowledge base
pub struct ChatSession<'a> {
    state: Arc<LoadState>,
    engine: QueryEngine<'a>,
    top_k: usize,
    history: Vec<Turn>,
    started_at: DateTime<Local>,
}

impl<'a> ChatSession<'a> {
    #[inline]
    pub fn new(
        state: Arc<LoadState>,
        embedder: &'a dyn Embedder,
        chat: &'a dyn ChatCompleter,
        top_k: usize,
    ) -> Self {
        Self {
            state,
            engine: QueryEngine::new(embedder, chat),
            top_k,
            history: Vec::new(),
            started_at: Local::now(),
        }
    }

    /// Answer `input` as typed; blank input is ignored
    #[inline]
    pub fn submit(&mut self, input: &str) -> SubmitOutcome {
        if input.trim().is_empty() {
            return SubmitOutcome::Ignored;
        }

        let bundle = match self.state.as_ref() {
            LoadState::Ready { bundle, .. } => bundle,
            LoadState::Failed { reason } => {
                warn!("Rejecting question, knowledge base unavailable: {}", reason);
                return SubmitOutcome::NotLoaded(reason.clone());
            }
        };

        self.history.push(Turn {
            speaker: Speaker::User,
            message: input.to_string(),
            at: Local::now(),
        });

        let (message, outcome) = match self.engine.answer(input, bundle, self.top_k) {
            Ok(answer) => (answer.clone(), SubmitOutcome::Answered(answer)),
            Err(e) => {
                error!("Query failed: {}", e);
                let apology = format!("I apologize, but I encountered an error: {}", e);
                (apology.clone(), SubmitOutcome::Failed(apology))
            }
        };

        self.history.push(Turn {
            speaker: Speaker::Assistant,
            message,
            at: Local::now(),
        });

        outcome
    }

    /// Clear the conversation; the knowledge base is kept
    #[inline]
    pub fn reset(&mut self) {
        info!("Resetting chat session after {} queries", self.query_count());
        self.history.clear();
        self.started_at = Local::now();
    }

    #[inline]
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    #[inline]
    pub fn query_count(&self) -> usize {
        self.history
            .iter()
            .filter(|turn| turn.speaker == Speaker::User)
            .count()
    }

    #[inline]
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.state.is_loaded()
    }

    #[inline]
    pub fn records(&self) -> usize {
        self.state.records()
    }
}
