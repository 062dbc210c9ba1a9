use std::sync::Arc;

use crate::history::ConversationTurn;

use super::embedder::EmbeddingProvider;
use super::store::VectorStore;
use super::types::RetrievalResult;

/// Per-call overrides for retrieval. `None` fields fall back to the
/// retriever's configured defaults.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOptions {
    pub top_k: Option<usize>,
    pub document_type: Option<String>,
    pub similarity_threshold: Option<f32>,
}

/// Query embedding + vector search + similarity thresholding.
///
/// Retrieval is best-effort: any embedding or store failure degrades to an
/// empty result set so the answer can proceed without context. Nothing in
/// here ever reaches the end user as an error.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<VectorStore>,
    default_top_k: usize,
    default_threshold: f32,
}

/// How many trailing history turns feed query reformulation.
const REFORMULATION_HISTORY_TURNS: usize = 4;

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<VectorStore>,
        default_top_k: usize,
        default_threshold: f32,
    ) -> Self {
        Self {
            embedder,
            store,
            default_top_k,
            default_threshold,
        }
    }

    /// Retrieve corpus chunks relevant to `query`.
    ///
    /// Results are sorted by descending similarity and every surviving
    /// result satisfies the similarity threshold.
    pub fn retrieve(
        &self,
        query: &str,
        history: &[ConversationTurn],
        options: &RetrievalOptions,
    ) -> Vec<RetrievalResult> {
        if self.store.is_empty() {
            tracing::debug!("vector store is empty, skipping retrieval");
            return Vec::new();
        }

        let top_k = options.top_k.unwrap_or(self.default_top_k);
        let threshold = options.similarity_threshold.unwrap_or(self.default_threshold);

        let reformulated = reformulate_query(query, history);
        let query_vector = match self.embedder.embed(&reformulated) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "query embedding failed, degrading to empty retrieval");
                return Vec::new();
            }
        };

        let results = self
            .store
            .search(&query_vector, top_k, options.document_type.as_deref());

        let surviving: Vec<RetrievalResult> = results
            .into_iter()
            .filter(|r| r.similarity >= threshold)
            .collect();

        tracing::debug!(
            candidates = top_k,
            surviving = surviving.len(),
            threshold,
            "retrieval complete"
        );

        surviving
    }
}

/// Fold recent conversation turns into the embedded query so follow-up
/// questions ("what about the dosage?") keep their referent.
fn reformulate_query(query: &str, history: &[ConversationTurn]) -> String {
    let recent: Vec<&str> = history
        .iter()
        .rev()
        .take(REFORMULATION_HISTORY_TURNS)
        .rev()
        .map(|turn| turn.content.as_str())
        .collect();

    if recent.is_empty() {
        query.to_string()
    } else {
        format!("{query}. Context: {}", recent.join(" "))
    }
}
