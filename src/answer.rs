//! Top-level answering pipeline: retrieval, prompt assembly and the
//! generation cascade behind one entry point per flow.
//!
//! Nothing here returns an error to the caller. Retrieval degrades to
//! no-context, generation degrades to a fixed apology; the caller always
//! gets a displayable string.

use std::sync::Arc;

use crate::config::Config;
use crate::generation::fallback::{FallbackOrchestrator, GenerationInputs};
use crate::generation::gateway::{ChatModel, OpenRouterGateway};
use crate::generation::GenerationError;
use crate::history::ConversationTurn;
use crate::rag::context::{format_retrieved_docs, ContextBudgeter};
use crate::rag::embedder::{EmbeddingProvider, LazyEmbedder, EMBEDDING_DIM};
use crate::rag::prompt;
use crate::rag::retriever::{RetrievalOptions, Retriever};
use crate::rag::store::VectorStore;

/// Triage pulls fewer, guideline-only documents.
const TRIAGE_TOP_K: usize = 3;
const TRIAGE_DOCUMENT_TYPE: &str = "guideline";

pub struct AnswerPipeline {
    rag_enabled: bool,
    retriever: Retriever,
    orchestrator: FallbackOrchestrator,
}

impl AnswerPipeline {
    /// Wire the full pipeline from configuration: load the corpus, set up
    /// the lazy embedder and connect the generation cascade.
    ///
    /// A missing or empty corpus is logged and tolerated; a missing API key
    /// is not, since every generation call would fail.
    pub fn bootstrap(config: &Config) -> Result<Self, GenerationError> {
        let gateway: Arc<dyn ChatModel> = Arc::new(OpenRouterGateway::new(config)?);

        let store = Arc::new(VectorStore::new());
        match store.load(&config.corpus_path) {
            Ok(report) => {
                if report.loaded == 0 {
                    tracing::warn!(
                        path = %config.corpus_path.display(),
                        "corpus is empty, answers will not carry retrieved context"
                    );
                } else {
                    tracing::info!(
                        loaded = report.loaded,
                        skipped = report.skipped,
                        "corpus loaded"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "corpus unavailable, starting with an empty store");
            }
        }

        Ok(Self::with_parts(config, default_embedder(config), store, gateway))
    }

    /// Assemble from pre-built parts. Used by tests and by embedders that
    /// manage their own corpus loading.
    pub fn with_parts(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<VectorStore>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        let retriever = Retriever::new(
            embedder,
            store,
            config.rag_top_k,
            config.rag_similarity_threshold,
        );
        let orchestrator = FallbackOrchestrator::new(
            model,
            ContextBudgeter::new(config.context_budget),
            config.primary_model.clone(),
            config.backup_model.clone(),
            config.second_backup_model.clone(),
        );
        Self {
            rag_enabled: config.rag_enabled,
            retriever,
            orchestrator,
        }
    }

    /// Answer a chat message, grounded in retrieved context when available.
    pub async fn answer(
        &self,
        message: &str,
        session_id: &str,
        history: &[ConversationTurn],
        locale: &str,
    ) -> String {
        tracing::info!(session = session_id, locale, history = history.len(), "handling message");
        let rag_context = self.context_for(message, history, &RetrievalOptions::default());
        let inputs = GenerationInputs {
            persona: prompt::build_system_prompt(None),
            message: message.to_string(),
            history: history.to_vec(),
            rag_context,
            image_url: None,
        };
        self.orchestrator.generate(&inputs).await
    }

    /// Answer a message that carries an image. No retrieval; the image
    /// rides the same cascade as a multimodal content part of the user
    /// turn.
    pub async fn answer_with_image(
        &self,
        message: &str,
        image_url: &str,
        session_id: &str,
        history: &[ConversationTurn],
    ) -> String {
        tracing::info!(session = session_id, history = history.len(), "handling image message");
        let inputs = GenerationInputs {
            persona: prompt::build_system_prompt(None),
            message: message.to_string(),
            history: history.to_vec(),
            rag_context: None,
            image_url: Some(image_url.to_string()),
        };
        self.orchestrator.generate(&inputs).await
    }

    /// Symptom triage: the triage template, with retrieval restricted to
    /// guideline documents.
    pub async fn triage(
        &self,
        message: &str,
        session_id: &str,
        history: &[ConversationTurn],
        locale: &str,
    ) -> String {
        tracing::info!(session = session_id, locale, history = history.len(), "handling triage request");
        let options = RetrievalOptions {
            top_k: Some(TRIAGE_TOP_K),
            document_type: Some(TRIAGE_DOCUMENT_TYPE.to_string()),
            similarity_threshold: None,
        };
        let rag_context = self.context_for(message, history, &options);
        let inputs = GenerationInputs {
            persona: prompt::build_system_prompt(None),
            message: prompt::triage_prompt(message),
            history: history.to_vec(),
            rag_context,
            image_url: None,
        };
        self.orchestrator.generate(&inputs).await
    }

    /// Summarize an uploaded document's extracted text. Same cascade, a
    /// different persona, no retrieval.
    pub async fn summarize_document(
        &self,
        document_text: &str,
        file_name: &str,
        history: &[ConversationTurn],
    ) -> String {
        tracing::info!(file = file_name, chars = document_text.len(), "summarizing document");
        let inputs = GenerationInputs {
            persona: prompt::document_summary_system_prompt().to_string(),
            message: prompt::document_summary_request(file_name, document_text),
            history: history.to_vec(),
            rag_context: None,
            image_url: None,
        };
        self.orchestrator.generate(&inputs).await
    }

    fn context_for(
        &self,
        query: &str,
        history: &[ConversationTurn],
        options: &RetrievalOptions,
    ) -> Option<String> {
        if !self.rag_enabled {
            tracing::debug!("retrieval disabled, calling models without context");
            return None;
        }

        let results = self.retriever.retrieve(query, history, options);
        if results.is_empty() {
            tracing::debug!("no documents retrieved for query");
            return None;
        }
        for (idx, doc) in results.iter().enumerate() {
            tracing::debug!(
                doc = idx + 1,
                source = %doc.chunk.metadata.source,
                similarity = doc.similarity,
                "retrieved document"
            );
        }
        Some(format_retrieved_docs(&results))
    }
}

#[cfg(feature = "onnx-embeddings")]
fn default_embedder(config: &Config) -> Arc<dyn EmbeddingProvider> {
    use crate::rag::embedder::OnnxEmbedder;
    let model_dir = config.model_dir.clone();
    Arc::new(LazyEmbedder::new(EMBEDDING_DIM, move || {
        OnnxEmbedder::load(&model_dir)
    }))
}

#[cfg(not(feature = "onnx-embeddings"))]
fn default_embedder(_config: &Config) -> Arc<dyn EmbeddingProvider> {
    use crate::rag::embedder::MockEmbedder;
    use crate::rag::EmbeddingError;
    // No local model in this build: retrieval degrades to no-context with a
    // warning on first use instead of failing the pipeline.
    let lazy: LazyEmbedder<MockEmbedder> = LazyEmbedder::new(EMBEDDING_DIM, || {
        Err(EmbeddingError(
            "built without the onnx-embeddings feature".to_string(),
        ))
    });
    Arc::new(lazy)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::generation::gateway::ChatRequest;
    use crate::rag::context::FACTS_HEADER;
    use crate::rag::EmbeddingError;

    /// Always answers, recording every request it saw.
    struct RecordingModel {
        requests: Mutex<Vec<(String, ChatRequest)>>,
    }

    impl RecordingModel {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<(String, ChatRequest)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        async fn call(&self, model_id: &str, request: &ChatRequest) -> Result<String, GenerationError> {
            self.requests
                .lock()
                .unwrap()
                .push((model_id.to_string(), request.clone()));
            Ok("model answer".to_string())
        }
    }

    struct CountingEmbedder {
        calls: AtomicUsize,
        vector: Vec<f32>,
    }

    impl CountingEmbedder {
        fn new(vector: Vec<f32>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                vector,
            })
        }
    }

    impl EmbeddingProvider for CountingEmbedder {
        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.vector.clone())
        }

        fn dimension(&self) -> usize {
            self.vector.len()
        }
    }

    fn seeded_store(entries: &[(&str, Vec<f32>, &str)]) -> Arc<VectorStore> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for (id, vector, doc_type) in entries {
            let record = serde_json::json!({
                "id": id,
                "content": format!("content of {id}"),
                "metadata": {"source": "medlineplus", "documentType": doc_type},
                "vector": vector,
            });
            writeln!(file, "{record}").unwrap();
        }
        let store = VectorStore::new();
        store.load(file.path()).unwrap();
        Arc::new(store)
    }

    fn config() -> Config {
        Config {
            primary_model: "primary".into(),
            backup_model: "backup".into(),
            second_backup_model: "second-backup".into(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn answer_grounds_system_prompt_in_retrieved_context() {
        let store = seeded_store(&[("doc", vec![1.0, 0.0], "general")]);
        let embedder = CountingEmbedder::new(vec![1.0, 0.0]);
        let model = RecordingModel::new();
        let pipeline = AnswerPipeline::with_parts(&config(), embedder, store, model.clone());

        let text = pipeline.answer("what helps a fever?", "s1", &[], "en").await;

        assert_eq!(text, "model answer");
        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        let (model_id, request) = &requests[0];
        assert_eq!(model_id, "primary");
        assert!(request.system_prompt.contains("AURA"));
        assert!(request.system_prompt.contains(FACTS_HEADER));
        assert!(request.system_prompt.contains("[Reference 1]"));
        assert_eq!(request.user_message, "what helps a fever?");
    }

    #[tokio::test]
    async fn rag_disabled_skips_retrieval_entirely() {
        let store = seeded_store(&[("doc", vec![1.0, 0.0], "general")]);
        let embedder = CountingEmbedder::new(vec![1.0, 0.0]);
        let model = RecordingModel::new();
        let pipeline = AnswerPipeline::with_parts(
            &Config {
                rag_enabled: false,
                ..config()
            },
            embedder.clone(),
            store,
            model.clone(),
        );

        let text = pipeline.answer("what helps a fever?", "s1", &[], "en").await;

        assert_eq!(text, "model answer");
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        let requests = model.requests();
        assert!(!requests[0].1.system_prompt.contains(FACTS_HEADER));
    }

    #[tokio::test]
    async fn broken_embedder_still_answers_without_context() {
        struct Broken;
        impl EmbeddingProvider for Broken {
            fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
                Err(EmbeddingError("weights missing".into()))
            }
            fn dimension(&self) -> usize {
                2
            }
        }

        let store = seeded_store(&[("doc", vec![1.0, 0.0], "general")]);
        let model = RecordingModel::new();
        let pipeline = AnswerPipeline::with_parts(&config(), Arc::new(Broken), store, model.clone());

        let text = pipeline.answer("question", "s1", &[], "en").await;

        assert_eq!(text, "model answer");
        let requests = model.requests();
        assert!(!requests[0].1.system_prompt.contains(FACTS_HEADER));
    }

    #[tokio::test]
    async fn triage_uses_template_and_guideline_documents_only() {
        let store = seeded_store(&[
            ("guide", vec![1.0, 0.0], "guideline"),
            ("general", vec![1.0, 0.0], "general"),
        ]);
        let embedder = CountingEmbedder::new(vec![1.0, 0.0]);
        let model = RecordingModel::new();
        let pipeline = AnswerPipeline::with_parts(&config(), embedder, store, model.clone());

        let text = pipeline.triage("sharp chest pain", "s1", &[], "en").await;

        assert_eq!(text, "model answer");
        let requests = model.requests();
        let request = &requests[0].1;
        assert!(request.user_message.starts_with("Perform symptom triage."));
        assert!(request.user_message.contains("sharp chest pain"));
        assert!(request.system_prompt.contains("content of guide"));
        assert!(!request.system_prompt.contains("content of general"));
    }

    #[tokio::test]
    async fn document_summary_uses_its_own_persona_without_retrieval() {
        let store = seeded_store(&[("doc", vec![1.0, 0.0], "general")]);
        let embedder = CountingEmbedder::new(vec![1.0, 0.0]);
        let model = RecordingModel::new();
        let pipeline = AnswerPipeline::with_parts(&config(), embedder.clone(), store, model.clone());

        let text = pipeline
            .summarize_document("Hemoglobin 13.5 g/dL", "labs.pdf", &[])
            .await;

        assert_eq!(text, "model answer");
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        let requests = model.requests();
        let request = &requests[0].1;
        assert!(request.system_prompt.contains("Medical Assistant AI"));
        assert!(!request.system_prompt.contains("AURA"));
        assert!(request.user_message.contains("labs.pdf"));
        assert!(request.user_message.contains("Hemoglobin 13.5 g/dL"));
    }

    #[tokio::test]
    async fn image_message_skips_retrieval_and_forwards_the_url() {
        let store = seeded_store(&[("doc", vec![1.0, 0.0], "general")]);
        let embedder = CountingEmbedder::new(vec![1.0, 0.0]);
        let model = RecordingModel::new();
        let pipeline = AnswerPipeline::with_parts(&config(), embedder.clone(), store, model.clone());

        let text = pipeline
            .answer_with_image("what is this rash?", "https://uploads.example/rash.png", "s1", &[])
            .await;

        assert_eq!(text, "model answer");
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        let requests = model.requests();
        let request = &requests[0].1;
        assert_eq!(request.user_message, "what is this rash?");
        assert_eq!(request.image_url.as_deref(), Some("https://uploads.example/rash.png"));
        assert!(!request.system_prompt.contains(FACTS_HEADER));
    }

    #[tokio::test]
    async fn history_is_forwarded_to_the_model() {
        let store = seeded_store(&[("doc", vec![1.0, 0.0], "general")]);
        let embedder = CountingEmbedder::new(vec![1.0, 0.0]);
        let model = RecordingModel::new();
        let pipeline = AnswerPipeline::with_parts(&config(), embedder, store, model.clone());

        let history = vec![
            ConversationTurn::user("I have a headache"),
            ConversationTurn::assistant("Since when?"),
        ];
        pipeline.answer("since this morning", "s1", &history, "en").await;

        let requests = model.requests();
        assert_eq!(requests[0].1.history, history);
    }
}
