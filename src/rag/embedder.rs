use std::sync::OnceLock;

use super::EmbeddingError;

/// Standard embedding dimension for all-MiniLM-L6-v2
pub const EMBEDDING_DIM: usize = 384;

/// Text → fixed-length dense vector.
///
/// Deterministic for a fixed model version. Implementations are pure apart
/// from a lazily loaded model handle.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
    fn dimension(&self) -> usize;
}

type Factory<E> = Box<dyn Fn() -> Result<E, EmbeddingError> + Send + Sync>;

/// Init-once wrapper around an embedding model.
///
/// The underlying model is constructed at most once per process, on first
/// use; concurrent first calls race on a `OnceLock`, so exactly one factory
/// invocation wins. A failed load is cached and replayed as
/// [`EmbeddingError`] on every subsequent call — a broken model directory
/// is not retried mid-flight.
pub struct LazyEmbedder<E> {
    cell: OnceLock<Result<E, EmbeddingError>>,
    factory: Factory<E>,
    dimension: usize,
}

impl<E: EmbeddingProvider> LazyEmbedder<E> {
    pub fn new(
        dimension: usize,
        factory: impl Fn() -> Result<E, EmbeddingError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            cell: OnceLock::new(),
            factory: Box::new(factory),
            dimension,
        }
    }

    fn provider(&self) -> Result<&E, EmbeddingError> {
        self.cell
            .get_or_init(|| (self.factory)())
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Whether the underlying model has been loaded (successfully or not).
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<E: EmbeddingProvider> EmbeddingProvider for LazyEmbedder<E> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.provider()?.embed(text)
    }

    fn dimension(&self) -> usize {
        match self.cell.get() {
            Some(Ok(provider)) => provider.dimension(),
            _ => self.dimension,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// ONNX embedder — behind `onnx-embeddings` feature
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx-embeddings")]
mod onnx {
    use std::path::Path;
    use std::sync::Mutex;

    use ort::session::Session;

    use super::{EmbeddingError, EmbeddingProvider, EMBEDDING_DIM};

    /// Sentence embedder running all-MiniLM-L6-v2 through ONNX Runtime.
    ///
    /// `model_dir` must contain `model.onnx` and `tokenizer.json`. Uses
    /// interior mutability (Mutex) because `Session::run` requires
    /// `&mut self` while [`EmbeddingProvider`] exposes `&self`.
    pub struct OnnxEmbedder {
        session: Mutex<Session>,
        tokenizer: tokenizers::Tokenizer,
    }

    impl OnnxEmbedder {
        pub fn load(model_dir: &Path) -> Result<Self, EmbeddingError> {
            let model_path = model_dir.join("model.onnx");
            let tokenizer_path = model_dir.join("tokenizer.json");

            if !model_path.exists() {
                return Err(EmbeddingError(format!(
                    "model weights missing: {}",
                    model_path.display()
                )));
            }
            if !tokenizer_path.exists() {
                return Err(EmbeddingError(format!(
                    "tokenizer missing: {}",
                    tokenizer_path.display()
                )));
            }

            let session = Session::builder()
                .map_err(|e: ort::Error| EmbeddingError(e.to_string()))?
                .with_intra_threads(2)
                .map_err(|e: ort::Error| EmbeddingError(e.to_string()))?
                .commit_from_file(&model_path)
                .map_err(|e: ort::Error| EmbeddingError(format!("ONNX load failed: {e}")))?;

            let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| EmbeddingError(format!("tokenizer load failed: {e}")))?;

            tracing::info!("ONNX embedder loaded from {}", model_dir.display());

            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
            })
        }

        /// Tokenize and run inference; mean-pool with the attention mask and
        /// L2-normalize, matching the corpus-build export.
        fn infer(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            use ort::value::TensorRef;

            let encoding = self
                .tokenizer
                .encode(text, true)
                .map_err(|e| EmbeddingError(format!("tokenization failed: {e}")))?;

            let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
            let attention_mask: Vec<i64> = encoding
                .get_attention_mask()
                .iter()
                .map(|&m| m as i64)
                .collect();
            let token_type_ids: Vec<i64> = encoding
                .get_type_ids()
                .iter()
                .map(|&t| t as i64)
                .collect();

            let seq_len = input_ids.len();

            let ids_array = ndarray::Array2::from_shape_vec((1, seq_len), input_ids)
                .map_err(|e| EmbeddingError(e.to_string()))?;
            let mask_array =
                ndarray::Array2::from_shape_vec((1, seq_len), attention_mask.clone())
                    .map_err(|e| EmbeddingError(e.to_string()))?;
            let type_array = ndarray::Array2::from_shape_vec((1, seq_len), token_type_ids)
                .map_err(|e| EmbeddingError(e.to_string()))?;

            let ids_tensor = TensorRef::from_array_view(&ids_array)
                .map_err(|e| EmbeddingError(e.to_string()))?;
            let mask_tensor = TensorRef::from_array_view(&mask_array)
                .map_err(|e| EmbeddingError(e.to_string()))?;
            let type_tensor = TensorRef::from_array_view(&type_array)
                .map_err(|e| EmbeddingError(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| EmbeddingError("session lock poisoned".to_string()))?;

            let outputs = session
                .run(ort::inputs![ids_tensor, mask_tensor, type_tensor])
                .map_err(|e| EmbeddingError(format!("ONNX inference failed: {e}")))?;

            let (shape, output_data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| EmbeddingError(format!("output extraction: {e}")))?;

            if shape.len() != 3 || shape[2] as usize != EMBEDDING_DIM {
                return Err(EmbeddingError(format!(
                    "unexpected output shape {shape:?}, expected [1, {seq_len}, {EMBEDDING_DIM}]"
                )));
            }

            let mut pooled = vec![0.0f32; EMBEDDING_DIM];
            let mut mask_sum = 0.0f32;

            for (token_idx, &mask_val_i64) in attention_mask.iter().enumerate().take(seq_len) {
                let mask_val = mask_val_i64 as f32;
                mask_sum += mask_val;
                let offset = token_idx * EMBEDDING_DIM;
                for (dim_idx, p) in pooled.iter_mut().enumerate() {
                    *p += output_data[offset + dim_idx] * mask_val;
                }
            }

            if mask_sum > 0.0 {
                for val in &mut pooled {
                    *val /= mask_sum;
                }
            }

            let norm: f32 = pooled.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for val in &mut pooled {
                    *val /= norm;
                }
            }

            Ok(pooled)
        }
    }

    impl EmbeddingProvider for OnnxEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.infer(text)
        }

        fn dimension(&self) -> usize {
            EMBEDDING_DIM
        }
    }
}

#[cfg(feature = "onnx-embeddings")]
pub use onnx::OnnxEmbedder;

/// Mock embedding model for testing — produces deterministic unit vectors.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: EMBEDDING_DIM,
        }
    }

    /// Small dimensions keep test fixtures readable.
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingProvider for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(deterministic_vector(text, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Generate a deterministic unit vector from text (for testing).
fn deterministic_vector(text: &str, dim: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dim];
    let bytes = text.as_bytes();

    for (i, slot) in vec.iter_mut().enumerate() {
        let byte_idx = i % bytes.len().max(1);
        *slot = (bytes.get(byte_idx).copied().unwrap_or(0) as f32 + i as f32) / 255.0;
    }

    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in &mut vec {
            *val /= norm;
        }
    }

    vec
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn mock_embed_returns_correct_dimension() {
        let embedder = MockEmbedder::new();
        let vec = embedder.embed("Hello world").unwrap();
        assert_eq!(vec.len(), EMBEDDING_DIM);
    }

    #[test]
    fn mock_embed_is_deterministic() {
        let embedder = MockEmbedder::new();
        assert_eq!(embedder.embed("same text").unwrap(), embedder.embed("same text").unwrap());
    }

    #[test]
    fn mock_embed_different_texts_differ() {
        let embedder = MockEmbedder::new();
        assert_ne!(embedder.embed("text A").unwrap(), embedder.embed("text B").unwrap());
    }

    #[test]
    fn mock_embed_is_l2_normalized() {
        let vec = MockEmbedder::new().embed("test normalization").unwrap();
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01, "expected unit vector, norm = {norm}");
    }

    #[test]
    fn lazy_embedder_defers_construction() {
        let loads = Arc::new(AtomicUsize::new(0));
        let loads_in_factory = Arc::clone(&loads);
        let lazy = LazyEmbedder::new(4, move || {
            loads_in_factory.fetch_add(1, Ordering::SeqCst);
            Ok(MockEmbedder::with_dimension(4))
        });

        assert!(!lazy.is_initialized());
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert_eq!(lazy.dimension(), 4);

        lazy.embed("first call").unwrap();
        assert!(lazy.is_initialized());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_embedder_loads_once_under_concurrency() {
        let loads = Arc::new(AtomicUsize::new(0));
        let loads_in_factory = Arc::clone(&loads);
        let lazy = Arc::new(LazyEmbedder::new(8, move || {
            loads_in_factory.fetch_add(1, Ordering::SeqCst);
            Ok(MockEmbedder::with_dimension(8))
        }));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let lazy = Arc::clone(&lazy);
                std::thread::spawn(move || lazy.embed(&format!("query {i}")).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().len(), 8);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_embedder_replays_failed_load() {
        let loads = Arc::new(AtomicUsize::new(0));
        let loads_in_factory = Arc::clone(&loads);
        let lazy: LazyEmbedder<MockEmbedder> = LazyEmbedder::new(4, move || {
            loads_in_factory.fetch_add(1, Ordering::SeqCst);
            Err(EmbeddingError("weights missing".into()))
        });

        assert!(lazy.embed("a").is_err());
        assert!(lazy.embed("b").is_err());
        // Load attempted exactly once; the failure is cached
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
