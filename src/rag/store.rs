use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, RwLock};

use super::types::{CorpusRecord, DocumentChunk, EmbeddingRecord, RetrievalResult};
use super::StoreLoadError;

/// Outcome of loading the precomputed embeddings artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
    /// Dimension shared by all accepted vectors, if any were accepted.
    pub dimension: Option<usize>,
}

/// In-memory vector store over the fixed corpus.
///
/// Loaded once at startup, replaced wholesale on reload: `load` parses the
/// entire file first and then swaps an `Arc` behind the lock, so concurrent
/// searches either see the old corpus or the new one, never a partial mix.
///
/// Search is a linear cosine-similarity scan. The corpus is small enough
/// that an index structure would buy nothing; this is a deliberate
/// simplicity choice.
pub struct VectorStore {
    records: RwLock<Arc<Vec<EmbeddingRecord>>>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Load (or reload) the store from a newline-delimited JSON artifact.
    ///
    /// Malformed lines, empty chunks, and dimension mismatches are skipped
    /// with a warning, not fatal. A missing file is an error the caller is
    /// expected to downgrade to "run with an empty store".
    pub fn load(&self, path: &Path) -> Result<LoadReport, StoreLoadError> {
        let file = File::open(path).map_err(|source| StoreLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut report = LoadReport::default();
        let mut records: Vec<EmbeddingRecord> = Vec::new();

        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    tracing::warn!(line = line_no + 1, error = %e, "unreadable corpus line, skipping");
                    report.skipped += 1;
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let record: CorpusRecord = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(line = line_no + 1, error = %e, "malformed corpus line, skipping");
                    report.skipped += 1;
                    continue;
                }
            };

            if record.content.trim().is_empty() || record.vector.is_empty() {
                tracing::warn!(line = line_no + 1, id = %record.id, "empty content or vector, skipping");
                report.skipped += 1;
                continue;
            }

            match report.dimension {
                None => report.dimension = Some(record.vector.len()),
                Some(dim) if dim != record.vector.len() => {
                    tracing::warn!(
                        line = line_no + 1,
                        id = %record.id,
                        expected = dim,
                        got = record.vector.len(),
                        "vector dimension mismatch, skipping"
                    );
                    report.skipped += 1;
                    continue;
                }
                Some(_) => {}
            }

            records.push(record.into());
            report.loaded += 1;
        }

        tracing::info!(
            loaded = report.loaded,
            skipped = report.skipped,
            path = %path.display(),
            "corpus loaded into vector store"
        );

        // Reference swap: readers holding the old Arc are unaffected
        let mut guard = match self.records.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::new(records);

        Ok(report)
    }

    fn snapshot(&self) -> Arc<Vec<EmbeddingRecord>> {
        match self.records.read() {
            Ok(g) => Arc::clone(&g),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Top-`k` chunks by cosine similarity to `query`, optionally restricted
    /// to one `document_type`. Ties keep insertion order (stable sort).
    ///
    /// An empty store or `k == 0` yields `[]`; this never fails.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        document_type: Option<&str>,
    ) -> Vec<RetrievalResult> {
        if k == 0 {
            return Vec::new();
        }

        let records = self.snapshot();
        let mut scored: Vec<RetrievalResult> = records
            .iter()
            .filter(|r| match document_type {
                Some(wanted) => r.chunk.metadata.document_type == wanted,
                None => true,
            })
            .map(|r| RetrievalResult {
                chunk: r.chunk.clone(),
                similarity: cosine_similarity(query, &r.vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }

    /// All loaded chunks — used for the startup health check only.
    pub fn documents(&self) -> Vec<DocumentChunk> {
        self.snapshot().iter().map(|r| r.chunk.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for VectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
