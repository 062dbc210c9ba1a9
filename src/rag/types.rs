use serde::{Deserialize, Serialize};

/// Provenance of a corpus chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    /// Free-form tag, e.g. "guideline" or "general". Used by retrieval
    /// filters; never interpreted beyond string equality.
    #[serde(rename = "documentType")]
    pub document_type: String,
}

/// Immutable unit of retrievable knowledge.
///
/// Created at corpus-build time, loaded read-only at process start, never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// A chunk together with its precomputed embedding.
///
/// All vectors within one store share a dimension; the loader enforces it.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub chunk: DocumentChunk,
    pub vector: Vec<f32>,
}

/// A search hit: chunk plus cosine similarity in [-1, 1]. Ephemeral,
/// produced per query.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunk: DocumentChunk,
    pub similarity: f32,
}

/// One line of the precomputed embeddings artifact.
#[derive(Debug, Deserialize)]
pub struct CorpusRecord {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub vector: Vec<f32>,
}

impl From<CorpusRecord> for EmbeddingRecord {
    fn from(record: CorpusRecord) -> Self {
        Self {
            chunk: DocumentChunk {
                id: record.id,
                content: record.content,
                metadata: record.metadata,
            },
            vector: record.vector,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corpus_record_parses_artifact_line() {
        let line = r#"{"id":"mp_001","content":"Aspirin reduces fever.","metadata":{"source":"medlineplus","documentType":"general"},"vector":[0.1,0.2,0.3,0.4]}"#;
        let record: CorpusRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.id, "mp_001");
        assert_eq!(record.metadata.document_type, "general");
        assert_eq!(record.vector.len(), 4);

        let embedded: EmbeddingRecord = record.into();
        assert_eq!(embedded.chunk.metadata.source, "medlineplus");
    }

    #[test]
    fn corpus_record_rejects_missing_vector() {
        let line = r#"{"id":"x","content":"text","metadata":{"source":"s","documentType":"general"}}"#;
        assert!(serde_json::from_str::<CorpusRecord>(line).is_err());
    }
}
