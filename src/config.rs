use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "AURA";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of documents retrieved per query.
pub const DEFAULT_TOP_K: usize = 5;
/// Default minimum cosine similarity for a retrieved document.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.3;
/// Default hard timeout for generation-backend HTTP calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(25);
/// Default character budget for the formatted retrieval-context block.
pub const DEFAULT_CONTEXT_BUDGET: usize = 1500;

/// Primary generation backend.
pub const DEFAULT_PRIMARY_MODEL: &str = "openai/gpt-oss-20b:free";
/// First backup backend.
pub const DEFAULT_BACKUP_MODEL: &str = "google/gemma-3n-e4b-it:free";
/// Second backup backend, typically with lenient moderation.
pub const DEFAULT_SECOND_BACKUP_MODEL: &str = "mistralai/mistral-7b-instruct:free";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "aura_core=info"
}

/// Runtime configuration for the answering core.
///
/// Built once at startup from the environment and passed by reference into
/// the pipeline; no module reads the environment on its own.
#[derive(Debug, Clone)]
pub struct Config {
    /// Master switch for retrieval. Off means every answer goes straight to
    /// the generation cascade with no context block.
    pub rag_enabled: bool,
    pub rag_top_k: usize,
    pub rag_similarity_threshold: f32,
    /// Character budget for the compacted context block.
    pub context_budget: usize,
    /// Bearer token for the generation backends. Missing key is not fatal
    /// here; the gateway fails each call and the cascade degrades.
    pub api_key: Option<String>,
    pub primary_model: String,
    pub backup_model: String,
    pub second_backup_model: String,
    pub request_timeout: Duration,
    /// Precomputed embeddings artifact (newline-delimited JSON).
    pub corpus_path: PathBuf,
    /// Directory with `model.onnx` and `tokenizer.json` for the local
    /// sentence embedder. Only read when the `onnx-embeddings` feature is
    /// enabled.
    pub model_dir: PathBuf,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rag_enabled: true,
            rag_top_k: DEFAULT_TOP_K,
            rag_similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            context_budget: DEFAULT_CONTEXT_BUDGET,
            api_key: None,
            primary_model: DEFAULT_PRIMARY_MODEL.to_string(),
            backup_model: DEFAULT_BACKUP_MODEL.to_string(),
            second_backup_model: DEFAULT_SECOND_BACKUP_MODEL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            corpus_path: PathBuf::from("data/medlineplus_embeddings.jsonl"),
            model_dir: PathBuf::from("data/minilm"),
            max_tokens: 2000,
            temperature: 0.7,
        }
    }
}

impl Config {
    /// Read configuration from the process environment.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            rag_enabled: parse_flag(std::env::var("RAG_ENABLED").ok().as_deref(), true),
            rag_top_k: parse_or(std::env::var("RAG_TOP_K").ok().as_deref(), defaults.rag_top_k),
            rag_similarity_threshold: parse_or(
                std::env::var("RAG_SIMILARITY_THRESHOLD").ok().as_deref(),
                defaults.rag_similarity_threshold,
            ),
            context_budget: parse_or(
                std::env::var("RAG_CONTEXT_BUDGET").ok().as_deref(),
                defaults.context_budget,
            ),
            api_key: std::env::var("OPENROUTER_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            primary_model: var_or("AURA_PRIMARY_MODEL", &defaults.primary_model),
            backup_model: var_or("AURA_BACKUP_MODEL", &defaults.backup_model),
            second_backup_model: var_or(
                "AURA_SECOND_BACKUP_MODEL",
                &defaults.second_backup_model,
            ),
            request_timeout: Duration::from_millis(parse_or(
                std::env::var("REQUEST_TIMEOUT_MS").ok().as_deref(),
                defaults.request_timeout.as_millis() as u64,
            )),
            corpus_path: std::env::var("AURA_CORPUS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.corpus_path),
            model_dir: std::env::var("AURA_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
        }
    }
}

/// Boolean env flag: only the literal `"false"` disables, everything else
/// (including unset) keeps the default.
fn parse_flag(value: Option<&str>, default: bool) -> bool {
    match value {
        Some(v) if v.eq_ignore_ascii_case("false") => false,
        Some(v) if v.eq_ignore_ascii_case("true") => true,
        _ => default,
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<&str>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_tuning() {
        let config = Config::default();
        assert!(config.rag_enabled);
        assert_eq!(config.rag_top_k, 5);
        assert!((config.rag_similarity_threshold - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.request_timeout, Duration::from_secs(25));
        assert_eq!(config.context_budget, 1500);
    }

    #[test]
    fn flag_only_literal_false_disables() {
        assert!(!parse_flag(Some("false"), true));
        assert!(!parse_flag(Some("FALSE"), true));
        assert!(parse_flag(Some("true"), false));
        assert!(parse_flag(Some("0"), true)); // not a recognized literal
        assert!(parse_flag(None, true));
        assert!(!parse_flag(None, false));
    }

    #[test]
    fn parse_or_falls_back_on_garbage() {
        assert_eq!(parse_or::<usize>(Some("7"), 5), 7);
        assert_eq!(parse_or::<usize>(Some("not a number"), 5), 5);
        assert_eq!(parse_or::<usize>(None, 5), 5);
        assert!((parse_or::<f32>(Some("0.45"), 0.3) - 0.45).abs() < f32::EPSILON);
    }

    #[test]
    fn backend_chain_has_three_distinct_models() {
        let config = Config::default();
        assert_ne!(config.primary_model, config.backup_model);
        assert_ne!(config.backup_model, config.second_backup_model);
        assert_ne!(config.primary_model, config.second_backup_model);
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
