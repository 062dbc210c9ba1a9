pub mod context;
pub mod embedder;
pub mod prompt;
pub mod retriever;
pub mod store;
pub mod types;

use std::path::PathBuf;

use thiserror::Error;

/// Embedding model unavailable or inference failed.
///
/// Recovered locally by the retriever (empty-result degrade); never reaches
/// the end user. `Clone` so a failed lazy init can be replayed to every
/// caller without re-running the load.
#[derive(Error, Debug, Clone)]
#[error("embedding model unavailable: {0}")]
pub struct EmbeddingError(pub String);

/// The precomputed corpus artifact could not be read.
///
/// Recovered at startup: log a warning and run with an empty store.
/// Malformed individual lines are not an error; they are skipped and
/// counted in the load report.
#[derive(Error, Debug)]
pub enum StoreLoadError {
    #[error("cannot read corpus file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
