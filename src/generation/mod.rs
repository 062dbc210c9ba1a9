pub mod clean;
pub mod fallback;
pub mod gateway;
pub mod sanitize;

use thiserror::Error;

/// Failure of a single model invocation.
///
/// Never surfaces to the end user: the fallback orchestrator consumes these
/// to drive retries and backend switches, and terminates in a fixed
/// degraded answer when every backend has failed.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// The backend answered with a non-2xx status. 429 drives the backoff
    /// retry path, 403 the moderation sanitize-retry path.
    #[error("backend rejected request (status {status}): {message}")]
    Backend { status: u16, message: String },

    /// Transport-level failure, including the request timeout.
    #[error("transport failure: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend replied 2xx but the cleaned text was empty.
    #[error("model returned no usable text")]
    EmptyResponse,

    #[error("OPENROUTER_API_KEY is not set")]
    MissingApiKey,
}

impl GenerationError {
    /// HTTP status of a backend rejection, if that is what this is.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Backend { status, .. } => Some(*status),
            _ => None,
        }
    }
}
