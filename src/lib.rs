//! AURA answering core.
//!
//! Retrieval-augmented generation over a fixed medical-document corpus,
//! combined with a multi-backend fallback cascade for turning retrieved
//! context + conversation history into a bounded, on-topic answer.
//!
//! The surrounding application (sessions, appointments, uploads) is an
//! external collaborator reachable through [`history::ChatHistoryStore`];
//! this crate owns only the answering pipeline itself.

pub mod answer;
pub mod config;
pub mod generation;
pub mod history;
pub mod rag;

use tracing_subscriber::EnvFilter;

/// Initialize tracing for binaries embedding this crate.
///
/// Honors `RUST_LOG` when set, otherwise falls back to
/// [`config::default_log_filter`].
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
