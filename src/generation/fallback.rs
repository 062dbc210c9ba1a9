//! Multi-backend fallback with bounded retries.
//!
//! The cascade is an explicit state machine over three backends: the
//! primary with rate-limit backoff, a first backup with a one-shot
//! moderation sanitize-retry, and a lenient second backup that always
//! receives sanitized input. The terminal failure state yields a fixed
//! degraded answer; nothing in this module can fail outward.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::history::ConversationTurn;
use crate::rag::context::ContextBudgeter;

use super::gateway::{ChatModel, ChatRequest};
use super::sanitize::sanitize_for_moderation;
use super::GenerationError;

/// Returned when every backend in the cascade has failed.
pub const DEGRADED_ANSWER: &str = "I'm currently unable to process your message reliably due to \
service limits. Please try again shortly. If this is urgent, contact a licensed healthcare \
provider.";

/// Extra attempts on the primary after a 429, beyond the first call.
const PRIMARY_MAX_RETRIES: u32 = 2;
const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_CAP_MS: u64 = 10_000;
const BACKOFF_JITTER_MS: u64 = 250;

/// Classification of one backend attempt, kept for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RateLimited,
    Moderated,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub backend: String,
    pub sanitized: bool,
    pub outcome: AttemptOutcome,
}

/// What the caller wants generated. The persona and the optional retrieval
/// context stay separate so sanitized retries can recombine them.
#[derive(Debug, Clone)]
pub struct GenerationInputs {
    pub persona: String,
    pub message: String,
    pub history: Vec<ConversationTurn>,
    pub rag_context: Option<String>,
    /// Image riding with the user turn. Kept on every attempt, sanitized
    /// retries included.
    pub image_url: Option<String>,
}

enum State {
    TryPrimary { attempt: u32 },
    TryBackup { sanitized_retry: bool },
    TrySecondBackup,
    Done(String),
    AllFailed,
}

pub struct FallbackOrchestrator {
    model: Arc<dyn ChatModel>,
    budgeter: ContextBudgeter,
    primary_model: String,
    backup_model: String,
    second_backup_model: String,
}

impl FallbackOrchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        budgeter: ContextBudgeter,
        primary_model: String,
        backup_model: String,
        second_backup_model: String,
    ) -> Self {
        Self {
            model,
            budgeter,
            primary_model,
            backup_model,
            second_backup_model,
        }
    }

    /// Run the cascade. Always produces an answer; the worst case is the
    /// fixed degraded text.
    pub async fn generate(&self, inputs: &GenerationInputs) -> String {
        self.generate_with_log(inputs).await.0
    }

    /// Like [`generate`](Self::generate), also returning the per-attempt
    /// record of the cascade.
    pub async fn generate_with_log(
        &self,
        inputs: &GenerationInputs,
    ) -> (String, Vec<AttemptRecord>) {
        let base_request = self.request_for(inputs, false);
        let sanitized_request = self.request_for(inputs, true);
        let mut attempts: Vec<AttemptRecord> = Vec::new();

        let mut state = State::TryPrimary { attempt: 0 };
        loop {
            state = match state {
                State::TryPrimary { attempt } => {
                    if attempt > 0 {
                        let delay = backoff_delay(attempt);
                        tracing::info!(
                            backend = %self.primary_model,
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            "rate limited, backing off before retry"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    match self.model.call(&self.primary_model, &base_request).await {
                        Ok(text) => {
                            record(&mut attempts, &self.primary_model, false, AttemptOutcome::Success);
                            State::Done(text)
                        }
                        Err(e) => {
                            record(&mut attempts, &self.primary_model, false, classify(&e));
                            tracing::warn!(backend = %self.primary_model, error = %e, "primary model failed");
                            if e.status() == Some(429) && attempt < PRIMARY_MAX_RETRIES {
                                State::TryPrimary { attempt: attempt + 1 }
                            } else {
                                State::TryBackup { sanitized_retry: false }
                            }
                        }
                    }
                }
                State::TryBackup { sanitized_retry } => {
                    let request = if sanitized_retry {
                        &sanitized_request
                    } else {
                        &base_request
                    };
                    match self.model.call(&self.backup_model, request).await {
                        Ok(text) => {
                            record(&mut attempts, &self.backup_model, sanitized_retry, AttemptOutcome::Success);
                            State::Done(text)
                        }
                        Err(e) => {
                            record(&mut attempts, &self.backup_model, sanitized_retry, classify(&e));
                            tracing::warn!(backend = %self.backup_model, error = %e, "backup model failed");
                            if !sanitized_retry && e.status() == Some(403) {
                                tracing::info!(
                                    backend = %self.backup_model,
                                    "moderation rejection, retrying with sanitized input"
                                );
                                State::TryBackup { sanitized_retry: true }
                            } else {
                                State::TrySecondBackup
                            }
                        }
                    }
                }
                State::TrySecondBackup => {
                    match self
                        .model
                        .call(&self.second_backup_model, &sanitized_request)
                        .await
                    {
                        Ok(text) => {
                            record(&mut attempts, &self.second_backup_model, true, AttemptOutcome::Success);
                            State::Done(text)
                        }
                        Err(e) => {
                            record(&mut attempts, &self.second_backup_model, true, classify(&e));
                            tracing::warn!(backend = %self.second_backup_model, error = %e, "second backup model failed");
                            State::AllFailed
                        }
                    }
                }
                State::Done(text) => return (text, attempts),
                State::AllFailed => {
                    tracing::error!(attempts = attempts.len(), "all models failed, returning degraded answer");
                    return (DEGRADED_ANSWER.to_string(), attempts);
                }
            };
        }
    }

    fn request_for(&self, inputs: &GenerationInputs, sanitized: bool) -> ChatRequest {
        let context = inputs
            .rag_context
            .as_deref()
            .map(|c| self.budgeter.compact(c));
        let system_prompt = match context {
            Some(c) if !c.is_empty() => format!("{}{c}", inputs.persona),
            _ => inputs.persona.clone(),
        };
        let user_message = if sanitized {
            sanitize_for_moderation(&inputs.message)
        } else {
            inputs.message.clone()
        };
        ChatRequest {
            system_prompt,
            history: inputs.history.clone(),
            user_message,
            image_url: inputs.image_url.clone(),
        }
    }
}

/// `min(cap, base * 2^(attempt-1)) + jitter(0..250ms)` for attempt >= 1.
fn backoff_delay(attempt: u32) -> Duration {
    let exponential = BACKOFF_BASE_MS.saturating_mul(1 << (attempt - 1));
    let jitter = rand::thread_rng().gen_range(0..BACKOFF_JITTER_MS);
    Duration::from_millis(exponential.min(BACKOFF_CAP_MS) + jitter)
}

fn classify(error: &GenerationError) -> AttemptOutcome {
    match error.status() {
        Some(429) => AttemptOutcome::RateLimited,
        Some(403) => AttemptOutcome::Moderated,
        _ => AttemptOutcome::Failed(error.to_string()),
    }
}

fn record(attempts: &mut Vec<AttemptRecord>, backend: &str, sanitized: bool, outcome: AttemptOutcome) {
    attempts.push(AttemptRecord {
        backend: backend.to_string(),
        sanitized,
        outcome,
    });
}
