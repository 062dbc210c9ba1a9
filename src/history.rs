//! Conversation history types and the persistence seam.
//!
//! The chat-persistence layer (sessions, users) lives outside this crate;
//! the pipeline receives history as a read-only slice and never writes it.
//! [`ChatHistoryStore`] is the interface that layer implements.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Who produced a conversation turn.
///
/// `System` never appears in stored history produced by this crate, but
/// callers may hand us history containing it; prompt assembly skips those
/// entries so the persona prompt is never duplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One turn of a conversation, owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("history store unavailable: {0}")]
    Unavailable(String),
}

/// Append/read access to per-session chat history.
///
/// Implemented by the excluded persistence layer. The pipeline itself never
/// calls this; it exists so embedding applications share one contract.
pub trait ChatHistoryStore: Send + Sync {
    fn append(&self, session_id: &str, turns: &[ConversationTurn]) -> Result<(), HistoryError>;
    fn read(&self, session_id: &str) -> Result<Vec<ConversationTurn>, HistoryError>;
}

/// In-memory history store for tests and single-process embedding.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    sessions: Mutex<HashMap<String, Vec<ConversationTurn>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatHistoryStore for InMemoryHistoryStore {
    fn append(&self, session_id: &str, turns: &[ConversationTurn]) -> Result<(), HistoryError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| HistoryError::Unavailable("lock poisoned".into()))?;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .extend_from_slice(turns);
        Ok(())
    }

    fn read(&self, session_id: &str) -> Result<Vec<ConversationTurn>, HistoryError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| HistoryError::Unavailable("lock poisoned".into()))?;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
    }

    #[test]
    fn append_then_read_round_trips() {
        let store = InMemoryHistoryStore::new();
        store
            .append(
                "s1",
                &[
                    ConversationTurn::user("What causes migraines?"),
                    ConversationTurn::assistant("Common triggers include..."),
                ],
            )
            .unwrap();

        let turns = store.read("s1").unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Assistant);
    }

    #[test]
    fn unknown_session_reads_empty() {
        let store = InMemoryHistoryStore::new();
        assert!(store.read("nope").unwrap().is_empty());
    }

    #[test]
    fn sessions_are_isolated() {
        let store = InMemoryHistoryStore::new();
        store.append("a", &[ConversationTurn::user("hi")]).unwrap();
        store.append("b", &[ConversationTurn::user("hello")]).unwrap();
        assert_eq!(store.read("a").unwrap().len(), 1);
        assert_eq!(store.read("b").unwrap().len(), 1);
        assert_eq!(store.read("a").unwrap()[0].content, "hi");
    }
}
