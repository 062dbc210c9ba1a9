//! HTTP gateway to the OpenRouter chat-completions endpoint.
//!
//! The gateway is stateless per invocation: every call carries the full
//! system prompt, conversation history and user turn. Raw model output is
//! cleaned before it leaves this module; an output that cleans to nothing
//! is a failure, not an empty answer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::history::{ConversationTurn, Role};

use super::clean::clean_model_text;
use super::GenerationError;

pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

const REFERER_HEADER: &str = "http://localhost:3000";
const TITLE_HEADER: &str = "AURA Health Assistant";

/// Everything one model invocation needs.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Persona plus optional retrieval-context block.
    pub system_prompt: String,
    pub history: Vec<ConversationTurn>,
    pub user_message: String,
    /// Image accompanying the user turn, sent as a multimodal content part.
    pub image_url: Option<String>,
}

/// Seam between the fallback orchestrator and the concrete backend.
/// Mocked in tests with scripted outcomes.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn call(&self, model_id: &str, request: &ChatRequest) -> Result<String, GenerationError>;
}

// ─── Wire types ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: WireContent<'a>,
}

/// Plain text for system/history turns, content parts when the user turn
/// carries an image.
#[derive(Serialize)]
#[serde(untagged)]
enum WireContent<'a> {
    Text(&'a str),
    Parts(Vec<WirePart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum WirePart<'a> {
    #[serde(rename = "text")]
    Text { text: &'a str },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: WireImageUrl<'a> },
}

#[derive(Serialize)]
struct WireImageUrl<'a> {
    url: &'a str,
}

#[derive(Serialize)]
struct WirePayload<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: Option<WireChoiceMessage>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct WireChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireErrorEnvelope {
    error: Option<WireErrorBody>,
}

#[derive(Deserialize)]
struct WireErrorBody {
    message: String,
}

// ─── Gateway ─────────────────────────────────────────────────────────────

pub struct OpenRouterGateway {
    client: reqwest::Client,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenRouterGateway {
    pub fn new(config: &Config) -> Result<Self, GenerationError> {
        let api_key = config.api_key.clone().ok_or(GenerationError::MissingApiKey)?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OpenRouterGateway {
    async fn call(&self, model_id: &str, request: &ChatRequest) -> Result<String, GenerationError> {
        let messages = assemble_messages(request);
        let payload = WirePayload {
            model: model_id,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        tracing::debug!(model = model_id, history = request.history.len(), "calling backend");

        let response = self
            .client
            .post(OPENROUTER_API_URL)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", REFERER_HEADER)
            .header("X-Title", TITLE_HEADER)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = parse_error_message(&body);
            tracing::warn!(model = model_id, status = status.as_u16(), %message, "backend rejected request");
            return Err(GenerationError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let wire: WireResponse = response.json().await?;
        let raw = wire
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.and_then(|m| m.content).or(choice.text))
            .unwrap_or_default();

        let cleaned = clean_model_text(&raw);
        if cleaned.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(cleaned)
    }
}

/// One system entry, history with `System` turns skipped, then the user
/// turn. The system prompt is never duplicated from stored history.
fn assemble_messages(request: &ChatRequest) -> Vec<WireMessage<'_>> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(WireMessage {
        role: "system",
        content: WireContent::Text(&request.system_prompt),
    });
    for turn in &request.history {
        let role = match turn.role {
            Role::System => continue,
            Role::Assistant => "assistant",
            Role::User => "user",
        };
        messages.push(WireMessage {
            role,
            content: WireContent::Text(&turn.content),
        });
    }
    let user_content = match &request.image_url {
        Some(url) => WireContent::Parts(vec![
            WirePart::Text {
                text: &request.user_message,
            },
            WirePart::ImageUrl {
                image_url: WireImageUrl { url },
            },
        ]),
        None => WireContent::Text(&request.user_message),
    };
    messages.push(WireMessage {
        role: "user",
        content: user_content,
    });
    messages
}

fn parse_error_message(body: &str) -> String {
    serde_json::from_str::<WireErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .map(|error| error.message)
        .unwrap_or_else(|| {
            if body.is_empty() {
                "no response body".to_string()
            } else {
                body.chars().take(200).collect()
            }
        })
}
