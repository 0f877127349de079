//! Wire format for the `/v1/chat/completions` endpoint

use serde::{Deserialize, Serialize, Serializer};

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

/// A single chat message.
///
/// The role is kept as a free-form string: servers are free to answer with
/// roles this crate does not know about, and those must survive a trip
/// through the history file unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    /// Create a new message
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ROLE_SYSTEM, content)
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ROLE_USER, content)
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ROLE_ASSISTANT, content)
    }
}

/// Request body sent to the chat completions endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    #[serde(skip_serializing_if = "is_zero", serialize_with = "finite")]
    pub temperature: f64,
}

fn is_zero(value: &f64) -> bool {
    *value == 0.0
}

// serde_json writes NaN and infinities as `null`; refuse them instead
fn finite<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if !value.is_finite() {
        return Err(serde::ser::Error::custom(format!(
            "unsupported temperature: {value}"
        )));
    }
    serializer.serialize_f64(*value)
}

/// One completion choice
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub finish_reason: Option<String>,
    pub message: Message,
}

/// Response body returned by the chat completions endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

impl ChatResponse {
    /// Messages of every choice, in the order the server listed them
    pub fn into_messages(self) -> Vec<Message> {
        self.choices.into_iter().map(|choice| choice.message).collect()
    }
}
