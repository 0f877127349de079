//! Error types for lmstudio-binding

use thiserror::Error;

use crate::format::Message;

/// Result type for binding operations
pub type Result<T> = std::result::Result<T, LmStudioError>;

/// Errors raised while reading or writing the history file
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that can occur while talking to the chat completions endpoint
#[derive(Error, Debug)]
pub enum LmStudioError {
    #[error("encode request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("create http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("http error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("decode response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("empty response from model")]
    EmptyResponse,

    #[error("history error: {0}")]
    History(#[from] HistoryError),

    /// The chat succeeded but the history file could not be written.
    /// `messages` holds the response the model returned.
    #[error("error persisting history: {source}")]
    HistoryNotPersisted {
        messages: Vec<Message>,
        #[source]
        source: HistoryError,
    },
}

impl LmStudioError {
    /// Response messages that survived a failed history write, if any
    pub fn response(&self) -> Option<&[Message]> {
        match self {
            Self::HistoryNotPersisted { messages, .. } => Some(messages),
            _ => None,
        }
    }

    /// Consume the error, keeping the response of a failed history write
    pub fn into_response(self) -> Option<Vec<Message>> {
        match self {
            Self::HistoryNotPersisted { messages, .. } => Some(messages),
            _ => None,
        }
    }

    pub fn is_empty_response(&self) -> bool {
        matches!(self, Self::EmptyResponse)
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}
