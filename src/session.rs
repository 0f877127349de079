//! The client façade: chat calls with optional per-conversation history

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::Config;
use crate::compaction::{LOGICAL_COMPRESS_TEMPERATURE, compression_request};
use crate::error::{LmStudioError, Result};
use crate::format::Message;
use crate::storage::HistoryStore;
use crate::transport::{ChatTransport, HttpTransport};

/// Conversation id meaning "do not track history for this call"
pub const UNTRACKED: &str = "";

const SESSION_ID_PREFIX: &str = "lmstudio-binding-session";

/// Operations offered by a chat client
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send messages, prefixing the stored history of `conversation_id` and
    /// recording the reply under it. An empty id skips history entirely.
    async fn chat_with_context(
        &self,
        messages: Vec<Message>,
        conversation_id: &str,
        temperature: f64,
    ) -> Result<Vec<Message>>;

    /// Send messages without touching history
    async fn chat(&self, messages: Vec<Message>, temperature: f64) -> Result<Vec<Message>> {
        self.chat_with_context(messages, UNTRACKED, temperature).await
    }

    /// Ask the model for a single-message summary of a discussion
    async fn logical_compress_context(&self, messages: Vec<Message>) -> Result<Message>;

    /// Forget one conversation
    async fn flush_message_history(&self, conversation_id: &str);

    /// Forget every conversation
    async fn reset_message_history(&self);
}

/// Client for an LMStudio server.
///
/// Holds the transport and the history store; both live as long as the
/// binding. Share it across tasks behind an `Arc`.
pub struct Binding {
    base_url: String,
    model: String,
    session_id: String,
    timeout: Duration,
    transport: Arc<dyn ChatTransport>,
    history: HistoryStore,
}

impl Binding {
    /// Binding with default settings: no auth token, no history file and a
    /// five second timeout
    pub async fn quick(
        base_url: impl Into<String>,
        model: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Result<Self> {
        let config = Config::default()
            .with_base_url(base_url)
            .with_model(model)
            .with_session_id(session_id);
        Self::new(config).await
    }

    /// Binding talking HTTP to `config.base_url`.
    /// Loads the history file if one is configured and exists.
    pub async fn new(config: Config) -> Result<Self> {
        let transport = HttpTransport::new(
            &config.base_url,
            config.model.clone(),
            config.auth_token.clone(),
            config.timeout,
        )?;
        Self::with_transport(config, Arc::new(transport)).await
    }

    /// Binding over any transport.
    ///
    /// `config.base_url`, `config.model` and `config.timeout` are kept as
    /// configuration only; the transport decides what it actually sends.
    pub async fn with_transport(config: Config, transport: Arc<dyn ChatTransport>) -> Result<Self> {
        let session_id = match config.session_id {
            Some(id) if !id.is_empty() => id,
            _ => generate_session_id(),
        };

        let history = match &config.persist_history_file {
            Some(path) => HistoryStore::with_file(path),
            None => HistoryStore::new(),
        };
        history.load().await?;

        debug!(
            "Created binding {} for model {} at {}",
            session_id, config.model, config.base_url
        );

        Ok(Self {
            base_url: config.base_url,
            model: config.model,
            session_id,
            timeout: config.timeout,
            transport,
            history,
        })
    }

    /// Configured server root
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Configured model name
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Configured request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The conversation store behind this binding
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("session_id", &self.session_id)
            .field("timeout", &self.timeout)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatClient for Binding {
    async fn chat_with_context(
        &self,
        messages: Vec<Message>,
        conversation_id: &str,
        temperature: f64,
    ) -> Result<Vec<Message>> {
        let tracked = !conversation_id.is_empty();

        let outgoing = if tracked {
            let mut outgoing = self.history.read(conversation_id).await;
            outgoing.extend(messages);
            outgoing
        } else {
            messages
        };

        let response = self.transport.send(&outgoing, temperature).await?;

        if tracked {
            self.history.append(conversation_id, &response).await;
            if let Err(source) = self.history.persist().await {
                warn!(
                    "Chat for conversation {} succeeded but history was not saved: {}",
                    conversation_id, source
                );
                return Err(LmStudioError::HistoryNotPersisted {
                    messages: response,
                    source,
                });
            }
        }

        Ok(response)
    }

    async fn logical_compress_context(&self, messages: Vec<Message>) -> Result<Message> {
        let request = compression_request(&messages);
        let mut result = self.chat(request, LOGICAL_COMPRESS_TEMPERATURE).await?;
        result.pop().ok_or(LmStudioError::EmptyResponse)
    }

    async fn flush_message_history(&self, conversation_id: &str) {
        self.history.flush(conversation_id).await;
    }

    async fn reset_message_history(&self) {
        self.history.reset_all().await;
    }
}

fn generate_session_id() -> String {
    let now = Utc::now();
    let nanos = now
        .timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1000));
    format!("{}-{}", SESSION_ID_PREFIX, nanos)
}
