//! # lmstudio-binding
//!
//! Client for LMStudio's OpenAI-compatible chat completions API.
//!
//! This crate provides:
//! - Chat calls against `/v1/chat/completions`
//! - Optional per-conversation history, kept in memory and mirrored to a JSON file
//! - Logical compression of a discussion into a single summary message
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lmstudio_binding::{Binding, ChatClient, Message};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let binding = Binding::quick("http://localhost:1234", "qwen2.5-7b-instruct", "").await?;
//!
//! // Replies are remembered under "support" and sent back on the next call
//! let reply = binding
//!     .chat_with_context(vec![Message::user("Hello, can you help me?")], "support", 0.7)
//!     .await?;
//! println!("{}", reply[0].content);
//! # Ok(())
//! # }
//! ```

pub mod compaction;
pub mod error;
pub mod format;
pub mod session;
pub mod storage;
pub mod transport;

use std::path::{Path, PathBuf};
use std::time::Duration;

pub use compaction::{LOGICAL_COMPRESS_PROMPT, LOGICAL_COMPRESS_TEMPERATURE};
pub use error::{HistoryError, LmStudioError, Result};
pub use format::{ChatChoice, ChatRequest, ChatResponse, Message};
pub use session::{Binding, ChatClient};
pub use storage::HistoryStore;
pub use transport::{ChatTransport, HttpTransport};

/// Configuration for a [`Binding`]
#[derive(Debug, Clone)]
pub struct Config {
    /// Server root, without the `/v1/...` path
    pub base_url: String,
    /// Sent as `Authorization: Bearer <token>` when present and non-empty
    pub auth_token: Option<String>,
    pub model: String,
    /// Generated from the current time when absent or empty
    pub session_id: Option<String>,
    /// Upper bound on a single HTTP call
    pub timeout: Duration,
    /// History file; history stays in memory only when unset
    pub persist_history_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234".to_string(), // LMStudio's default port
            auth_token: None,
            model: String::new(),
            session_id: None,
            timeout: Duration::from_secs(5),
            persist_history_file: None,
        }
    }
}

impl Config {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_persist_history_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.persist_history_file = Some(path.as_ref().to_path_buf());
        self
    }
}
