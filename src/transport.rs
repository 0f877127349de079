//! One request/response cycle against the chat completions endpoint

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::{LmStudioError, Result};
use crate::format::{ChatRequest, ChatResponse, Message};

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Sends a message sequence to a model and returns the reply messages
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Perform exactly one completion call. No retries.
    async fn send(&self, messages: &[Message], temperature: f64) -> Result<Vec<Message>>;
}

/// [`ChatTransport`] backed by an HTTP POST to an OpenAI-compatible server
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: String,
    model: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport whose requests expire after `timeout`
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(LmStudioError::Client)?;

        Ok(Self {
            endpoint: format!(
                "{}{}",
                base_url.trim_end_matches('/'),
                CHAT_COMPLETIONS_PATH
            ),
            model: model.into(),
            auth_token: auth_token.filter(|token| !token.is_empty()),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send(&self, messages: &[Message], temperature: f64) -> Result<Vec<Message>> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature,
        };
        let body = serde_json::to_vec(&request).map_err(LmStudioError::Encode)?;

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        debug!(
            "POST {} with {} messages (model {})",
            self.endpoint,
            messages.len(),
            self.model
        );
        let response = builder.send().await.map_err(LmStudioError::Transport)?;

        let status = response.status();
        let text = response.text().await.map_err(LmStudioError::Transport)?;
        if status != StatusCode::OK {
            return Err(LmStudioError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let chat_response: ChatResponse =
            serde_json::from_str(&text).map_err(LmStudioError::Decode)?;
        if chat_response.choices.is_empty() {
            return Err(LmStudioError::EmptyResponse);
        }

        debug!(
            "Received {} choices from {}",
            chat_response.choices.len(),
            chat_response.model
        );
        Ok(chat_response.into_messages())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(contents: &[&str]) -> serde_json::Value {
        let choices: Vec<_> = contents
            .iter()
            .enumerate()
            .map(|(i, content)| {
                json!({
                    "index": i,
                    "finish_reason": "stop",
                    "message": {"role": "assistant", "content": content}
                })
            })
            .collect();
        json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "mock-model",
            "choices": choices
        })
    }

    fn transport(server: &MockServer, token: Option<&str>) -> HttpTransport {
        HttpTransport::new(
            &server.uri(),
            "mock-model",
            token.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_posts_expected_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("content-type", "application/json"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(json!({
                "model": "mock-model",
                "messages": [{"role": "user", "content": "hello"}],
                "temperature": 0.5
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(&["hi there"])))
            .expect(1)
            .mount(&server)
            .await;

        let messages = transport(&server, Some("secret"))
            .send(&[Message::user("hello")], 0.5)
            .await
            .unwrap();

        assert_eq!(messages, vec![Message::assistant("hi there")]);
    }

    #[tokio::test]
    async fn test_send_without_token_omits_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(&["ok"])))
            .mount(&server)
            .await;

        transport(&server, Some(""))
            .send(&[Message::user("hello")], 0.0)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("authorization").is_none());

        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("temperature").is_none());
    }

    #[tokio::test]
    async fn test_send_returns_every_choice_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion(&["a", "b", "c"])),
            )
            .mount(&server)
            .await;

        let messages = transport(&server, None).send(&[], 1.0).await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_non_success_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("server exploded"))
            .mount(&server)
            .await;

        let err = transport(&server, None)
            .send(&[Message::user("fail")], 0.5)
            .await
            .unwrap_err();

        match &err {
            LmStudioError::Api { status, body } => {
                assert_eq!(*status, 500);
                assert_eq!(body, "server exploded");
            }
            other => panic!("expected API error, got {other:?}"),
        }
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("server exploded"));
    }

    #[tokio::test]
    async fn test_empty_choices_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(&[])))
            .mount(&server)
            .await;

        let err = transport(&server, None)
            .send(&[Message::user("test")], 0.7)
            .await
            .unwrap_err();

        assert!(err.is_empty_response());
        assert!(!err.is_decode());
    }

    #[tokio::test]
    async fn test_bad_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not-json"))
            .mount(&server)
            .await;

        let err = transport(&server, None)
            .send(&[Message::user("fail")], 0.5)
            .await
            .unwrap_err();

        assert!(err.is_decode());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // nothing listens on port 1
        let transport =
            HttpTransport::new("http://127.0.0.1:1", "mock-model", None, Duration::from_secs(2))
                .unwrap();
        let err = transport
            .send(&[Message::user("anyone?")], 0.5)
            .await
            .unwrap_err();

        assert!(matches!(err, LmStudioError::Transport(_)));
    }

    #[tokio::test]
    async fn test_non_finite_temperature_is_encode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(&["ok"])))
            .mount(&server)
            .await;

        let transport = transport(&server, None);
        for temperature in [f64::NAN, f64::INFINITY] {
            let err = transport
                .send(&[Message::user("hi")], temperature)
                .await
                .unwrap_err();
            assert!(matches!(err, LmStudioError::Encode(_)), "got {err:?}");
        }

        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion(&["late"]))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let transport =
            HttpTransport::new(&server.uri(), "mock-model", None, Duration::from_millis(50))
                .unwrap();
        let err = transport.send(&[Message::user("hurry")], 0.5).await.unwrap_err();

        match err {
            LmStudioError::Transport(e) => assert!(e.is_timeout()),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_trailing_slash_is_trimmed() {
        let transport = HttpTransport::new(
            "http://localhost:1234/",
            "m",
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(transport.endpoint(), "http://localhost:1234/v1/chat/completions");
        assert_eq!(transport.model(), "m");
    }
}
