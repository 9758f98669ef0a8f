//! Authenticated Genie completion client.
//!
//! Every completion is issued on behalf of one [`Identity`]. The client first
//! obtains a bearer token for that identity from the auth endpoint, caching
//! it for the configured lifetime and collapsing concurrent fetches for the
//! same identity into one request, then posts the conversation to the
//! completion endpoint and returns the text of the first choice.
//!
//! # Examples
//!
//! ```no_run
//! use genie_client::{CompletionClient, GenieClient};
//! use genie_common::{Config, Identity, Message};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::new("my-app", "gpt-4o").with_api_key("...");
//! let client = GenieClient::new(config)?;
//!
//! let identity = Identity::new("6530000021", "student.chula.ac.th")
//!     .ok_or_else(|| anyhow::anyhow!("missing handle"))?;
//! let reply = client.complete(&[Message::user("Hello!")], &identity).await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```
//!
//! # Security
//!
//! The static API key and every issued token are held as [`SecretString`]s
//! and only exposed while building request headers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::ClientWithMiddleware;
use secrecy::{ExposeSecret, SecretString};

use genie_common::{Config, Identity, Message};

use crate::CompletionClient;
use crate::coalescer::TokenCoalescer;
use crate::error::ClientError;
use crate::genie::{AuthRequest, AuthResponse, ChatCompletionRequest, ChatCompletionResponse};

/// Header carrying the static API key on auth requests.
const API_KEY_HEADER: &str = "api-key";

/// Client for the Genie auth and completion endpoints.
///
/// Cloning is cheap and clones share the token cache.
#[derive(Clone)]
pub struct GenieClient {
    client: ClientWithMiddleware,
    config: Arc<Config>,
    api_key: Arc<SecretString>,
    tokens: Arc<TokenCoalescer>,
}

impl fmt::Debug for GenieClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenieClient")
            .field("config", &self.config)
            .field("api_key", &"[REDACTED]")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl GenieClient {
    /// Create a client from a configuration.
    ///
    /// A request timeout is applied only when `timeout_seconds` is set.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConfigurationError`] if the configuration does
    /// not validate or the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, ClientError> {
        let builder = reqwest::Client::builder();
        let builder = match config.timeout_seconds {
            Some(timeout) => builder.timeout(Duration::from_secs(timeout)),
            None => builder,
        };
        let http = builder
            .build()
            .map_err(|e| ClientError::ConfigurationError(format!("cannot build HTTP client: {e}")))?;

        Self::with_http_client(config, http)
    }

    /// Create a client that sends requests through `http`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConfigurationError`] if the configuration does
    /// not validate.
    pub fn with_http_client(config: Config, http: reqwest::Client) -> Result<Self, ClientError> {
        config
            .validate()
            .map_err(|e| ClientError::ConfigurationError(e.to_string()))?;

        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ClientError::ConfigurationError("API key is required".to_string()))?;

        let ttl = chrono::Duration::from_std(config.token_ttl())
            .map_err(|e| ClientError::ConfigurationError(format!("invalid token ttl: {e}")))?;

        Ok(Self {
            client: reqwest_middleware::ClientBuilder::new(http).build(),
            config: Arc::new(config),
            api_key: Arc::new(api_key),
            tokens: Arc::new(TokenCoalescer::new(ttl)),
        })
    }

    /// The configuration this client was built from.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The token cache and in-flight registry.
    #[must_use]
    pub fn tokens(&self) -> &TokenCoalescer {
        &self.tokens
    }

    /// Returns a bearer token for `identity`, fetching one if needed.
    ///
    /// # Errors
    ///
    /// Propagates the error of the auth request that served this call.
    pub async fn token(&self, identity: &Identity) -> Result<Arc<SecretString>, ClientError> {
        let fetch = TokenFetch {
            client: self.client.clone(),
            auth_url: self.config.auth_url.clone(),
            api_key: Arc::clone(&self.api_key),
            app_id: self.config.app_id.clone(),
            email: identity.email().to_string(),
            cunet_id: identity.cunet_id().to_string(),
        };

        self.tokens
            .get_token(&identity.key(), move || fetch.run())
            .await
    }
}

/// Owned inputs of one auth request, so the fetch can outlive its caller.
struct TokenFetch {
    client: ClientWithMiddleware,
    auth_url: String,
    api_key: Arc<SecretString>,
    app_id: String,
    email: String,
    cunet_id: String,
}

impl TokenFetch {
    async fn run(self) -> Result<SecretString, ClientError> {
        let body = AuthRequest {
            app_id: &self.app_id,
            email: &self.email,
            cunet_id: &self.cunet_id,
        };
        let body = serde_json::to_string(&body)
            .map_err(|e| ClientError::ProtocolError(format!("cannot encode auth request: {e}")))?;

        debug!("Requesting token for {}", self.cunet_id);
        let response = self
            .client
            .post(&self.auth_url)
            .header(CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!(
                "Token request for {} rejected with status {}: {}",
                self.cunet_id,
                status.as_u16(),
                text
            );
            return Err(ClientError::AuthenticationError { status, body: text });
        }

        let parsed: AuthResponse = serde_json::from_str(&text)
            .map_err(|e| ClientError::ProtocolError(format!("invalid auth response: {e}")))?;

        if parsed.token.is_empty() {
            return Err(ClientError::ProtocolError(
                "auth response carried an empty token".to_string(),
            ));
        }

        Ok(SecretString::from(parsed.token))
    }
}

#[async_trait]
impl CompletionClient for GenieClient {
    async fn complete(&self, messages: &[Message], identity: &Identity) -> Result<String, ClientError> {
        let token = self.token(identity).await?;

        let request = ChatCompletionRequest::builder()
            .model(&self.config.model)
            .messages(messages)
            .temperature(self.config.temperature)
            .build();
        let body = serde_json::to_string(&request).map_err(|e| {
            ClientError::ProtocolError(format!("cannot encode completion request: {e}"))
        })?;

        debug!(
            "Sending {} message(s) to {} for {identity}",
            messages.len(),
            self.config.model
        );
        let response = self
            .client
            .post(&self.config.completion_url)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(token.expose_secret())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!(
                "Completion request failed with status {}: {}",
                status.as_u16(),
                text
            );
            return Err(ClientError::UpstreamError { status, body: text });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| ClientError::ProtocolError(format!("invalid completion response: {e}")))?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            warn!("Completion for {identity} returned no choices");
            ClientError::EmptyResponse
        })?;

        Ok(choice.message.content.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use super::*;
    use futures::future::join_all;
    use genie_common::{ContentPart, DEFAULT_EMAIL_DOMAIN};
    use reqwest::StatusCode;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(base_url: &str) -> Config {
        Config::new("app-1", "gpt-test")
            .with_api_key("test-key")
            .with_auth_url(format!("{base_url}/auth"))
            .with_completion_url(format!("{base_url}/completions"))
    }

    fn identity(handle: &str) -> Identity {
        Identity::new(handle, DEFAULT_EMAIL_DOMAIN).unwrap()
    }

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "choices": [{
                "message": {"role": "assistant", "content": content}
            }]
        })
    }

    async fn mount_auth(server: &MockServer, token: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/auth"))
            .and(header("api-key", "test-key"))
            .and(header("content-type", "application/json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"token": token, "token_type": "Bearer"}))
                    .set_delay(std::time::Duration::from_millis(50)),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_successful_completion() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth"))
            .and(body_json(json!({
                "app_id": "app-1",
                "email": "6530000021@student.chula.ac.th",
                "cunet_id": "6530000021"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "tok-1"})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/completions"))
            .and(header("authorization", "Bearer tok-1"))
            .and(body_partial_json(json!({
                "model": "gpt-test",
                "stream": false,
                "messages": [{"role": "user", "content": [{"type": "text", "text": "hi"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("hello")))
            .expect(1)
            .mount(&server)
            .await;

        let client = GenieClient::new(create_test_config(&server.uri())).unwrap();
        let reply = client
            .complete(&[Message::user("hi")], &identity("6530000021"))
            .await
            .unwrap();

        assert_eq!(reply, "hello");
    }

    #[tokio::test]
    async fn test_temperature_forwarded_when_configured() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok", 1).await;

        Mock::given(method("POST"))
            .and(path("/completions"))
            .and(body_partial_json(json!({"temperature": 0.25})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let config = create_test_config(&server.uri()).with_temperature(0.25);
        let client = GenieClient::new(config).unwrap();
        let reply = client
            .complete(&[Message::user("hi")], &identity("u1"))
            .await
            .unwrap();

        assert_eq!(reply, "ok");
    }

    #[tokio::test]
    async fn test_image_parts_are_sent_as_typed_content() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok", 1).await;

        Mock::given(method("POST"))
            .and(path("/completions"))
            .and(body_partial_json(json!({
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "what is this?"},
                        {"type": "image_url", "image_url": {"url": "data:image/png;base64,AA=="}}
                    ]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("a pixel")))
            .expect(1)
            .mount(&server)
            .await;

        let client = GenieClient::new(create_test_config(&server.uri())).unwrap();
        let message = Message::user("what is this?")
            .with_part(ContentPart::image_url("data:image/png;base64,AA=="));
        let reply = client.complete(&[message], &identity("u1")).await.unwrap();

        assert_eq!(reply, "a pixel");
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok", 1).await;

        Mock::given(method("POST"))
            .and(path("/completions"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
            .expect(3)
            .mount(&server)
            .await;

        let client = GenieClient::new(create_test_config(&server.uri())).unwrap();
        let id = identity("u1");
        for _ in 0..3 {
            client.complete(&[Message::user("hi")], &id).await.unwrap();
        }

        assert_eq!(client.tokens().store().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_completions_share_one_auth_call() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok", 1).await;

        Mock::given(method("POST"))
            .and(path("/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
            .expect(8)
            .mount(&server)
            .await;

        let client = GenieClient::new(create_test_config(&server.uri())).unwrap();
        let id = identity("u1");
        let messages = [Message::user("hi")];

        let results = join_all((0..8).map(|_| client.complete(&messages, &id))).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(client.tokens().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_identities_get_separate_tokens() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok", 2).await;

        Mock::given(method("POST"))
            .and(path("/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
            .expect(2)
            .mount(&server)
            .await;

        let client = GenieClient::new(create_test_config(&server.uri())).unwrap();
        let messages = [Message::user("hi")];
        let (u1, u2) = (identity("u1"), identity("u2"));
        let (a, b) = futures::join!(
            client.complete(&messages, &u1),
            client.complete(&messages, &u2),
        );

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(client.tokens().store().len(), 2);
    }

    #[tokio::test]
    async fn test_auth_rejection() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unknown user"))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
            .expect(0)
            .mount(&server)
            .await;

        let client = GenieClient::new(create_test_config(&server.uri())).unwrap();
        let err = client
            .complete(&[Message::user("hi")], &identity("u1"))
            .await
            .unwrap_err();

        match err {
            ClientError::AuthenticationError { status, body } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, "unknown user");
            }
            other => panic!("Expected AuthenticationError, got {other:?}"),
        }
        assert!(client.tokens().store().is_empty());
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_cached() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        mount_auth(&server, "tok", 1).await;

        Mock::given(method("POST"))
            .and(path("/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let client = GenieClient::new(create_test_config(&server.uri())).unwrap();
        let id = identity("u1");

        let first = client.complete(&[Message::user("hi")], &id).await;
        assert!(first.unwrap_err().is_authentication_error());

        let second = client.complete(&[Message::user("hi")], &id).await.unwrap();
        assert_eq!(second, "ok");
    }

    #[tokio::test]
    async fn test_malformed_auth_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "x"})))
            .mount(&server)
            .await;

        let client = GenieClient::new(create_test_config(&server.uri())).unwrap();
        let err = client
            .complete(&[Message::user("hi")], &identity("u1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::ProtocolError(_)));
    }

    #[tokio::test]
    async fn test_upstream_error_keeps_status_and_body() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok", 1).await;

        Mock::given(method("POST"))
            .and(path("/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
            .mount(&server)
            .await;

        let client = GenieClient::new(create_test_config(&server.uri())).unwrap();
        let err = client
            .complete(&[Message::user("hi")], &identity("u1"))
            .await
            .unwrap_err();

        assert!(err.is_upstream_error());
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(err.to_string().contains("model overloaded"));
    }

    #[tokio::test]
    async fn test_undecodable_completion() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok", 1).await;

        Mock::given(method("POST"))
            .and(path("/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = GenieClient::new(create_test_config(&server.uri())).unwrap();
        let err = client
            .complete(&[Message::user("hi")], &identity("u1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::ProtocolError(_)));
    }

    #[tokio::test]
    async fn test_empty_choices() {
        let server = MockServer::start().await;
        mount_auth(&server, "tok", 1).await;

        Mock::given(method("POST"))
            .and(path("/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = GenieClient::new(create_test_config(&server.uri())).unwrap();
        let err = client
            .complete(&[Message::user("hi")], &identity("u1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_network_error() {
        let config = Config::new("app-1", "gpt-test")
            .with_api_key("test-key")
            .with_auth_url("http://127.0.0.1:9/auth")
            .with_timeout(2);
        let client = GenieClient::new(config).unwrap();

        let err = client
            .complete(&[Message::user("hi")], &identity("u1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::NetworkError(_)));
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let err = GenieClient::new(Config::new("app-1", "gpt-test")).unwrap_err();
        assert!(matches!(err, ClientError::ConfigurationError(_)));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = Config::new("app-1", "gpt-test").with_api_key("super-secret-key");
        let client = GenieClient::new(config).unwrap();
        let debug = format!("{client:?}");

        assert!(!debug.contains("super-secret-key"));
        assert!(debug.contains("[REDACTED]"));
    }
}
