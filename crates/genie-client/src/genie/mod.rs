//! Genie wire types and client implementation.
//!
//! Genie fronts an OpenAI-style chat completions API behind a per-user
//! token exchange. These are the request and response bodies of both calls.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use genie_common::Message;

pub mod client;
pub use client::GenieClient;

/// Body of the token exchange request.
#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest<'a> {
    /// Application id registered with the auth service.
    pub app_id: &'a str,
    /// Email derived from the caller's handle.
    pub email: &'a str,
    /// The caller's handle.
    pub cunet_id: &'a str,
}

/// Body returned by the token exchange.
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    /// Bearer token for the completion endpoint.
    pub token: String,
    /// Token scheme; only `Bearer` has been observed.
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Chat completion request sent upstream.
///
/// Streaming is never requested.
///
/// ```
/// use genie_client::genie::ChatCompletionRequest;
/// use genie_common::Message;
///
/// let messages = vec![Message::user("hi")];
/// let request = ChatCompletionRequest::builder()
///     .model("gpt-4o")
///     .messages(&messages)
///     .build();
///
/// let json = serde_json::to_value(&request).unwrap();
/// assert_eq!(json["stream"], false);
/// assert!(json.get("temperature").is_none());
/// ```
#[derive(Debug, Clone, Serialize, TypedBuilder)]
pub struct ChatCompletionRequest<'a> {
    /// Model identifier.
    pub model: &'a str,
    /// Conversation, already normalized.
    pub messages: &'a [Message],
    /// Sampling temperature 0.0 to 2.0 (optional).
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Always false.
    #[builder(default = false, setter(skip))]
    pub stream: bool,
}

/// Chat completion response body.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    /// Generated choices; only the first is used.
    pub choices: Vec<ChatChoice>,
}

/// A single completion choice.
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    /// The generated message.
    pub message: ChoiceMessage,
}

/// Message inside a choice.
#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    /// Author role, normally `assistant`.
    #[serde(default)]
    pub role: Option<String>,
    /// Text of the reply. A `null` content decodes as `None`.
    #[serde(default)]
    pub content: Option<String>,
}


#[cfg(test)]
mod fuzz_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn fuzz_completion_response_parsing(data in prop::collection::vec(any::<u8>(), 0..1000)) {
            let _ = serde_json::from_slice::<ChatCompletionResponse>(&data);
        }

        #[test]
        fn fuzz_auth_response_parsing(data in prop::collection::vec(any::<u8>(), 0..1000)) {
            let _ = serde_json::from_slice::<AuthResponse>(&data);
        }
    }
}
