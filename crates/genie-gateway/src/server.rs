//! HTTP front end.
//!
//! `POST /chat` accepts either a JSON body or a multipart form, normalizes it
//! into canonical messages, resolves the caller's identity and forwards the
//! conversation through a [`CompletionClient`]. The reply text is returned as
//! a JSON string.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::{Span, debug, info, instrument, warn};

use genie_client::CompletionClient;
use genie_common::{AttachmentSlot, ChatInput, Identity, normalize_json, normalize_multipart};

use crate::error::{GatewayError, Result};

/// Shared state handed to every request.
#[derive(Clone)]
pub struct AppState {
    client: Arc<dyn CompletionClient>,
    email_domain: Arc<str>,
}

impl AppState {
    /// Creates state around a completion client.
    pub fn new(client: Arc<dyn CompletionClient>, email_domain: impl Into<Arc<str>>) -> Self {
        Self {
            client,
            email_domain: email_domain.into(),
        }
    }
}

/// Builds the gateway router.
///
/// Request bodies larger than `max_body_bytes` are rejected with `413`.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Wire shape of an inbound chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestShape {
    Json,
    Multipart,
}

impl RequestShape {
    fn detect(content_type: &str) -> Option<Self> {
        let content_type = content_type.to_ascii_lowercase();
        if content_type.contains("application/json") {
            Some(Self::Json)
        } else if content_type.contains("multipart/form-data") {
            Some(Self::Multipart)
        } else {
            None
        }
    }
}

#[instrument(
    skip_all,
    fields(request_id = %uuid::Uuid::new_v4(), content_type = tracing::field::Empty, cunet_id = tracing::field::Empty)
)]
async fn chat(State(state): State<AppState>, request: Request) -> Result<Json<String>> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    Span::current().record("content_type", content_type.as_str());

    let input = match RequestShape::detect(&content_type) {
        Some(RequestShape::Json) => read_json(request).await?,
        Some(RequestShape::Multipart) => read_multipart(request).await?,
        None => {
            return Err(GatewayError::Validation(format!(
                "unsupported content type '{content_type}'"
            )));
        }
    };

    let identity = input
        .cunet_id
        .as_deref()
        .and_then(|id| Identity::new(id, &state.email_domain))
        .ok_or_else(|| GatewayError::Validation("cunet_id is required".to_string()))?;
    Span::current().record("cunet_id", identity.cunet_id());

    info!(messages = input.messages.len(), "Forwarding chat request");
    let answer = state.client.complete(&input.messages, &identity).await?;
    debug!(chars = answer.len(), "Completion received");

    Ok(Json(answer))
}

async fn read_json(request: Request) -> Result<ChatInput> {
    let body = Bytes::from_request(request, &()).await.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            GatewayError::PayloadTooLarge
        } else {
            GatewayError::Validation(rejection.body_text())
        }
    })?;

    Ok(normalize_json(&body)?)
}

async fn read_multipart(request: Request) -> Result<ChatInput> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|rejection| GatewayError::Validation(rejection.body_text()))?;

    let mut raw_messages: Option<String> = None;
    let mut cunet_id: Option<String> = None;
    let mut attachments: Vec<(AttachmentSlot, Bytes)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_owned) else {
            debug!("Ignoring unnamed multipart field");
            continue;
        };

        match name.as_str() {
            "messages" if raw_messages.is_none() => {
                raw_messages = Some(field.text().await.map_err(multipart_error)?);
            }
            "cunet_id" if cunet_id.is_none() => {
                cunet_id = Some(field.text().await.map_err(multipart_error)?);
            }
            other => match AttachmentSlot::from_field_name(other) {
                Some(slot) => match field.bytes().await {
                    Ok(data) => attachments.push((slot, data)),
                    Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                        return Err(GatewayError::PayloadTooLarge);
                    }
                    Err(e) => {
                        warn!(slot = %slot, error = %e, "Skipping unreadable attachment");
                        // The form stream cannot be resumed after a failed read.
                        break;
                    }
                },
                None => debug!(field = other, "Ignoring multipart field"),
            },
        }
    }

    let messages = normalize_multipart(
        raw_messages.as_deref(),
        attachments.iter().map(|(slot, data)| (*slot, &data[..])),
    )?;

    Ok(ChatInput { messages, cunet_id })
}

fn multipart_error(err: MultipartError) -> GatewayError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::PayloadTooLarge
    } else {
        GatewayError::Validation(format!("malformed multipart body: {}", err.body_text()))
    }
}
