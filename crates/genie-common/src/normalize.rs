//! Turning inbound request bodies into canonical messages.
//!
//! Two input shapes are accepted:
//!
//! - **JSON**: `{"messages": [...], "cunet_id": "..."}`. Messages are taken as
//!   sent; string content is normalized by [`Message`]'s deserializer.
//! - **Multipart**: an optional `messages` field holding a JSON array, a
//!   `cunet_id` field, and binary `image` / `file` fields. Each attachment is
//!   sniffed, base64 encoded and attached as a data URL image part.
//!
//! # Attachment placement
//!
//! An attachment joins the last message when that message is from the user.
//! Otherwise it starts a new user message. Slots are processed in the fixed
//! order of [`AttachmentSlot::ALL`], so an image and a file uploaded together
//! end up in the same trailing user message, image first.
//!
//! ```
//! use genie_common::chat::{Message, MessageRole};
//! use genie_common::normalize::{AttachmentSlot, normalize_multipart};
//!
//! let messages = normalize_multipart(
//!     Some(r#"[{"role":"assistant","content":"Send me the picture."}]"#),
//!     [(AttachmentSlot::Image, b"GIF89a".as_slice())],
//! )
//! .unwrap();
//!
//! assert_eq!(messages.len(), 2);
//! assert_eq!(messages[1].role, MessageRole::User);
//! assert!(messages[1].content[0]
//!     .as_image_url()
//!     .unwrap()
//!     .starts_with("data:image/gif;base64,"));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::chat::{ContentPart, Message, MessageRole};
use crate::sniff::sniff_content_type;

/// Errors raised while normalizing a request body.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NormalizeError {
    /// The JSON request body could not be decoded.
    #[error("Invalid request body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    /// The multipart `messages` field is not a valid message array.
    #[error("Invalid messages json: {0}")]
    InvalidMessages(#[source] serde_json::Error),
}

/// Multipart fields that carry attachments.
///
/// The derived ordering is the processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttachmentSlot {
    /// The `image` field.
    Image,
    /// The generic `file` field.
    File,
}

impl AttachmentSlot {
    /// All slots, in processing order.
    pub const ALL: [Self; 2] = [Self::Image, Self::File];

    /// Form field name of the slot.
    #[must_use]
    pub const fn field_name(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::File => "file",
        }
    }

    /// Maps a form field name to its slot.
    #[must_use]
    pub fn from_field_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.field_name() == name)
    }
}

impl fmt::Display for AttachmentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// A decoded request, independent of its wire shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatInput {
    /// Canonical message list. Absent or `null` decodes to no messages.
    #[serde(default, deserialize_with = "deserialize_messages")]
    pub messages: Vec<Message>,
    /// Caller handle, if one was supplied.
    #[serde(default)]
    pub cunet_id: Option<String>,
}

fn deserialize_messages<'de, D>(deserializer: D) -> Result<Vec<Message>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Message>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decodes a JSON request body.
///
/// # Errors
///
/// Returns [`NormalizeError::InvalidBody`] if the body is not a JSON object of
/// the expected shape.
pub fn normalize_json(body: &[u8]) -> Result<ChatInput, NormalizeError> {
    serde_json::from_slice(body).map_err(NormalizeError::InvalidBody)
}

/// Parses the optional multipart `messages` field.
///
/// A missing or empty field, or a JSON `null`, yields no messages.
///
/// # Errors
///
/// Returns [`NormalizeError::InvalidMessages`] if the field is present but is
/// not a JSON array of messages.
pub fn parse_messages(raw: Option<&str>) -> Result<Vec<Message>, NormalizeError> {
    match raw {
        Some(raw) if !raw.is_empty() => serde_json::from_str::<Option<Vec<Message>>>(raw)
            .map(Option::unwrap_or_default)
            .map_err(NormalizeError::InvalidMessages),
        _ => Ok(Vec::new()),
    }
}

/// Encodes bytes as a `data:` URL using their sniffed content type.
///
/// ```
/// use genie_common::normalize::to_data_url;
///
/// assert_eq!(to_data_url(b"%PDF-"), "data:application/pdf;base64,JVBERi0=");
/// ```
#[must_use]
pub fn to_data_url(data: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        sniff_content_type(data),
        STANDARD.encode(data)
    )
}

/// Adds an attachment part following the placement policy.
pub fn append_attachment(messages: &mut Vec<Message>, part: ContentPart) {
    match messages.last_mut() {
        Some(last) if last.is_user() => last.push_part(part),
        _ => messages.push(Message::from_parts(MessageRole::User, [part])),
    }
}

/// Builds the canonical message list for a multipart request.
///
/// Only the first attachment per slot is used. Attachments are applied in
/// slot order, whatever order they arrive in.
///
/// # Errors
///
/// Returns [`NormalizeError::InvalidMessages`] if `raw_messages` is present
/// and malformed.
pub fn normalize_multipart<'a, I>(
    raw_messages: Option<&str>,
    attachments: I,
) -> Result<Vec<Message>, NormalizeError>
where
    I: IntoIterator<Item = (AttachmentSlot, &'a [u8])>,
{
    let mut messages = parse_messages(raw_messages)?;

    let mut by_slot = BTreeMap::new();
    for (slot, data) in attachments {
        if by_slot.contains_key(&slot) {
            debug!("Ignoring repeated '{slot}' attachment");
            continue;
        }
        by_slot.insert(slot, data);
    }

    for (slot, data) in by_slot {
        let url = to_data_url(data);
        debug!(
            "Attaching '{slot}' upload ({} bytes, {})",
            data.len(),
            sniff_content_type(data)
        );
        append_attachment(&mut messages, ContentPart::image_url(url));
    }

    Ok(messages)
}
