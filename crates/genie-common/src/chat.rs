//! Canonical chat messages.
//!
//! Every inbound request, whatever its shape on the wire, is turned into an
//! ordered list of [`Message`]s before anything is sent upstream. A message is
//! a [`MessageRole`] plus an ordered sequence of [`ContentPart`]s.
//!
//! # Content
//!
//! Content parts are either text or an image reference. Image references carry
//! a URL, which for uploaded attachments is always a self-contained data URL
//! (`data:<type>;base64,<payload>`).
//!
//! The order of parts inside a message is the order in which they were added.
//! Nothing in this crate reorders or deduplicates them.
//!
//! # Polymorphic `content`
//!
//! Clients may send `content` either as a bare string or as an array of typed
//! parts. Both decode into the same representation:
//!
//! ```
//! use genie_common::chat::{ContentPart, Message, MessageRole};
//!
//! let plain: Message = serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
//! let typed: Message = serde_json::from_str(
//!     r#"{"role":"user","content":[{"type":"text","text":"hi"}]}"#,
//! ).unwrap();
//!
//! assert_eq!(plain, typed);
//! assert_eq!(plain.role, MessageRole::User);
//! assert_eq!(plain.content.as_slice(), &[ContentPart::text("hi")]);
//! ```
//!
//! Messages are always serialized with the array form, which is what the
//! completion endpoint expects.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use smallvec::{SmallVec, smallvec};

/// Ordered content of a single message.
///
/// Most messages carry one text part, possibly followed by one attachment, so
/// two parts are kept inline before spilling to the heap.
pub type Content = SmallVec<[ContentPart; 2]>;

/// Role of a message author.
///
/// Serialized as lowercase strings matching the chat completions format. Roles
/// outside the well-known set are kept verbatim in [`MessageRole::Other`] and
/// forwarded unchanged.
///
/// ```
/// use genie_common::chat::MessageRole;
///
/// let json = serde_json::to_string(&MessageRole::Assistant).unwrap();
/// assert_eq!(json, "\"assistant\"");
///
/// let role: MessageRole = serde_json::from_str("\"developer\"").unwrap();
/// assert_eq!(role, MessageRole::Other("developer".to_string()));
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
#[non_exhaustive]
pub enum MessageRole {
    /// Instructions or context for the model.
    System,
    /// Input from the end user. Attachments are always attached to user messages.
    User,
    /// A previous model reply.
    Assistant,
    /// Output of a tool invocation.
    Tool,
    /// Any other role, passed through as sent.
    Other(String),
}

impl MessageRole {
    /// Wire name of the role.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::Other(role) => role,
        }
    }
}

impl From<String> for MessageRole {
    fn from(role: String) -> Self {
        match role.as_str() {
            "system" => Self::System,
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "tool" => Self::Tool,
            _ => Self::Other(role),
        }
    }
}

impl From<&str> for MessageRole {
    fn from(role: &str) -> Self {
        Self::from(role.to_string())
    }
}

impl From<MessageRole> for String {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::Other(role) => role,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target of an image content part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// Either a remote URL supplied by the client or a data URL built from an upload.
    pub url: String,
}

/// One unit of message content.
///
/// Tagged by `type` on the wire:
///
/// ```
/// use genie_common::chat::ContentPart;
///
/// let part = ContentPart::image_url("data:image/png;base64,AAAA");
/// let json = serde_json::to_value(&part).unwrap();
/// assert_eq!(json["type"], "image_url");
/// assert_eq!(json["image_url"]["url"], "data:image/png;base64,AAAA");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text itself.
        text: String,
    },
    /// Image reference, usually a data URL.
    ImageUrl {
        /// Where the image lives.
        image_url: ImageUrl,
    },
}

impl ContentPart {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates an image part pointing at `url`.
    pub fn image_url(url: impl Into<String>) -> Self {
        Self::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }

    /// Returns the text if this is a text part.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::ImageUrl { .. } => None,
        }
    }

    /// Returns the URL if this is an image part.
    #[must_use]
    pub fn as_image_url(&self) -> Option<&str> {
        match self {
            Self::ImageUrl { image_url } => Some(&image_url.url),
            Self::Text { .. } => None,
        }
    }
}

/// A single chat turn in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who authored the turn.
    pub role: MessageRole,

    /// Ordered content parts.
    ///
    /// Accepts a bare string or an array of parts when deserializing. A missing
    /// or `null` content decodes to no parts.
    #[serde(default, deserialize_with = "deserialize_content")]
    pub content: Content,
}

impl Message {
    /// Creates a message with a single text part.
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: smallvec![ContentPart::text(text)],
        }
    }

    /// Creates a message from already built parts.
    pub fn from_parts(role: MessageRole, parts: impl IntoIterator<Item = ContentPart>) -> Self {
        Self {
            role,
            content: parts.into_iter().collect(),
        }
    }

    /// Creates a user message with a single text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, text)
    }

    /// Creates a system message with a single text part.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, text)
    }

    /// Creates an assistant message with a single text part.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, text)
    }

    /// Appends a part after the existing ones.
    pub fn push_part(&mut self, part: ContentPart) {
        self.content.push(part);
    }

    /// Builder form of [`Message::push_part`].
    #[must_use]
    pub fn with_part(mut self, part: ContentPart) -> Self {
        self.push_part(part);
        self
    }

    /// Whether this message was authored by the end user.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role.as_str() == "user"
    }
}

/// Raw shape of `content` before normalization.
///
/// Variant order matters: the string form is tried first.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

fn deserialize_content<'de, D>(deserializer: D) -> Result<Content, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<RawContent>::deserialize(deserializer)? {
        None => Content::new(),
        Some(RawContent::Text(text)) => smallvec![ContentPart::Text { text }],
        Some(RawContent::Parts(parts)) => parts.into_iter().collect(),
    })
}
