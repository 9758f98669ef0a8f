//! # genie-common
//!
//! Shared types for the Genie gateway:
//! - the canonical chat message model sent upstream
//! - caller identities and the keys derived from them
//! - upstream client configuration
//! - request normalization, including attachment sniffing and encoding
//!
//! ## Example
//!
//! ```
//! use genie_common::{Identity, MessageRole, normalize_json};
//!
//! let input = normalize_json(br#"{"messages":[{"role":"user","content":"hi"}],"cunet_id":"653"}"#)
//!     .unwrap();
//!
//! let identity = Identity::new(input.cunet_id.as_deref().unwrap_or_default(), "student.chula.ac.th")
//!     .unwrap();
//!
//! assert_eq!(input.messages[0].role, MessageRole::User);
//! assert_eq!(identity.cunet_id(), "653");
//! ```

/// Canonical chat messages and content parts.
pub mod chat;
/// Upstream client configuration.
pub mod config;
pub mod identity;
/// Inbound request normalization.
pub mod normalize;
pub mod sniff;

pub use chat::{ContentPart, ImageUrl, Message, MessageRole};
pub use config::Config;
pub use identity::{DEFAULT_EMAIL_DOMAIN, Identity};
pub use normalize::{
    AttachmentSlot, ChatInput, NormalizeError, normalize_json, normalize_multipart,
};
