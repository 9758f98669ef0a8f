//! # genie-client
//!
//! Client library for the Genie chat completions service.
//!
//! Completions are issued on behalf of an end user. Each user needs a bearer
//! token from the auth endpoint before any completion can be requested, so
//! this crate provides:
//! - a [`TokenStore`] caching tokens per identity until they expire
//! - a [`TokenCoalescer`] making sure concurrent requests for the same user
//!   trigger at most one auth call
//! - [`GenieClient`], the completion proxy built on both
//!
//! The [`CompletionClient`] trait is the seam the HTTP gateway depends on.
//!
//! ## Example
//!
//! ```no_run
//! use genie_client::{CompletionClient, GenieClient};
//! use genie_common::{Config, Identity, Message};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::new("my-app", "gpt-4o")
//!     .with_api_key("your-api-key");
//! let client = GenieClient::new(config)?;
//!
//! let identity = Identity::new("6530000021", "student.chula.ac.th")
//!     .ok_or_else(|| anyhow::anyhow!("missing handle"))?;
//! let reply = client
//!     .complete(&[Message::user("Hello, world!")], &identity)
//!     .await?;
//! println!("Response: {reply}");
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use genie_common::{Identity, Message};

pub mod coalescer;
pub mod error;
pub mod genie;
pub mod token_store;

pub use coalescer::TokenCoalescer;
pub use error::ClientError;
pub use genie::GenieClient;
pub use token_store::{TokenRecord, TokenStore};

/// Something that turns a conversation into a single reply on behalf of a user.
///
/// Implementations must be thread-safe; the gateway shares one instance
/// across all requests.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Request a completion for `messages` as `identity`.
    ///
    /// # Returns
    ///
    /// The text content of the first choice.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the auth endpoint rejects the identity or cannot be reached
    /// - the completion endpoint returns a non-success status
    /// - either response cannot be decoded
    /// - the completion carries no choices
    async fn complete(&self, messages: &[Message], identity: &Identity) -> Result<String, ClientError>;
}
