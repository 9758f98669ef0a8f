//! End-user identity.
//!
//! Callers identify themselves with a CUNET handle. The auth endpoint also
//! wants an email address, which is derived from the handle and a configured
//! domain. Together they form the identity key that scopes token caching and
//! fetch coalescing.

use std::fmt;

/// Email domain used when none is configured.
pub const DEFAULT_EMAIL_DOMAIN: &str = "student.chula.ac.th";

/// A caller identity.
///
/// ```
/// use genie_common::Identity;
///
/// let id = Identity::new("6530000021", "student.chula.ac.th").unwrap();
/// assert_eq!(id.email(), "6530000021@student.chula.ac.th");
/// assert_eq!(id.key(), "6530000021@student.chula.ac.th:6530000021");
///
/// assert!(Identity::new("   ", "student.chula.ac.th").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    cunet_id: String,
    email: String,
}

impl Identity {
    /// Builds an identity from a user handle.
    ///
    /// Returns `None` when the handle is empty or only whitespace.
    #[must_use]
    pub fn new(cunet_id: &str, email_domain: &str) -> Option<Self> {
        let cunet_id = cunet_id.trim();
        if cunet_id.is_empty() {
            return None;
        }

        Some(Self {
            cunet_id: cunet_id.to_string(),
            email: format!("{cunet_id}@{email_domain}"),
        })
    }

    /// The caller-supplied handle.
    #[must_use]
    pub fn cunet_id(&self) -> &str {
        &self.cunet_id
    }

    /// The derived email, only ever sent as an auth parameter.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Key used for the token store and the in-flight registry.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.email, self.cunet_id)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cunet_id)
    }
}
