//! Per-identity cache of upstream bearer tokens.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use secrecy::SecretString;

/// A cached token and the instant it stops being trusted.
#[derive(Debug, Clone)]
pub struct TokenRecord {
    /// The bearer token.
    pub token: Arc<SecretString>,
    /// Expiry, computed locally when the token was fetched.
    pub expires_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Creates a record that expires `ttl` from now.
    ///
    /// A `ttl` reaching past the representable range never expires.
    #[must_use]
    pub fn new(token: Arc<SecretString>, ttl: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            token,
            expires_at: now
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Whether the record can still be served at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Concurrent map from identity key to [`TokenRecord`].
///
/// Expired records are never returned but stay in the map until the next
/// successful fetch for the same key overwrites them.
#[derive(Debug, Default)]
pub struct TokenStore {
    records: DashMap<String, TokenRecord>,
}

impl TokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the token for `key` if one exists and has not expired.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<Arc<SecretString>> {
        let now = Utc::now();
        self.records
            .get(key)
            .filter(|record| record.is_valid_at(now))
            .map(|record| Arc::clone(&record.token))
    }

    /// Stores `record` under `key`, replacing any previous record.
    pub fn insert(&self, key: impl Into<String>, record: TokenRecord) {
        self.records.insert(key.into(), record);
    }

    /// Number of records held, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn token(value: &str) -> Arc<SecretString> {
        Arc::new(SecretString::from(value.to_string()))
    }

    #[test]
    fn test_lookup_returns_live_token() {
        let store = TokenStore::new();
        store.insert("a:1", TokenRecord::new(token("t1"), chrono::Duration::hours(4)));

        let found = store.lookup("a:1");
        assert_eq!(found.as_deref().map(|t| t.expose_secret()), Some("t1"));
        assert!(store.lookup("b:2").is_none());
    }

    #[test]
    fn test_expired_record_is_hidden() {
        let store = TokenStore::new();
        store.insert(
            "a:1",
            TokenRecord {
                token: token("old"),
                expires_at: Utc::now() - chrono::Duration::seconds(1),
            },
        );

        assert!(store.lookup("a:1").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_insert_replaces_previous_record() {
        let store = TokenStore::new();
        store.insert("a:1", TokenRecord::new(token("first"), chrono::Duration::hours(1)));
        store.insert("a:1", TokenRecord::new(token("second"), chrono::Duration::hours(1)));

        let found = store.lookup("a:1");
        assert_eq!(
            found.as_deref().map(|t| t.expose_secret()),
            Some("second")
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let record = TokenRecord::new(token("t"), chrono::Duration::MAX);

        assert_eq!(record.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(record.is_valid_at(Utc::now()));
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let record = TokenRecord {
            token: token("t"),
            expires_at: now,
        };
        assert!(!record.is_valid_at(now));
        assert!(record.is_valid_at(now - chrono::Duration::milliseconds(1)));
    }
}
