//! Single-flight token acquisition.
//!
//! At most one auth request is in flight per identity key. Callers that miss
//! the [`TokenStore`] while a fetch is running join that fetch and receive
//! its outcome, success or failure, instead of starting their own.
//!
//! Each fetch runs on its own tokio task, so it completes even if every
//! caller waiting on it goes away. The task removes its in-flight entry once
//! the token store has been updated, so a failed fetch is only ever seen by
//! the callers that were already waiting on it. The next caller starts fresh.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use log::{debug, warn};
use secrecy::SecretString;

use crate::error::ClientError;
use crate::token_store::{TokenRecord, TokenStore};

type TokenResult = Result<Arc<SecretString>, ClientError>;
type InFlight = Shared<BoxFuture<'static, TokenResult>>;

/// Token cache fronted by a per-key in-flight registry.
pub struct TokenCoalescer {
    store: Arc<TokenStore>,
    in_flight: Arc<DashMap<String, InFlight>>,
    ttl: chrono::Duration,
}

impl fmt::Debug for TokenCoalescer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCoalescer")
            .field("cached", &self.store.len())
            .field("in_flight", &self.in_flight.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenCoalescer {
    /// Creates a coalescer whose fetched tokens live for `ttl`.
    #[must_use]
    pub fn new(ttl: chrono::Duration) -> Self {
        Self {
            store: Arc::new(TokenStore::new()),
            in_flight: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// The underlying token store.
    #[must_use]
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Number of keys with a fetch currently registered.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Returns a valid token for `key`, calling `fetch` only when no cached
    /// token exists and no other fetch for `key` is running.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns whatever error the fetch that served this call produced. When
    /// several callers share one fetch they all receive a clone of it.
    pub async fn get_token<F, Fut>(&self, key: &str, fetch: F) -> TokenResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SecretString, ClientError>> + Send + 'static,
    {
        if let Some(token) = self.store.lookup(key) {
            debug!("Token cache hit for {key}");
            return Ok(token);
        }

        let pending = match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                debug!("Joining in-flight token fetch for {key}");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                // A fetch may have completed between the lookup and the entry lock.
                if let Some(token) = self.store.lookup(key) {
                    return Ok(token);
                }

                debug!("Starting token fetch for {key}");
                let pending = self.start_fetch(entry.key().clone(), fetch());
                entry.insert(pending.clone());
                pending
            }
        };

        pending.await
    }

    fn start_fetch<Fut>(&self, key: String, fetch: Fut) -> InFlight
    where
        Fut: Future<Output = Result<SecretString, ClientError>> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let in_flight = Arc::clone(&self.in_flight);
        let ttl = self.ttl;

        let task = {
            let key = key.clone();
            let in_flight = Arc::clone(&in_flight);
            tokio::spawn(async move {
                let result = fetch.await.map(Arc::new);
                if let Ok(token) = &result {
                    store.insert(key.clone(), TokenRecord::new(Arc::clone(token), ttl));
                }
                in_flight.remove(&key);
                result
            })
        };

        async move {
            match task.await {
                Ok(result) => result,
                Err(err) => {
                    // The task panicked or was cancelled before it could clean up.
                    warn!("Token fetch task for {key} did not complete: {err}");
                    in_flight.remove(&key);
                    Err(ClientError::TaskFailed(err.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }
}
