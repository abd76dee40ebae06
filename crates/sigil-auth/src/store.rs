//! Account store trait and implementations.
//!
//! This module defines the [`AccountStore`] trait the verifier uses to
//! resolve a login into an [`AccountRecord`], along with a
//! [`StaticAccountStore`] for tests and small deployments and a
//! [`CachedAccountStore`] that puts a concurrent cache in front of any other
//! store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::account::AccountRecord;
use crate::error::StoreError;

/// Lookup of account records by login.
///
/// Implementations may back this with a database, configuration file,
/// or any other credential store. `Ok(None)` means the login is unknown;
/// `Err` means the store itself failed.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetch the account for `login`.
    async fn get(&self, login: &str) -> Result<Option<Arc<AccountRecord>>, StoreError>;
}

#[async_trait]
impl<S: AccountStore + ?Sized> AccountStore for Arc<S> {
    async fn get(&self, login: &str) -> Result<Option<Arc<AccountRecord>>, StoreError> {
        (**self).get(login).await
    }
}

/// A simple in-memory account store backed by a `HashMap`.
///
/// # Examples
///
/// ```
/// use sigil_auth::{AccountRecord, StaticAccountStore};
///
/// let store = StaticAccountStore::new(vec![
///     AccountRecord::builder().login("alice").secret("s3cr3t").build(),
/// ]);
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticAccountStore {
    accounts: HashMap<String, Arc<AccountRecord>>,
}

impl StaticAccountStore {
    /// Create a store from a list of accounts, keyed by login.
    pub fn new(accounts: impl IntoIterator<Item = AccountRecord>) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|a| (a.login.clone(), Arc::new(a)))
                .collect(),
        }
    }

    /// Number of accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountStore for StaticAccountStore {
    async fn get(&self, login: &str) -> Result<Option<Arc<AccountRecord>>, StoreError> {
        Ok(self.accounts.get(login).cloned())
    }
}

/// Read-through cache in front of another [`AccountStore`].
///
/// Hits are served from a `DashMap`. Misses go to the inner store; two
/// concurrent misses for the same login may both reach it, which is
/// harmless. Unknown logins and store errors are not cached. Callers that
/// change an account's secret must call [`invalidate`](Self::invalidate).
#[derive(Debug)]
pub struct CachedAccountStore<S> {
    inner: S,
    cache: DashMap<String, Arc<AccountRecord>>,
}

impl<S: AccountStore> CachedAccountStore<S> {
    /// Wrap `inner` with an empty cache.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
        }
    }

    /// Drop the cached record for `login`.
    pub fn invalidate(&self, login: &str) {
        if self.cache.remove(login).is_some() {
            debug!(login, "invalidated cached account");
        }
    }

    /// Drop every cached record.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Number of cached records.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl<S: AccountStore> AccountStore for CachedAccountStore<S> {
    async fn get(&self, login: &str) -> Result<Option<Arc<AccountRecord>>, StoreError> {
        if let Some(hit) = self.cache.get(login) {
            return Ok(Some(Arc::clone(hit.value())));
        }

        let found = self.inner.get(login).await?;
        if let Some(ref account) = found {
            self.cache.insert(login.to_owned(), Arc::clone(account));
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Counts lookups and can be switched to fail.
    #[derive(Debug, Default)]
    struct CountingStore {
        calls: AtomicUsize,
        inner: StaticAccountStore,
        fail: bool,
    }

    #[async_trait]
    impl AccountStore for CountingStore {
        async fn get(&self, login: &str) -> Result<Option<Arc<AccountRecord>>, StoreError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(StoreError("connection refused".into()));
            }
            self.inner.get(login).await
        }
    }

    fn alice() -> AccountRecord {
        AccountRecord::builder().login("alice").secret("s3cr3t").build()
    }

    #[tokio::test]
    async fn test_should_return_account_for_known_login() {
        let store = StaticAccountStore::new(vec![alice()]);
        let found = store.get("alice").await.unwrap();
        assert_eq!(found.unwrap().secret, "s3cr3t");
    }

    #[tokio::test]
    async fn test_should_return_none_for_unknown_login() {
        let store = StaticAccountStore::new(vec![]);
        assert!(store.get("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_should_serve_repeat_lookups_from_cache() {
        let cached = CachedAccountStore::new(CountingStore {
            inner: StaticAccountStore::new(vec![alice()]),
            ..CountingStore::default()
        });

        assert!(cached.get("alice").await.unwrap().is_some());
        assert!(cached.get("alice").await.unwrap().is_some());
        assert_eq!(cached.inner.calls.load(Ordering::Relaxed), 1);
        assert_eq!(cached.cached_len(), 1);
    }

    #[tokio::test]
    async fn test_should_refetch_after_invalidate() {
        let cached = CachedAccountStore::new(CountingStore {
            inner: StaticAccountStore::new(vec![alice()]),
            ..CountingStore::default()
        });

        cached.get("alice").await.unwrap();
        cached.invalidate("alice");
        cached.get("alice").await.unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_should_not_cache_misses_or_errors() {
        let cached = CachedAccountStore::new(CountingStore {
            fail: true,
            ..CountingStore::default()
        });

        assert!(cached.get("alice").await.is_err());
        assert!(cached.get("alice").await.is_err());
        assert_eq!(cached.inner.calls.load(Ordering::Relaxed), 2);
        assert_eq!(cached.cached_len(), 0);
    }
}
