//! Token-provider interface: guarantees callers a fresh access token,
//! refreshing proactively within a 90s safety window and coalescing
//! concurrent refreshes for the same data source (spec.md §3, §9).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::SyncError;
use crate::model::OAuthCredential;
use crate::sync::lock::KeyedLockRegistry;

/// Performs the actual provider-specific OAuth refresh call. Implemented
/// by the (out-of-scope) account-management layer; the core only
/// consumes this interface.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, credential: &OAuthCredential) -> Result<OAuthCredential, SyncError>;
}

/// Wraps a [`TokenRefresher`] with a cache and coalesced in-flight
/// refreshes, so N concurrent callers observing an expired token await
/// one refresh call and share its result.
pub struct TokenProvider {
    refresher: Arc<dyn TokenRefresher>,
    cache: AsyncMutex<HashMap<String, OAuthCredential>>,
    refresh_locks: KeyedLockRegistry,
}

impl TokenProvider {
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            refresher,
            cache: AsyncMutex::new(HashMap::new()),
            refresh_locks: KeyedLockRegistry::new(),
        }
    }

    /// Seed the cache with a credential known to be fresh (e.g. the one
    /// the caller just handed the core).
    pub async fn seed(&self, credential: OAuthCredential) {
        self.cache
            .lock()
            .await
            .insert(credential.data_source_id.clone(), credential);
    }

    /// Return a guaranteed-fresh access token, refreshing if the cached
    /// (or supplied) credential is within the 90s safety window.
    pub async fn fresh(&self, fallback: &OAuthCredential) -> Result<OAuthCredential, SyncError> {
        let current = {
            let cache = self.cache.lock().await;
            cache.get(&fallback.data_source_id).cloned().unwrap_or_else(|| fallback.clone())
        };

        if !current.needs_refresh(Utc::now()) {
            return Ok(current);
        }

        let guard = self.refresh_locks.acquire(&fallback.data_source_id).await;

        // Re-check after acquiring the lock: another task may have
        // already refreshed while we waited.
        let current = {
            let cache = self.cache.lock().await;
            cache.get(&fallback.data_source_id).cloned().unwrap_or(current)
        };
        if !current.needs_refresh(Utc::now()) {
            return Ok(current);
        }

        let refreshed = self.refresher.refresh(&current).await.map_err(|e| {
            if matches!(e, SyncError::AuthExpired { .. }) {
                e
            } else {
                tracing::warn!(error = %e, data_source_id = %fallback.data_source_id, "oauth refresh failed");
                SyncError::AuthExpired {
                    data_source_id: fallback.data_source_id.clone(),
                }
            }
        })?;

        self.cache
            .lock()
            .await
            .insert(refreshed.data_source_id.clone(), refreshed.clone());
        drop(guard);
        Ok(refreshed)
    }
}
