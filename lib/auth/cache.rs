//! A single-slot, single-flight token cache shared by every provider
//! authenticator that backs onto a token-exchange protocol.

use std::future::Future;
use std::time::SystemTime;

use tokio::sync::Mutex;

use crate::error::FreightlinerResult;
use crate::types::CachedToken;

/// Caches one [`CachedToken`] behind a mutex, resolving a fresh one via a
/// caller-supplied async closure when the cached value is missing, expired,
/// or was explicitly invalidated.
///
/// The mutex (rather than a `RwLock`) is deliberate: concurrent callers that
/// race past an expired token must not all dial the token endpoint at once,
/// so resolution is single-flight -- the second caller blocks on the first
/// caller's mutex guard and then observes the token it just installed.
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    /// Builds an empty cache.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Returns a usable token, resolving a fresh one via `resolve` if the
    /// cached value is absent or within 5 minutes of expiry.
    pub async fn get_or_resolve<F, Fut>(&self, resolve: F) -> FreightlinerResult<CachedToken>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FreightlinerResult<CachedToken>>,
    {
        let mut guard = self.slot.lock().await;
        let now = SystemTime::now();
        if let Some(token) = guard.as_ref() {
            if token.is_usable(now) {
                return Ok(token.clone());
            }
        }
        let fresh = resolve().await?;
        *guard = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drops the cached token, forcing the next [`TokenCache::get_or_resolve`]
    /// call to resolve from scratch.
    pub async fn invalidate(&self) {
        let mut guard = self.slot.lock().await;
        *guard = None;
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn resolves_once_then_reuses_cached_value() {
        let cache = TokenCache::new();
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let token = cache
                .get_or_resolve(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(CachedToken::non_expiring("t"))
                })
                .await
                .unwrap();
            assert_eq!(token.token, "t");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_re_resolution() {
        let cache = TokenCache::new();
        cache
            .get_or_resolve(|| async { Ok(CachedToken::non_expiring("first")) })
            .await
            .unwrap();
        cache.invalidate().await;
        let token = cache
            .get_or_resolve(|| async { Ok(CachedToken::non_expiring("second")) })
            .await
            .unwrap();
        assert_eq!(token.token, "second");
    }

    #[tokio::test]
    async fn expired_token_is_re_resolved() {
        let cache = TokenCache::new();
        {
            let mut guard = cache.slot.lock().await;
            *guard = Some(CachedToken {
                token: "stale".into(),
                expires_at: SystemTime::now() + Duration::from_secs(1),
                refresh_token: None,
            });
        }
        let token = cache
            .get_or_resolve(|| async { Ok(CachedToken::non_expiring("fresh")) })
            .await
            .unwrap();
        assert_eq!(token.token, "fresh");
    }
}
