//! Issuer verification keys for access verifiers.

use crate::{
    error::{Error, Result},
    interfaces::{BoxFuture, VerificationKeyStore},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use url::Url;
use utoipa::ToSchema;

/// Published issuer keys: issuer identity to encoded public key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct KeySet {
    pub keys: BTreeMap<String, String>,
}

fn unknown(identity: &str) -> Error {
    Error::UnknownVerificationKey {
        identity: identity.to_string(),
    }
}

#[derive(Debug, Default)]
pub struct MemoryVerificationKeyStore {
    keys: RwLock<BTreeMap<String, String>>,
}

impl MemoryVerificationKeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_key(identity: impl Into<String>, public_key: impl Into<String>) -> Self {
        let mut keys = BTreeMap::new();
        keys.insert(identity.into(), public_key.into());
        Self {
            keys: RwLock::new(keys),
        }
    }

    pub async fn insert(&self, identity: impl Into<String>, public_key: impl Into<String>) {
        self.keys
            .write()
            .await
            .insert(identity.into(), public_key.into());
    }

    pub async fn remove(&self, identity: &str) {
        self.keys.write().await.remove(identity);
    }
}

impl VerificationKeyStore for MemoryVerificationKeyStore {
    fn get<'a>(&'a self, identity: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.keys
                .read()
                .await
                .get(identity)
                .cloned()
                .ok_or_else(|| unknown(identity))
        })
    }
}

/// Fetches a [`KeySet`] over HTTP and caches it for `refresh_interval`.
/// A lookup against an older cache refetches, so keys dropped from the feed
/// stop verifying within one interval. Unknown issuers refetch at most once
/// per interval.
#[derive(Debug)]
pub struct HttpVerificationKeyStore {
    client: reqwest::Client,
    url: Url,
    refresh_interval: Duration,
    cache: RwLock<CachedKeys>,
    fetching: Mutex<()>,
}

#[derive(Debug, Default)]
struct CachedKeys {
    keys: BTreeMap<String, String>,
    fetched_at: Option<Instant>,
}

impl CachedKeys {
    fn is_fresh(&self, refresh_interval: Duration) -> bool {
        self.fetched_at
            .is_some_and(|at| at.elapsed() < refresh_interval)
    }
}

impl HttpVerificationKeyStore {
    pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|err| Error::collaborator("verification key feed", err, false))?;

        Ok(Self {
            client,
            url,
            refresh_interval: Self::DEFAULT_REFRESH_INTERVAL,
            cache: RwLock::new(CachedKeys::default()),
            fetching: Mutex::new(()),
        })
    }

    #[must_use]
    pub const fn with_refresh_interval(mut self, refresh_interval: Duration) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    async fn fetch(&self) -> Result<()> {
        let _fetching = self.fetching.lock().await;
        if self.cache.read().await.is_fresh(self.refresh_interval) {
            debug!("Skipping key feed fetch, last fetch is recent");
            return Ok(());
        }

        let feed_error = |err: reqwest::Error| {
            let transient = err.is_timeout() || err.is_connect() || err.is_request();
            Error::collaborator("verification key feed", err, transient)
        };

        let key_set: KeySet = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(feed_error)?
            .error_for_status()
            .map_err(feed_error)?
            .json()
            .await
            .map_err(feed_error)?;

        debug!("Fetched {} issuer keys from {}", key_set.keys.len(), self.url);
        *self.cache.write().await = CachedKeys {
            keys: key_set.keys,
            fetched_at: Some(Instant::now()),
        };
        Ok(())
    }
}

impl VerificationKeyStore for HttpVerificationKeyStore {
    fn get<'a>(&'a self, identity: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            {
                let cache = self.cache.read().await;
                if cache.is_fresh(self.refresh_interval)
                    && let Some(key) = cache.keys.get(identity)
                {
                    return Ok(key.clone());
                }
            }

            if let Err(err) = self.fetch().await {
                warn!("Failed to refresh verification keys: {err}");
                return Err(err);
            }

            self.cache
                .read()
                .await
                .keys
                .get(identity)
                .cloned()
                .ok_or_else(|| unknown(identity))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_lookup() -> anyhow::Result<()> {
        let store = MemoryVerificationKeyStore::with_key("Dissuer", "Dissuer");
        assert_eq!(store.get("Dissuer").await?, "Dissuer");

        store.insert("Dsecond", "Dsecond-key").await;
        assert_eq!(store.get("Dsecond").await?, "Dsecond-key");

        store.remove("Dissuer").await;
        assert_eq!(store.get("Dissuer").await, Err(unknown("Dissuer")));
        Ok(())
    }

    #[test]
    fn key_set_wire_shape() -> anyhow::Result<()> {
        let key_set: KeySet = serde_json::from_str(r#"{"keys":{"Dissuer":"Dpublic"}}"#)?;
        assert_eq!(key_set.keys.get("Dissuer"), Some(&"Dpublic".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn keys_dropped_from_the_feed_expire() -> anyhow::Result<()> {
        use axum::{Json, Router, routing::get};
        use std::sync::Arc;

        let feed = Arc::new(RwLock::new(KeySet {
            keys: BTreeMap::from([("Dissuer".to_string(), "Dpublic".to_string())]),
        }));
        let served = Arc::clone(&feed);
        let app = Router::new().route(
            "/keys",
            get(move || {
                let served = Arc::clone(&served);
                async move { Json(served.read().await.clone()) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let url = Url::parse(&format!("http://{}/keys", listener.local_addr()?))?;
        tokio::spawn(async move { axum::serve(listener, app).await });

        let store = HttpVerificationKeyStore::new(url, Duration::from_secs(2))?
            .with_refresh_interval(Duration::from_millis(100));
        assert_eq!(store.get("Dissuer").await?, "Dpublic");

        feed.write().await.keys.clear();
        // Still cached inside the interval.
        assert_eq!(store.get("Dissuer").await?, "Dpublic");

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(store.get("Dissuer").await, Err(unknown("Dissuer")));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_feed_is_transient() -> anyhow::Result<()> {
        let store = HttpVerificationKeyStore::new(
            Url::parse("http://127.0.0.1:9/keys")?,
            Duration::from_millis(200),
        )?;
        let err = store.get("Dissuer").await;
        assert!(matches!(err, Err(ref e) if e.is_transient()), "{err:?}");
        Ok(())
    }
}
