//! In-process challenge and time-lock stores for single-node deployments.
//! [`crate::storage::postgres`] has the shared equivalents.

use super::expiry::ExpiringMap;
use crate::{
    error::{Error, Result},
    interfaces::{AuthenticationNonceStore, BoxFuture, Challenge, TimeLockStore},
};
use time::OffsetDateTime;
use tokio::sync::Mutex;

#[derive(Debug)]
struct Pending {
    challenge: Challenge,
    used: bool,
}

#[derive(Debug, Default)]
pub struct MemoryChallengeStore {
    entries: Mutex<ExpiringMap<Pending>>,
}

impl MemoryChallengeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuthenticationNonceStore for MemoryChallengeStore {
    fn insert<'a>(
        &'a self,
        nonce: &'a str,
        challenge: Challenge,
        now: OffsetDateTime,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            entries.sweep(now);
            if entries.contains(nonce) {
                return Err(Error::Replay {
                    store: "authentication nonce".to_string(),
                    value: nonce.to_string(),
                });
            }

            let expiry = challenge.expiry;
            entries.insert(
                nonce,
                expiry,
                Pending {
                    challenge,
                    used: false,
                },
            );
            Ok(())
        })
    }

    fn consume<'a>(
        &'a self,
        nonce: &'a str,
        now: OffsetDateTime,
    ) -> BoxFuture<'a, Result<Challenge>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let result = match entries.get_mut(nonce) {
                None => Err(Error::NonceNotFound),
                Some(pending) if pending.used => Err(Error::NonceUsed),
                Some(pending) => {
                    pending.used = true;
                    Ok(pending.challenge.clone())
                }
            };
            entries.sweep(now);
            result
        })
    }
}

#[derive(Debug)]
pub struct MemoryTimeLockStore {
    label: String,
    entries: Mutex<ExpiringMap<()>>,
}

impl MemoryTimeLockStore {
    /// `label` names the store in replay errors.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            entries: Mutex::new(ExpiringMap::default()),
        }
    }
}

impl TimeLockStore for MemoryTimeLockStore {
    fn reserve<'a>(
        &'a self,
        value: &'a str,
        now: OffsetDateTime,
        until: OffsetDateTime,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            entries.sweep(now);
            if entries.contains(value) {
                return Err(Error::Replay {
                    store: self.label.clone(),
                    value: value.to_string(),
                });
            }
            entries.insert(value, until, ());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use time::{Duration, macros::datetime};

    fn challenge(expiry: OffsetDateTime) -> Challenge {
        Challenge {
            identity: "Eid".into(),
            expiry,
        }
    }

    #[tokio::test]
    async fn challenge_is_single_use() -> anyhow::Result<()> {
        let store = MemoryChallengeStore::new();
        let now = datetime!(2026-01-01 00:00 UTC);
        store
            .insert("0Anonce", challenge(now + Duration::minutes(1)), now)
            .await?;

        let found = store.consume("0Anonce", now).await?;
        assert_eq!(found.identity, "Eid");
        assert_eq!(store.consume("0Anonce", now).await, Err(Error::NonceUsed));
        assert_eq!(store.consume("0Aother", now).await, Err(Error::NonceNotFound));
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_challenge_insert_is_rejected() -> anyhow::Result<()> {
        let store = MemoryChallengeStore::new();
        let now = datetime!(2026-01-01 00:00 UTC);
        store.insert("0Anonce", challenge(now), now).await?;
        assert!(matches!(
            store.insert("0Anonce", challenge(now), now).await,
            Err(Error::Replay { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_consumers_see_one_success() -> anyhow::Result<()> {
        let store = Arc::new(MemoryChallengeStore::new());
        let now = datetime!(2026-01-01 00:00 UTC);
        store
            .insert("0Anonce", challenge(now + Duration::minutes(1)), now)
            .await?;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.consume("0Anonce", now).await.is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await? {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        Ok(())
    }

    #[tokio::test]
    async fn expired_challenges_are_swept() -> anyhow::Result<()> {
        let store = MemoryChallengeStore::new();
        let now = datetime!(2026-01-01 00:00 UTC);
        store.insert("0Aold", challenge(now), now).await?;

        // First consume after expiry still returns it so the caller can
        // report the expiry; afterwards it is gone.
        let later = now + Duration::minutes(5);
        assert!(store.consume("0Aold", later).await.is_ok());
        assert_eq!(store.consume("0Aold", later).await, Err(Error::NonceNotFound));
        Ok(())
    }

    #[tokio::test]
    async fn unanswered_challenges_do_not_accumulate() -> anyhow::Result<()> {
        let store = MemoryChallengeStore::new();
        let start = datetime!(2026-01-01 00:00 UTC);
        for hour in 0..1000 {
            let now = start + Duration::hours(hour);
            store
                .insert(&format!("0A{hour}"), challenge(now + Duration::minutes(1)), now)
                .await?;
        }

        assert_eq!(store.entries.lock().await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn reservation_blocks_until_it_lapses() -> anyhow::Result<()> {
        let store = MemoryTimeLockStore::new("access nonce");
        let now = datetime!(2026-01-01 00:00 UTC);
        let until = now + Duration::seconds(30);

        store.reserve("0Anonce", now, until).await?;
        assert_eq!(
            store.reserve("0Anonce", now + Duration::seconds(10), until).await,
            Err(Error::Replay {
                store: "access nonce".into(),
                value: "0Anonce".into(),
            })
        );

        store
            .reserve("0Anonce", until + Duration::seconds(1), until + Duration::seconds(31))
            .await?;
        Ok(())
    }
}
