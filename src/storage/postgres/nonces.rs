//! Shared challenge and time-lock stores.
//!
//! Each claim is a single statement, so the row lock decides the winner
//! when several instances race on the same nonce or digest.

use super::{db_error, span};
use crate::{
    error::{Error, Result},
    interfaces::{AuthenticationNonceStore, BoxFuture, Challenge, TimeLockStore},
};
use sqlx::{PgPool, Row};
use time::OffsetDateTime;
use tracing::Instrument;

#[derive(Clone, Debug)]
pub struct PostgresChallengeStore {
    pool: PgPool,
}

impl PostgresChallengeStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl AuthenticationNonceStore for PostgresChallengeStore {
    fn insert<'a>(
        &'a self,
        nonce: &'a str,
        challenge: Challenge,
        now: OffsetDateTime,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let query = "DELETE FROM challenge_nonces WHERE expires_at < $1";
            sqlx::query(query)
                .bind(now)
                .execute(&self.pool)
                .instrument(span("DELETE", query))
                .await
                .map_err(db_error)?;

            let query = r"
                INSERT INTO challenge_nonces (nonce, identity, expires_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (nonce) DO NOTHING
            ";
            let result = sqlx::query(query)
                .bind(nonce)
                .bind(&challenge.identity)
                .bind(challenge.expiry)
                .execute(&self.pool)
                .instrument(span("INSERT", query))
                .await
                .map_err(db_error)?;

            if result.rows_affected() == 0 {
                return Err(Error::Replay {
                    store: "authentication nonce".to_string(),
                    value: nonce.to_string(),
                });
            }
            Ok(())
        })
    }

    fn consume<'a>(
        &'a self,
        nonce: &'a str,
        _now: OffsetDateTime,
    ) -> BoxFuture<'a, Result<Challenge>> {
        Box::pin(async move {
            let query = r"
                UPDATE challenge_nonces
                SET used = TRUE
                WHERE nonce = $1 AND NOT used
                RETURNING identity, expires_at
            ";
            let row = sqlx::query(query)
                .bind(nonce)
                .fetch_optional(&self.pool)
                .instrument(span("UPDATE", query))
                .await
                .map_err(db_error)?;

            if let Some(row) = row {
                return Ok(Challenge {
                    identity: row.try_get("identity").map_err(db_error)?,
                    expiry: row.try_get("expires_at").map_err(db_error)?,
                });
            }

            let query = "SELECT EXISTS(SELECT 1 FROM challenge_nonces WHERE nonce = $1) AS found";
            let found: bool = sqlx::query(query)
                .bind(nonce)
                .fetch_one(&self.pool)
                .instrument(span("SELECT", query))
                .await
                .map_err(db_error)?
                .try_get("found")
                .map_err(db_error)?;

            Err(if found {
                Error::NonceUsed
            } else {
                Error::NonceNotFound
            })
        })
    }
}

/// Reservations live in one table, partitioned by `scope` so the access-key
/// and access-nonce stores can share it.
#[derive(Clone, Debug)]
pub struct PostgresTimeLockStore {
    pool: PgPool,
    scope: String,
}

impl PostgresTimeLockStore {
    /// `scope` partitions the table and names the store in replay errors.
    #[must_use]
    pub fn new(pool: PgPool, scope: impl Into<String>) -> Self {
        Self {
            pool,
            scope: scope.into(),
        }
    }
}

impl TimeLockStore for PostgresTimeLockStore {
    fn reserve<'a>(
        &'a self,
        value: &'a str,
        now: OffsetDateTime,
        until: OffsetDateTime,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let query = "DELETE FROM time_locks WHERE scope = $1 AND locked_until < $2";
            sqlx::query(query)
                .bind(&self.scope)
                .bind(now)
                .execute(&self.pool)
                .instrument(span("DELETE", query))
                .await
                .map_err(db_error)?;

            // A lapsed row left by a concurrent sweep is taken over in place.
            let query = r"
                INSERT INTO time_locks (scope, value, locked_until)
                VALUES ($1, $2, $4)
                ON CONFLICT (scope, value) DO UPDATE
                    SET locked_until = EXCLUDED.locked_until
                    WHERE time_locks.locked_until < $3
            ";
            let result = sqlx::query(query)
                .bind(&self.scope)
                .bind(value)
                .bind(now)
                .bind(until)
                .execute(&self.pool)
                .instrument(span("INSERT", query))
                .await
                .map_err(db_error)?;

            if result.rows_affected() == 0 {
                return Err(Error::Replay {
                    store: self.scope.clone(),
                    value: value.to_string(),
                });
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::postgres::tests::test_pool;
    use std::sync::Arc;
    use time::{Duration, macros::datetime};
    use ulid::Ulid;

    fn unique(prefix: &str) -> String {
        format!("{prefix}{}", Ulid::new())
    }

    #[tokio::test]
    async fn challenge_is_single_use_across_handles() -> anyhow::Result<()> {
        let Some(pool) = test_pool().await? else {
            return Ok(());
        };
        let now = datetime!(2026-01-01 00:00 UTC);
        let nonce = unique("0A");
        let first = PostgresChallengeStore::new(pool.clone());
        let second = PostgresChallengeStore::new(pool);

        first
            .insert(
                &nonce,
                Challenge {
                    identity: "Eid".into(),
                    expiry: now + Duration::minutes(1),
                },
                now,
            )
            .await?;

        let challenge = second.consume(&nonce, now).await?;
        assert_eq!(challenge.identity, "Eid");
        assert_eq!(challenge.expiry, now + Duration::minutes(1));
        assert_eq!(first.consume(&nonce, now).await, Err(Error::NonceUsed));
        assert_eq!(
            first.consume(&unique("0A"), now).await,
            Err(Error::NonceNotFound)
        );
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_reservations_have_one_winner() -> anyhow::Result<()> {
        let Some(pool) = test_pool().await? else {
            return Ok(());
        };
        let now = datetime!(2026-01-01 00:00 UTC);
        let value = unique("E");

        let mut handles = Vec::new();
        for _ in 0..8 {
            // One store per task, as separate instances would hold.
            let store = Arc::new(PostgresTimeLockStore::new(pool.clone(), "access key hash"));
            let value = value.clone();
            handles.push(tokio::spawn(async move {
                store
                    .reserve(&value, now, now + Duration::minutes(15))
                    .await
                    .is_ok()
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
    async fn reservation_lapses_and_scopes_are_independent() -> anyhow::Result<()> {
        let Some(pool) = test_pool().await? else {
            return Ok(());
        };
        let now = datetime!(2026-01-01 00:00 UTC);
        let until = now + Duration::seconds(30);
        let value = unique("0A");
        let nonces = PostgresTimeLockStore::new(pool.clone(), "access nonce");
        let hashes = PostgresTimeLockStore::new(pool, "access key hash");

        nonces.reserve(&value, now, until).await?;
        hashes.reserve(&value, now, until).await?;
        assert!(matches!(
            nonces.reserve(&value, now + Duration::seconds(10), until).await,
            Err(Error::Replay { .. })
        ));

        nonces
            .reserve(&value, until + Duration::seconds(1), until + Duration::seconds(31))
            .await?;
        Ok(())
    }
}
