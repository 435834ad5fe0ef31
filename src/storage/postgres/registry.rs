//! Versioned registry tables.
//!
//! Every version is its own row. A batch is one transaction, and the
//! `(key, sequence_number)` primary keys turn a lost race into a unique
//! violation, which is reported as the write's conflict.

use super::{db_error, is_unique_violation, sequence, span};
use crate::{
    error::Result,
    interfaces::{
        BoxFuture, DeviceRecord, IdentityRecord, RecoveryRecord, RegistryStore, VersionWrite,
        Versioned,
    },
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use tracing::Instrument;

#[derive(Clone, Debug)]
pub struct PostgresRegistry {
    pool: PgPool,
}

impl PostgresRegistry {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn device_from_row(row: &PgRow) -> Result<Versioned<DeviceRecord>> {
    Ok(Versioned {
        sequence: sequence(row)?,
        record: DeviceRecord {
            identity: row.try_get("identity").map_err(db_error)?,
            device: row.try_get("device").map_err(db_error)?,
            public_key: row.try_get("public_key").map_err(db_error)?,
            rotation_hash: row.try_get("rotation_hash").map_err(db_error)?,
            revoked: row.try_get("revoked").map_err(db_error)?,
        },
    })
}

async fn insert_version(
    tx: &mut Transaction<'_, Postgres>,
    write: &VersionWrite,
) -> std::result::Result<(), sqlx::Error> {
    let sequence =
        i64::try_from(write.sequence()).map_err(|err| sqlx::Error::Encode(Box::new(err)))?;

    match write {
        VersionWrite::Identity { record, .. } => {
            let query = "INSERT INTO identities (identity, sequence_number, deleted) VALUES ($1, $2, $3)";
            sqlx::query(query)
                .bind(&record.identity)
                .bind(sequence)
                .bind(record.deleted)
                .execute(&mut **tx)
                .instrument(span("INSERT", query))
                .await?;
        }
        VersionWrite::Device { record, .. } => {
            let query = r"
                INSERT INTO devices
                    (device, sequence_number, identity, public_key, rotation_hash, revoked)
                VALUES ($1, $2, $3, $4, $5, $6)
            ";
            sqlx::query(query)
                .bind(&record.device)
                .bind(sequence)
                .bind(&record.identity)
                .bind(&record.public_key)
                .bind(&record.rotation_hash)
                .bind(record.revoked)
                .execute(&mut **tx)
                .instrument(span("INSERT", query))
                .await?;
        }
        VersionWrite::Recovery { record, .. } => {
            let query = "INSERT INTO recovery_hashes (identity, sequence_number, recovery_hash) VALUES ($1, $2, $3)";
            sqlx::query(query)
                .bind(&record.identity)
                .bind(sequence)
                .bind(&record.recovery_hash)
                .execute(&mut **tx)
                .instrument(span("INSERT", query))
                .await?;
        }
    }
    Ok(())
}

impl RegistryStore for PostgresRegistry {
    fn identity<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, Result<Option<Versioned<IdentityRecord>>>> {
        Box::pin(async move {
            let query = r"
                SELECT sequence_number, deleted FROM identities
                WHERE identity = $1
                ORDER BY sequence_number DESC
                LIMIT 1
            ";
            let row = sqlx::query(query)
                .bind(identity)
                .fetch_optional(&self.pool)
                .instrument(span("SELECT", query))
                .await
                .map_err(db_error)?;

            row.map(|row| {
                Ok(Versioned {
                    sequence: sequence(&row)?,
                    record: IdentityRecord {
                        identity: identity.to_string(),
                        deleted: row.try_get("deleted").map_err(db_error)?,
                    },
                })
            })
            .transpose()
        })
    }

    fn device<'a>(
        &'a self,
        identity: &'a str,
        device: &'a str,
    ) -> BoxFuture<'a, Result<Option<Versioned<DeviceRecord>>>> {
        Box::pin(async move {
            let query = r"
                SELECT device, sequence_number, identity, public_key, rotation_hash, revoked
                FROM devices
                WHERE device = $1 AND identity = $2
                ORDER BY sequence_number DESC
                LIMIT 1
            ";
            let row = sqlx::query(query)
                .bind(device)
                .bind(identity)
                .fetch_optional(&self.pool)
                .instrument(span("SELECT", query))
                .await
                .map_err(db_error)?;

            row.as_ref().map(device_from_row).transpose()
        })
    }

    fn devices<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Versioned<DeviceRecord>>>> {
        Box::pin(async move {
            let query = r"
                SELECT DISTINCT ON (device)
                    device, sequence_number, identity, public_key, rotation_hash, revoked
                FROM devices
                WHERE identity = $1
                ORDER BY device, sequence_number DESC
            ";
            let rows = sqlx::query(query)
                .bind(identity)
                .fetch_all(&self.pool)
                .instrument(span("SELECT", query))
                .await
                .map_err(db_error)?;

            rows.iter().map(device_from_row).collect()
        })
    }

    fn recovery<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, Result<Option<Versioned<RecoveryRecord>>>> {
        Box::pin(async move {
            let query = r"
                SELECT sequence_number, recovery_hash FROM recovery_hashes
                WHERE identity = $1
                ORDER BY sequence_number DESC
                LIMIT 1
            ";
            let row = sqlx::query(query)
                .bind(identity)
                .fetch_optional(&self.pool)
                .instrument(span("SELECT", query))
                .await
                .map_err(db_error)?;

            row.map(|row| {
                Ok(Versioned {
                    sequence: sequence(&row)?,
                    record: RecoveryRecord {
                        identity: identity.to_string(),
                        recovery_hash: row.try_get("recovery_hash").map_err(db_error)?,
                    },
                })
            })
            .transpose()
        })
    }

    fn commit<'a>(&'a self, writes: Vec<VersionWrite>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_error)?;

            for write in &writes {
                match insert_version(&mut tx, write).await {
                    Ok(()) => {}
                    // Dropping the transaction rolls the batch back.
                    Err(err) if is_unique_violation(&err) => return Err(write.conflict()),
                    Err(err) => return Err(db_error(err)),
                }
            }

            tx.commit().await.map_err(db_error)
        })
    }
}
