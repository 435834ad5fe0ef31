//! PostgreSQL-backed collaborators.
//!
//! The registry, challenge nonces, and time-lock reservations share one
//! pool and one schema, so every instance pointed at the same database sees
//! the same single-use state.

mod nonces;
mod registry;

pub use nonces::{PostgresChallengeStore, PostgresTimeLockStore};
pub use registry::PostgresRegistry;

use crate::error::{Error, Result};
use sqlx::{PgPool, Row, postgres::PgRow};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

/// Create the registry and nonce tables if they do not exist.
///
/// # Errors
/// Returns an error naming the first statement that failed.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
        sqlx::query(statement).execute(pool).await.map_err(|err| {
            Error::collaborator(
                "postgres",
                format!("schema statement {} failed: {err}", index + 1),
                false,
            )
        })?;
    }
    Ok(())
}

fn db_error(err: sqlx::Error) -> Error {
    let transient = matches!(
        err,
        sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::WorkerCrashed
    );
    Error::collaborator("postgres", err, transient)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

fn sequence(row: &PgRow) -> Result<u64> {
    let value: i64 = row.try_get("sequence_number").map_err(db_error)?;
    u64::try_from(value)
        .map_err(|_| Error::collaborator("postgres", format!("negative sequence {value}"), false))
}

fn span(operation: &str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}
