use super::AppState;
use crate::GIT_COMMIT_HASH;
use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgPool};
use tokio::time::{Duration, timeout};
use tracing::{Instrument, debug, error, info_span, warn};
use utoipa::ToSchema;

const HEALTH_DB_TIMEOUT_SECONDS: u64 = 2;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    registry: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Registry is reachable", body = Health),
        (status = 503, description = "Registry is unreachable", body = Health),
    ),
    tag = "health"
)]
/// Report build metadata and registry reachability.
pub async fn health(state: Extension<AppState>) -> impl IntoResponse {
    let (status, registry) = match &state.pool {
        Some(pool) => {
            if ping(pool).await {
                (StatusCode::OK, "ok")
            } else {
                (StatusCode::SERVICE_UNAVAILABLE, "error")
            }
        }
        None => (StatusCode::OK, "memory"),
    };

    let body = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        registry: registry.to_string(),
    };

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&app_header()) {
        headers.insert("X-App", value);
    }

    (status, headers, Json(body))
}

fn app_header() -> String {
    let short_hash = GIT_COMMIT_HASH.get(0..7).unwrap_or_default();
    format!(
        "{}:{}:{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_hash
    )
}

async fn ping(pool: &PgPool) -> bool {
    let probe = async {
        match pool.acquire().await {
            Ok(mut conn) => {
                let ping_span =
                    info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
                match conn.ping().instrument(ping_span).await {
                    Ok(()) => true,
                    Err(err) => {
                        error!("Failed to ping database: {}", err);
                        false
                    }
                }
            }
            Err(err) => {
                error!("Failed to acquire database connection: {}", err);
                false
            }
        }
    };

    let healthy = if let Ok(result) =
        timeout(Duration::from_secs(HEALTH_DB_TIMEOUT_SECONDS), probe).await
    {
        result
    } else {
        warn!("Database health check timed out");
        false
    };

    debug!(healthy, "Database probe finished");
    healthy
}
