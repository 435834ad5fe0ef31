pub mod account;
pub mod device;
pub mod health;
pub mod keys;
pub mod session;

use crate::{
    error::{Error, ErrorCategory},
    server::AuthServer,
};
use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub server: Arc<AuthServer>,
    /// Attributes stamped into every new session's token.
    pub attributes: Value,
    /// Registry pool probed by `/health`; `None` for in-memory registries.
    pub pool: Option<PgPool>,
}

impl AppState {
    #[must_use]
    pub fn new(server: Arc<AuthServer>) -> Self {
        Self {
            server,
            attributes: Value::Object(serde_json::Map::new()),
            pool: None,
        }
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: Value) -> Self {
        self.attributes = attributes;
        self
    }

    #[must_use]
    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }
}

/// Error reply body.
#[derive(ToSchema, Serialize, Debug)]
pub struct ErrorBody {
    #[schema(value_type = Object)]
    pub error: Error,
}

#[must_use]
pub fn status(err: &Error) -> StatusCode {
    match err {
        Error::IdentityNotFound { .. }
        | Error::DeviceNotFound { .. }
        | Error::RecoveryNotFound { .. }
        | Error::NonceNotFound => StatusCode::NOT_FOUND,
        _ => match err.category() {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::Cryptographic | ErrorCategory::Token | ErrorCategory::Temporal => {
                StatusCode::UNAUTHORIZED
            }
            ErrorCategory::Authentication => StatusCode::FORBIDDEN,
            ErrorCategory::State => StatusCode::CONFLICT,
            ErrorCategory::Collaborator if err.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCategory::Collaborator => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

/// Turn an engine result into a reply: the signed envelope on success, the
/// tagged error otherwise.
pub fn reply(result: Result<String, Error>) -> Response {
    match result {
        Ok(envelope) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            envelope,
        )
            .into_response(),
        Err(err) => {
            let status = status(&err);
            if status.is_server_error() {
                error!("Failed to handle request: {err}");
            } else {
                debug!("Rejected request: {err}");
            }
            (status, Json(ErrorBody { error: err })).into_response()
        }
    }
}
