use super::{AppState, ErrorBody, reply};
use axum::{extract::Extension, response::IntoResponse};
use tracing::instrument;

#[utoipa::path(
    post,
    path = "/account/create",
    request_body(content = String, description = "Signed account creation envelope", content_type = "application/json"),
    responses(
        (status = 200, description = "Signed response carrying the identity", content_type = "application/json"),
        (status = 400, description = "Malformed request or bad derivation", body = ErrorBody),
        (status = 409, description = "Identity or device already registered", body = ErrorBody),
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn create(state: Extension<AppState>, body: String) -> impl IntoResponse {
    reply(state.server.create_account(&body).await)
}

#[utoipa::path(
    post,
    path = "/account/recover",
    request_body(content = String, description = "Envelope signed by the recovery key", content_type = "application/json"),
    responses(
        (status = 200, description = "Devices revoked and a new one registered", content_type = "application/json"),
        (status = 400, description = "Recovery key does not open the commitment", body = ErrorBody),
        (status = 404, description = "No recovery commitment", body = ErrorBody),
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn recover(state: Extension<AppState>, body: String) -> impl IntoResponse {
    reply(state.server.recover_account(&body).await)
}

#[utoipa::path(
    post,
    path = "/account/delete",
    request_body(content = String, description = "Envelope signed by the revealed device key", content_type = "application/json"),
    responses(
        (status = 200, description = "Identity deleted and devices revoked", content_type = "application/json"),
        (status = 409, description = "Identity deleted or device revoked", body = ErrorBody),
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn delete(state: Extension<AppState>, body: String) -> impl IntoResponse {
    reply(state.server.delete_account(&body).await)
}

#[utoipa::path(
    post,
    path = "/recovery/change",
    request_body(content = String, description = "Envelope signed by the revealed device key", content_type = "application/json"),
    responses(
        (status = 200, description = "Recovery commitment replaced", content_type = "application/json"),
        (status = 400, description = "Bad reveal", body = ErrorBody),
    ),
    tag = "account"
)]
#[instrument(skip_all)]
pub async fn change_recovery(state: Extension<AppState>, body: String) -> impl IntoResponse {
    reply(state.server.change_recovery_key(&body).await)
}
