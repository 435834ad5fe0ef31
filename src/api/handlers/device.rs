use super::{AppState, ErrorBody, reply};
use axum::{extract::Extension, response::IntoResponse};
use tracing::instrument;

#[utoipa::path(
    post,
    path = "/device/rotate",
    request_body(content = String, description = "Envelope signed by the revealed device key", content_type = "application/json"),
    responses(
        (status = 200, description = "Device rotated", content_type = "application/json"),
        (status = 400, description = "Revealed key does not open the commitment", body = ErrorBody),
        (status = 409, description = "Concurrent rotation or revoked device", body = ErrorBody),
    ),
    tag = "device"
)]
#[instrument(skip_all)]
pub async fn rotate(state: Extension<AppState>, body: String) -> impl IntoResponse {
    reply(state.server.rotate_device(&body).await)
}

#[utoipa::path(
    post,
    path = "/device/link",
    request_body(content = String, description = "Endorsement wrapping the new device's link container", content_type = "application/json"),
    responses(
        (status = 200, description = "Device linked", content_type = "application/json"),
        (status = 403, description = "Link container names another identity", body = ErrorBody),
        (status = 409, description = "Device already registered", body = ErrorBody),
    ),
    tag = "device"
)]
#[instrument(skip_all)]
pub async fn link(state: Extension<AppState>, body: String) -> impl IntoResponse {
    reply(state.server.link_device(&body).await)
}

#[utoipa::path(
    post,
    path = "/device/unlink",
    request_body(content = String, description = "Envelope signed by the revealed device key", content_type = "application/json"),
    responses(
        (status = 200, description = "Device revoked", content_type = "application/json"),
        (status = 404, description = "Unknown device", body = ErrorBody),
    ),
    tag = "device"
)]
#[instrument(skip_all)]
pub async fn unlink(state: Extension<AppState>, body: String) -> impl IntoResponse {
    reply(state.server.unlink_device(&body).await)
}
