use super::{AppState, ErrorBody, reply};
use axum::{extract::Extension, response::IntoResponse};
use serde_json::Value;
use tracing::instrument;

#[utoipa::path(
    post,
    path = "/session/request",
    request_body(content = String, description = "Unsigned envelope naming the identity", content_type = "application/json"),
    responses(
        (status = 200, description = "Signed challenge nonce", content_type = "application/json"),
        (status = 404, description = "Unknown identity", body = ErrorBody),
    ),
    tag = "session"
)]
#[instrument(skip_all)]
pub async fn request(state: Extension<AppState>, body: String) -> impl IntoResponse {
    reply(state.server.request_session(&body).await)
}

#[utoipa::path(
    post,
    path = "/session/create",
    request_body(content = String, description = "Challenge answer signed by the device key", content_type = "application/json"),
    responses(
        (status = 200, description = "Signed response carrying the access token", content_type = "application/json"),
        (status = 401, description = "Bad signature", body = ErrorBody),
        (status = 409, description = "Challenge used or expired", body = ErrorBody),
    ),
    tag = "session"
)]
#[instrument(skip_all)]
pub async fn create(state: Extension<AppState>, body: String) -> impl IntoResponse {
    reply(
        state
            .server
            .create_session(&body, state.attributes.clone())
            .await,
    )
}

#[utoipa::path(
    post,
    path = "/session/refresh",
    request_body(content = String, description = "Envelope signed by the revealed access key", content_type = "application/json"),
    responses(
        (status = 200, description = "Signed response carrying the next access token", content_type = "application/json"),
        (status = 401, description = "Refresh ceiling passed or bad token", body = ErrorBody),
        (status = 409, description = "Access key generation already refreshed", body = ErrorBody),
    ),
    tag = "session"
)]
#[instrument(skip_all)]
pub async fn refresh(state: Extension<AppState>, body: String) -> impl IntoResponse {
    reply(state.server.refresh_session::<Value>(&body).await)
}
