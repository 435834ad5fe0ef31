use super::AppState;
use crate::storage::KeySet;
use axum::{Json, extract::Extension, response::IntoResponse};
use std::collections::BTreeMap;

#[utoipa::path(
    get,
    path = "/keys",
    responses(
        (status = 200, description = "Keys that sign access tokens, by issuer identity", body = KeySet),
    ),
    tag = "keys"
)]
/// Publish the token-signing key for resource servers.
pub async fn keys(state: Extension<AppState>) -> impl IntoResponse {
    let mut keys = BTreeMap::new();
    keys.insert(
        state.server.access_identity(),
        state.server.access_public_key(),
    );
    Json(KeySet { keys })
}
