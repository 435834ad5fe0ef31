//! HTTP surface for the engine.
//!
//! Every operation is a `POST` carrying the serialized request envelope as
//! its body; the reply body is the signed response envelope, or a tagged
//! error with a status derived from its category.

pub mod handlers;

pub use handlers::AppState;

use anyhow::Result;
use axum::{
    Extension, Router,
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
};
use handlers::{account, device, health, keys, session};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, debug_span, info};
use ulid::Ulid;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        keys::keys,
        account::create,
        account::recover,
        account::delete,
        account::change_recovery,
        session::request,
        session::create,
        session::refresh,
        device::rotate,
        device::link,
        device::unlink,
    ),
    components(schemas(health::Health, handlers::ErrorBody, crate::storage::KeySet)),
    tags(
        (name = "account", description = "Account lifecycle and recovery"),
        (name = "session", description = "Challenge login and token refresh"),
        (name = "device", description = "Device rotation and linking"),
        (name = "keys", description = "Token-signing keys for resource servers"),
        (name = "health", description = "Service status"),
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Routes with handler state attached, without the tracing layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/keys", get(keys::keys))
        .route("/account/create", post(account::create))
        .route("/account/recover", post(account::recover))
        .route("/account/delete", post(account::delete))
        .route("/recovery/change", post(account::change_recovery))
        .route("/session/request", post(session::request))
        .route("/session/create", post(session::create))
        .route("/session/refresh", post(session::refresh))
        .route("/device/rotate", post(device::rotate))
        .route("/device/link", post(device::link))
        .route("/device/unlink", post(device::unlink))
        .layer(Extension(state))
}

/// Serve the API on `port` until ctrl-c.
///
/// # Errors
/// Returns an error if the listener cannot bind or the server fails
pub async fn new(port: u16, state: AppState) -> Result<()> {
    let app = router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span)),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Gracefully shutdown");
            }
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, ?headers, request_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        messages::{CreateAccountResponse, RequestSessionResponse},
        storage::KeySet,
        testing::Harness,
    };
    use axum::{
        body::to_bytes,
        http::{Method, StatusCode},
        response::Response,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app(harness: &Harness) -> Router {
        router(AppState::new(harness.server.clone()).with_attributes(json!({"role": "reader"})))
    }

    async fn post_to(app: &Router, path: &str, body: String) -> anyhow::Result<Response> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body))?;
        Ok(app.clone().oneshot(request).await?)
    }

    async fn body_text(response: Response) -> anyhow::Result<String> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    #[tokio::test]
    async fn login_over_http() -> anyhow::Result<()> {
        let harness = Harness::new();
        let app = app(&harness);
        let mut client = harness.device();

        let sent = client.create_account().await?;
        let response = post_to(&app, "/account/create", sent.message.clone()).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let created: CreateAccountResponse = harness.accept(&sent, &body_text(response).await?)?;
        client.identity = created.identity;

        let sent = client.request_session().await?;
        let response = post_to(&app, "/session/request", sent.message.clone()).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let challenge: RequestSessionResponse =
            harness.accept(&sent, &body_text(response).await?)?;

        let sent = client
            .create_session(&challenge.authentication.nonce)
            .await?;
        let response = post_to(&app, "/session/create", sent.message.clone()).await?;
        assert_eq!(response.status(), StatusCode::OK);
        client.accept_session(&harness, &sent, &body_text(response).await?)?;

        let sent = client.refresh().await?;
        let response = post_to(&app, "/session/refresh", sent.message.clone()).await?;
        assert_eq!(response.status(), StatusCode::OK);
        client.accept_refresh(&harness, &sent, &body_text(response).await?)?;

        let request = client.access_request(&harness, json!({"read": "inbox"})).await?;
        let verified = harness.verifier.verify::<Value, Value>(&request).await?;
        assert_eq!(verified.token.attributes, json!({"role": "reader"}));
        Ok(())
    }

    #[tokio::test]
    async fn errors_carry_status_and_kind() -> anyhow::Result<()> {
        let harness = Harness::new();
        let app = app(&harness);

        let response = post_to(&app, "/session/request", "not json".to_string()).await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body_text(response).await?)?;
        assert_eq!(body["error"]["kind"], "invalid_message");

        let client = harness.device();
        let sent = client.request_session().await?;
        let response = post_to(&app, "/session/request", sent.message).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_str(&body_text(response).await?)?;
        assert_eq!(body["error"]["kind"], "identity_not_found");

        let client = harness.enroll().await?;
        let sent = client.create_account().await?;
        let response = post_to(&app, "/account/create", sent.message).await?;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        Ok(())
    }

    #[tokio::test]
    async fn keys_publish_the_access_key() -> anyhow::Result<()> {
        let harness = Harness::new();
        let request = Request::builder().uri("/keys").body(Body::empty())?;
        let response = app(&harness).oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::OK);

        let set: KeySet = serde_json::from_str(&body_text(response).await?)?;
        assert_eq!(
            set.keys.get(&harness.server.access_identity()),
            Some(&harness.server.access_public_key())
        );
        Ok(())
    }

    #[tokio::test]
    async fn health_reports_memory_registry() -> anyhow::Result<()> {
        let harness = Harness::new();
        let request = Request::builder().uri("/health").body(Body::empty())?;
        let response = app(&harness).oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::OK);

        let app_header = response
            .headers()
            .get("X-App")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(app_header.starts_with(&format!(
            "{}:{}:",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )));

        let body: Value = serde_json::from_str(&body_text(response).await?)?;
        assert_eq!(body["registry"], "memory");
        assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
        Ok(())
    }

    #[test]
    fn openapi_documents_every_route() {
        let doc = openapi();
        for path in [
            "/health",
            "/keys",
            "/account/create",
            "/account/recover",
            "/account/delete",
            "/recovery/change",
            "/session/request",
            "/session/create",
            "/session/refresh",
            "/device/rotate",
            "/device/link",
            "/device/unlink",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
