//! HTTP surface of the orchestrator
//!
//! `/health`, `/status` and the documentation pages are open; the `/bots`
//! CRUD routes require a bearer token when one is configured.

mod routes;

use std::sync::Arc;
use std::time::Instant;

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use bf_core::api::{ErrorResponse, FleetHealth, HealthResponse, UpdateBotRequest};
use bf_core::config::ApiConfig;
use bf_core::types::{BotDefinition, BotStatus, BotStatusInfo, ReplicaId, SensitiveString};

use crate::coordinator::Coordinator;

/// Shared state for all handlers
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub started_at: Instant,
    pub auth_token: Option<SensitiveString>,
    /// Route CRUD through the checked coordinator variants
    pub verify_with_source: bool,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>, config: &ApiConfig) -> Self {
        Self {
            coordinator,
            started_at: Instant::now(),
            auth_token: config.auth_token.clone().filter(|t| !t.is_empty()),
            verify_with_source: config.verify_with_source,
        }
    }
}

pub(crate) const API_TITLE: &str = "botfleet orchestrator API";

/// OpenAPI document served at `/schema`
#[derive(OpenApi)]
#[openapi(
    info(title = "botfleet orchestrator API"),
    paths(
        routes::health,
        routes::status,
        routes::create_bot,
        routes::update_bot,
        routes::delete_bot
    ),
    components(schemas(
        ReplicaId,
        SensitiveString,
        BotDefinition,
        BotStatus,
        BotStatusInfo,
        UpdateBotRequest,
        FleetHealth,
        HealthResponse,
        ErrorResponse
    )),
    modifiers(&BearerAuth)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// Build the orchestrator router
pub fn router(state: Arc<AppState>) -> Router {
    let bots = Router::new()
        .route("/bots", post(routes::create_bot))
        .route(
            "/bots/:replica_id",
            put(routes::update_bot).delete(routes::delete_bot),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            routes::require_token,
        ));

    Router::new()
        .route("/", get(routes::index))
        .route("/schema", get(routes::schema))
        .route("/ui", get(routes::swagger_ui))
        .route("/health", get(routes::health))
        .route("/status", get(routes::status))
        .merge(bots)
        .with_state(state)
}

/// Serve the API until `cancel` fires
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP API listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use bf_core::config::FleetConfig;
    use bf_core::types::BotStatusInfo;

    use crate::test_support::{bot, test_config, FakeLauncher, FakeSource};

    struct Harness {
        app: Router,
        source: FakeSource,
        launcher: FakeLauncher,
    }

    fn harness(auth_token: Option<&str>, verify_with_source: bool) -> Harness {
        let source = FakeSource::default();
        let launcher = FakeLauncher::new();
        let config = FleetConfig {
            supervisor: test_config(),
            ..FleetConfig::default()
        };
        let coordinator = Arc::new(Coordinator::new(
            &config,
            Arc::new(source.clone()),
            Arc::new(launcher.clone()),
        ));
        let api = ApiConfig {
            auth_token: auth_token.map(SensitiveString::from),
            verify_with_source,
            ..ApiConfig::default()
        };
        Harness {
            app: router(Arc::new(AppState::new(coordinator, &api))),
            source,
            launcher,
        }
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(res: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn new_bot(id: &str) -> Value {
        json!({ "replicaId": id, "ownerId": format!("owner-{id}"), "token": format!("token-{id}"), "replicaSlug": id })
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_fleet_is_healthy() {
        let h = harness(None, false);
        let res = h.app.oneshot(request("GET", "/health", None, None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["status"], "healthy");
    }

    #[tokio::test(start_paused = true)]
    async fn test_crud_lifecycle() {
        let h = harness(None, false);

        let res = h
            .app
            .clone()
            .oneshot(request("POST", "/bots", None, Some(new_bot("a"))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers()["location"], "/bots/a");

        tokio::time::sleep(Duration::from_millis(50)).await;
        let res = h.app.clone().oneshot(request("GET", "/status", None, None)).await.unwrap();
        let statuses: Vec<BotStatusInfo> = serde_json::from_value(body_json(res).await).unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].replica_id.as_str(), "a");
        assert_eq!(statuses[0].owner_id, "owner-a");

        let res = h
            .app
            .clone()
            .oneshot(request("PUT", "/bots/a", None, Some(json!({ "voiceId": "v-1" }))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert_eq!(h.launcher.launches(), 2);

        let res = h
            .app
            .clone()
            .oneshot(request("PUT", "/bots/b", None, Some(json!({ "voiceId": "v-1" }))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(body_json(res).await["error"].as_str().unwrap().contains("b"));

        let res = h
            .app
            .clone()
            .oneshot(request("PUT", "/bots/b", None, Some(new_bot("b"))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = h.app.clone().oneshot(request("DELETE", "/bots/a", None, None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        let res = h.app.oneshot(request("DELETE", "/bots/a", None, None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_fleet_reports_503() {
        let h = harness(None, false);
        h.launcher.set_healthy(false);
        h.app
            .clone()
            .oneshot(request("POST", "/bots", None, Some(new_bot("a"))))
            .await
            .unwrap();

        let res = h.app.oneshot(request("GET", "/health", None, None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(res).await["status"], "unhealthy");
    }

    #[tokio::test(start_paused = true)]
    async fn test_bots_routes_require_token() {
        let h = harness(Some("s3cret"), false);

        let res = h
            .app
            .clone()
            .oneshot(request("POST", "/bots", None, Some(new_bot("a"))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = h
            .app
            .clone()
            .oneshot(request("DELETE", "/bots/a", Some("wrong"), None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = h
            .app
            .clone()
            .oneshot(request("POST", "/bots", Some("s3cret"), Some(new_bot("a"))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        // Read-only routes stay open
        let res = h.app.oneshot(request("GET", "/status", None, None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(h.launcher.launches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_runs_before_body_parsing() {
        let h = harness(Some("s3cret"), false);

        let malformed = Request::builder()
            .method("POST")
            .uri("/bots")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let res = h.app.clone().oneshot(malformed).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(body_json(res).await["error"].as_str().unwrap().contains("bearer"));

        let res = h
            .app
            .clone()
            .oneshot(request("PUT", "/bots/a", None, Some(json!({ "ownerId": 7 }))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        // With the token the same body reaches the extractor
        let malformed = Request::builder()
            .method("POST")
            .uri("/bots")
            .header("authorization", "Bearer s3cret")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let res = h.app.oneshot(malformed).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.launcher.launches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schema_documents_bot_routes() {
        let h = harness(Some("s3cret"), false);

        let res = h.app.clone().oneshot(request("GET", "/schema", None, None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let doc = body_json(res).await;
        assert!(doc["openapi"].as_str().unwrap().starts_with("3."));
        assert_eq!(doc["info"]["title"], API_TITLE);

        let paths = doc["paths"].as_object().unwrap();
        for path in ["/health", "/status", "/bots", "/bots/{replica_id}"] {
            assert!(paths.contains_key(path), "missing {path}");
        }
        assert!(paths["/bots"]["post"].is_object());
        assert!(paths["/bots/{replica_id}"]["put"].is_object());
        assert!(paths["/bots/{replica_id}"]["delete"].is_object());
        assert!(doc["components"]["schemas"]["BotDefinition"].is_object());
        assert!(doc["components"]["securitySchemes"]["bearer_auth"].is_object());
    }

    #[tokio::test(start_paused = true)]
    async fn test_documentation_pages_are_open() {
        let h = harness(Some("s3cret"), false);

        for (uri, needle) in [("/", "href='/schema'"), ("/ui", "SwaggerUIBundle")] {
            let res = h.app.clone().oneshot(request("GET", uri, None, None)).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            assert!(res.headers()["content-type"]
                .to_str()
                .unwrap()
                .starts_with("text/html"));
            let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
            assert!(String::from_utf8_lossy(&bytes).contains(needle), "{uri}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_verified_mutations() {
        let h = harness(None, true);

        let res = h
            .app
            .clone()
            .oneshot(request("POST", "/bots", None, Some(new_bot("a"))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(h.launcher.launches(), 0);

        h.source.set_bots(vec![bot("a")]);
        let res = h
            .app
            .clone()
            .oneshot(request("POST", "/bots", None, Some(new_bot("a"))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);

        h.source.set_offline(true);
        let res = h.app.oneshot(request("DELETE", "/bots/a", None, None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_empty_token() {
        let h = harness(None, false);
        let body = json!({ "replicaId": "a", "ownerId": "o", "token": "" });
        let res = h.app.oneshot(request("POST", "/bots", None, Some(body))).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
