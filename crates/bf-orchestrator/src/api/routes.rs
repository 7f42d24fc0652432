use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use utoipa::OpenApi;

use bf_core::api::{ErrorResponse, FleetHealth, HealthResponse, UpdateBotRequest};
use bf_core::error::CoordinatorError;
use bf_core::types::{BotDefinition, BotOperationResult, BotStatusInfo, ReplicaId};

use super::{ApiDoc, AppState, API_TITLE};

/// Handler error rendered as `{"error": ".."}`
pub(super) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Missing or invalid bearer token")
    }

    fn not_found(replica_id: &ReplicaId) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("Bot {} not found", replica_id))
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        let status = match &err {
            CoordinatorError::OutOfSync { .. } => StatusCode::CONFLICT,
            CoordinatorError::Source(_) => StatusCode::BAD_GATEWAY,
        };
        tracing::warn!(error = %err, status = status.as_u16(), "Bot mutation rejected");
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse::new(self.message))).into_response()
    }
}

/// Bearer check for the `/bots` routes, run before any body extraction
pub(super) async fn require_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.auth_token {
        let provided = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        if provided != Some(expected.expose()) {
            return Err(ApiError::unauthorized());
        }
    }

    Ok(next.run(request).await)
}

/// GET /
pub(super) async fn index() -> Html<String> {
    Html(format!(
        "<h1>{API_TITLE}</h1>\n<ul>\n  \
         <li><a href='/ui'>Swagger</a></li>\n  \
         <li><a href='/schema'>Schema</a></li>\n  \
         <li><a href='/health'>Health</a></li>\n  \
         <li><a href='/status'>Status</a></li>\n</ul>\n"
    ))
}

/// GET /schema
pub(super) async fn schema() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// GET /ui
pub(super) async fn swagger_ui() -> Html<&'static str> {
    Html(SWAGGER_UI_PAGE)
}

const SWAGGER_UI_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>botfleet orchestrator</title>
  <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/swagger-ui-bundle.js" crossorigin></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/schema', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>
"#;

/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    tag = "fleet",
    responses(
        (status = 200, description = "Every desired bot is running", body = HealthResponse),
        (status = 503, description = "At least one bot is missing or unhealthy", body = HealthResponse)
    )
)]
pub(super) async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let healthy = state.coordinator.is_healthy().await;
    let body = HealthResponse {
        status: if healthy {
            FleetHealth::Healthy
        } else {
            FleetHealth::Unhealthy
        },
        uptime: state.started_at.elapsed().as_secs(),
    };
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// GET /status
#[utoipa::path(
    get,
    path = "/status",
    tag = "fleet",
    responses((status = 200, description = "Status of every supervised bot", body = [BotStatusInfo]))
)]
pub(super) async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.coordinator.get_status().await)
}

/// POST /bots
#[utoipa::path(
    post,
    path = "/bots",
    tag = "bots",
    request_body = BotDefinition,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Bot created or replaced"),
        (status = 400, description = "Missing replicaId or token", body = ErrorResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 409, description = "Definition disagrees with the replica source", body = ErrorResponse),
        (status = 502, description = "Replica source unreachable", body = ErrorResponse)
    )
)]
pub(super) async fn create_bot(
    State(state): State<Arc<AppState>>,
    Json(definition): Json<BotDefinition>,
) -> Result<Response, ApiError> {
    if definition.replica_id.as_str().is_empty() || definition.token.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "replicaId and token are required",
        ));
    }

    let location = format!("/bots/{}", definition.replica_id);
    if state.verify_with_source {
        state.coordinator.add_bot_checked(definition).await?;
    } else {
        state.coordinator.add_bot(definition).await;
    }

    Ok((StatusCode::CREATED, [(header::LOCATION, location)]).into_response())
}

/// PUT /bots/:replica_id
#[utoipa::path(
    put,
    path = "/bots/{replica_id}",
    tag = "bots",
    params(("replica_id" = String, Path, description = "Replica to update")),
    request_body = UpdateBotRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Bot was unknown and has been created"),
        (status = 204, description = "Bot updated"),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 404, description = "Unknown bot and the body is not a full definition", body = ErrorResponse),
        (status = 409, description = "Definition disagrees with the replica source", body = ErrorResponse),
        (status = 502, description = "Replica source unreachable", body = ErrorResponse)
    )
)]
pub(super) async fn update_bot(
    State(state): State<Arc<AppState>>,
    Path(replica_id): Path<String>,
    Json(body): Json<UpdateBotRequest>,
) -> Result<Response, ApiError> {
    let replica_id = ReplicaId::new(replica_id);
    let patch = body.into_patch(replica_id.clone());

    let result = if state.verify_with_source {
        state.coordinator.update_bot_checked(patch).await?
    } else {
        state.coordinator.update_bot(patch).await
    };

    match result {
        BotOperationResult::Created => Ok((
            StatusCode::CREATED,
            [(header::LOCATION, format!("/bots/{}", replica_id))],
        )
            .into_response()),
        BotOperationResult::NotFound => Err(ApiError::not_found(&replica_id)),
        _ => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// DELETE /bots/:replica_id
#[utoipa::path(
    delete,
    path = "/bots/{replica_id}",
    tag = "bots",
    params(("replica_id" = String, Path, description = "Replica to remove")),
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Bot stopped and removed"),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 404, description = "Unknown bot", body = ErrorResponse),
        (status = 409, description = "Replica still exists in the source", body = ErrorResponse),
        (status = 502, description = "Replica source unreachable", body = ErrorResponse)
    )
)]
pub(super) async fn delete_bot(
    State(state): State<Arc<AppState>>,
    Path(replica_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let replica_id = ReplicaId::new(replica_id);

    let result = if state.verify_with_source {
        state.coordinator.delete_bot_checked(&replica_id).await?
    } else {
        state.coordinator.delete_bot(&replica_id).await
    };

    match result {
        BotOperationResult::NotFound => Err(ApiError::not_found(&replica_id)),
        _ => Ok(StatusCode::NO_CONTENT),
    }
}
