//! HTTP API
//!
//! # Endpoints
//!
//! - POST /api/vision/chat - Advance a discovery conversation (bearer session required)
//! - GET /api/status - Server status
//!
//! Error bodies are always `{"error": "..."}`. Downstream faults (database,
//! completion provider) are logged server-side and answered with a generic
//! message.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use sdk::errors::{EngineError, VivaErrorExt};
use sdk::types::{ChatRequest, ChatResponse};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::{Database, SessionRepository};
use crate::discovery::DiscoveryOrchestrator;
use crate::llm::{CompletionProvider, OpenAIProvider};
use crate::secrets::{scrub, SecretCache, SecretManager};

/// Keychain service under which secrets are stored
pub const SECRET_SERVICE: &str = "viva";

/// Body of every 500 response
pub const GENERIC_FAILURE: &str = "Failed to process discovery step";

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<DiscoveryOrchestrator>,
    sessions: Arc<SessionRepository>,
}

impl AppState {
    pub fn new(orchestrator: DiscoveryOrchestrator, sessions: SessionRepository) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            sessions: Arc::new(sessions),
        }
    }
}

/// Error wrapper that renders an [`EngineError`] as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(EngineError::InvalidInput(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;

        let (status, message) = if err.is_client_fault() {
            (StatusCode::BAD_REQUEST, err.to_string())
        } else if err.is_state_fault() {
            tracing::info!("Rejected discovery request: {}", err);
            (StatusCode::CONFLICT, err.to_string())
        } else {
            match err {
                EngineError::Unauthorized(_) => {
                    (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
                }
                EngineError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
                other => {
                    tracing::error!(
                        "Discovery request failed: {} (hint: {})",
                        scrub(&other.to_string()),
                        other.user_hint()
                    );
                    (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE.to_string())
                }
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Build the application router
pub fn router(state: AppState, allow_any_origin: bool) -> Router {
    let app = Router::new()
        .route("/api/vision/chat", post(chat_handler))
        .route("/api/status", get(status_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if allow_any_origin {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Resolve the `Authorization: Bearer <token>` header to a user id
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, EngineError> {
    let token = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| EngineError::Unauthorized("missing bearer token".to_string()))?;

    state
        .sessions
        .authenticate(token)
        .await?
        .ok_or_else(|| EngineError::Unauthorized("invalid or expired session".to_string()))
}

/// Discovery chat endpoint
async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let user_id = authenticate(&state, &headers).await?;
    let Json(request) = payload?;

    let response = state.orchestrator.handle(&user_id, request).await?;
    Ok(Json(response))
}

/// Status endpoint
async fn status_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "commit": env!("GIT_COMMIT_HASH"),
    }))
}

/// Run the HTTP service until Ctrl-C
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let db = Database::new(&config.database_path()).await?;

    let secret_cache = Arc::new(SecretCache::new(Arc::new(SecretManager::new(
        SECRET_SERVICE,
    ))));
    let provider: Arc<dyn CompletionProvider> = Arc::new(
        OpenAIProvider::new(config.llm.openai.clone(), secret_cache)
            .map_err(|e| anyhow::anyhow!("Failed to create completion provider: {}", e))?,
    );

    if !provider.check_health().await {
        tracing::warn!(
            "No OpenAI API key found; completions will fail until OPENAI_API_KEY is set or `viva secret set openai_api_key` is run"
        );
    }

    let orchestrator = DiscoveryOrchestrator::new(
        &db,
        provider,
        config.discovery.clone(),
        config.tokens.chars_per_token,
    );
    let state = AppState::new(orchestrator, db.sessions());
    let app = router(state, config.server.cors_allow_any_origin);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    tracing::info!(
        "Viva {} ({}) listening on http://{}",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        })
        .await?;

    db.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: EngineError) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(EngineError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(EngineError::InvalidAction("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(EngineError::TemplateNotFound("love".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(EngineError::Unauthorized("x".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(EngineError::Forbidden("x".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(EngineError::Conflict("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(EngineError::InvalidTransition {
                phase: "complete".into(),
                action: "submit_step_1".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(EngineError::LLMProvider("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(EngineError::Database("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
