use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, put},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::keys::{ApiKeyStore, AuthUser};
use super::storage::{MoodStore, StoreError};
use crate::models::MoodLogEntry;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    api_keys: Arc<ApiKeyStore>,
    store: MoodStore,
}

impl AppState {
    pub fn new(api_keys: ApiKeyStore, store: MoodStore) -> Self {
        Self {
            api_keys: Arc::new(api_keys),
            store,
        }
    }
}

/// JSON error body
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error,
            message: message.into(),
        }
    }

    fn unauthorized(error: &'static str, message: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error, message)
    }

    fn forbidden() -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            "forbidden",
            "API key does not belong to this user",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.error,
                message: self.message,
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => ApiError::new(StatusCode::CONFLICT, "conflict", e.to_string()),
            StoreError::Database(e) => {
                tracing::error!("Storage error: {}", e);
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "Could not access mood storage",
                )
            }
        }
    }
}

/// Authentication middleware
async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) if h.starts_with("Bearer ") => &h[7..],
        Some(_) => {
            return ApiError::unauthorized(
                "invalid_auth",
                "Authorization header must use Bearer scheme",
            )
            .into_response();
        }
        None => {
            return ApiError::unauthorized("missing_auth", "Authorization header required")
                .into_response();
        }
    };

    match state.api_keys.validate(api_key) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => ApiError::unauthorized("invalid_key", "Invalid API key").into_response(),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Idempotent upsert keyed by the client-generated id.
async fn put_mood(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(entry): Json<MoodLogEntry>,
) -> Result<StatusCode, ApiError> {
    if entry.id != id {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "id_mismatch",
            format!("Body id {} does not match path id {}", entry.id, id),
        ));
    }
    if entry.user_id != user.user_id {
        return Err(ApiError::forbidden());
    }
    entry.validate().map_err(|e| {
        ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_entry", e.to_string())
    })?;

    state.store.upsert(&entry).await?;
    tracing::info!(%id, user_id = %user.user_id, date = %entry.date, "mood stored");

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct TodayQuery {
    user_id: String,
    date: NaiveDate,
}

async fn get_today(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TodayQuery>,
) -> Result<Json<MoodLogEntry>, ApiError> {
    if query.user_id != user.user_id {
        return Err(ApiError::forbidden());
    }

    match state.store.latest_for(&query.user_id, query.date).await? {
        Some(entry) => Ok(Json(entry)),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("No mood logged for {}", query.date),
        )),
    }
}

/// Builds the server's router: `/health` is public, `/moods/*` needs a key.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        .route("/moods/today", get(get_today))
        .route("/moods/{id}", put(put_mood))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
