use axum::{extract::State, routing::post, Json, Router};
use tracing::instrument;

use super::{
    dto::{AuthResponse, RefreshRequest, SessionRequest},
    services,
};
use crate::{error::ApiResult, extract::ApiJson, state::AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/session", post(create_session))
        .route("/auth/refresh", post(refresh))
}

/// POST /auth/session { idToken }
#[instrument(skip(state, payload))]
pub async fn create_session(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<SessionRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let res = services::exchange_id_token(&state, &payload.id_token).await?;
    Ok(Json(res))
}

/// POST /auth/refresh { refreshToken }
#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let res = services::refresh_session(&state, &payload.refresh_token).await?;
    Ok(Json(res))
}
