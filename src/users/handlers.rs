use axum::{extract::State, routing::get, Json, Router};
use tracing::instrument;

use super::{
    dto::{MeResponse, UpdateMeRequest},
    repo_types::User,
    services,
};
use crate::{auth::Actor, error::ApiResult, extract::ApiJson, state::AppState};

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/users/me", get(get_me).put(update_me))
}

#[instrument(skip(state))]
pub async fn get_me(State(state): State<AppState>, actor: Actor) -> ApiResult<Json<MeResponse>> {
    let me = services::get_me(&state, actor).await?;
    Ok(Json(me))
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    actor: Actor,
    ApiJson(payload): ApiJson<UpdateMeRequest>,
) -> ApiResult<Json<User>> {
    let user = services::update_me(&state, actor, payload).await?;
    Ok(Json(user))
}
