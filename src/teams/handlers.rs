use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{CreateTeamRequest, InviteRequest, InviteResponse, TeamDetails, TeamListItem, UpdateTeamRequest},
    repo_types::Team,
    services,
};
use crate::{
    auth::Actor,
    dto::MessageResponse,
    error::ApiResult,
    extract::{ApiJson, ApiPath},
    state::AppState,
};

pub fn team_routes() -> Router<AppState> {
    Router::new()
        .route("/teams", get(list_teams).post(create_team))
        .route(
            "/teams/:id",
            get(get_team).put(update_team).delete(delete_team),
        )
        .route("/teams/:id/invite", post(invite_member))
}

#[instrument(skip(state))]
pub async fn list_teams(
    State(state): State<AppState>,
    actor: Actor,
) -> ApiResult<Json<Vec<TeamListItem>>> {
    let teams = services::list_teams(&state, actor).await?;
    Ok(Json(teams))
}

#[instrument(skip(state, payload))]
pub async fn create_team(
    State(state): State<AppState>,
    actor: Actor,
    ApiJson(payload): ApiJson<CreateTeamRequest>,
) -> ApiResult<Json<Team>> {
    let team = services::create_team(&state, actor, payload).await?;
    Ok(Json(team))
}

#[instrument(skip(state))]
pub async fn get_team(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<TeamDetails>> {
    let team = services::get_team(&state, actor, id).await?;
    Ok(Json(team))
}

#[instrument(skip(state, payload))]
pub async fn update_team(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateTeamRequest>,
) -> ApiResult<Json<Team>> {
    let team = services::update_team(&state, actor, id, payload).await?;
    Ok(Json(team))
}

#[instrument(skip(state))]
pub async fn delete_team(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    services::delete_team(&state, actor, id).await?;
    Ok(Json(MessageResponse::new("Team deleted successfully")))
}

/// POST /teams/:id/invite { email }
#[instrument(skip(state, payload))]
pub async fn invite_member(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<InviteRequest>,
) -> ApiResult<Json<InviteResponse>> {
    let member = services::invite_member(&state, actor, id, payload).await?;
    Ok(Json(InviteResponse {
        message: "User invited to the team".into(),
        member,
    }))
}
