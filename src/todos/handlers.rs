use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{AssignRequest, CreateTodoRequest, TodoDetails, TodoListQuery, TodoListResponse, UpdateTodoRequest},
    services,
};
use crate::{
    auth::Actor,
    dto::MessageResponse,
    error::ApiResult,
    extract::{ApiJson, ApiPath, ApiQuery},
    state::AppState,
};

pub fn todo_routes() -> Router<AppState> {
    Router::new()
        .route("/todos", get(list_todos).post(create_todo))
        .route(
            "/todos/:id",
            get(get_todo).put(update_todo).delete(delete_todo),
        )
        .route("/todos/:id/assign", post(assign_todo))
}

/// GET /todos?teamId=&completed=&deadline=&assignee=&sort=&order=
#[instrument(skip(state))]
pub async fn list_todos(
    State(state): State<AppState>,
    actor: Actor,
    ApiQuery(q): ApiQuery<TodoListQuery>,
) -> ApiResult<Json<TodoListResponse>> {
    let res = services::list_todos(&state, actor, q, OffsetDateTime::now_utc()).await?;
    Ok(Json(res))
}

#[instrument(skip(state, payload))]
pub async fn create_todo(
    State(state): State<AppState>,
    actor: Actor,
    ApiJson(payload): ApiJson<CreateTodoRequest>,
) -> ApiResult<Json<TodoDetails>> {
    let todo = services::create_todo(&state, actor, payload).await?;
    Ok(Json(todo))
}

#[instrument(skip(state))]
pub async fn get_todo(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<TodoDetails>> {
    let todo = services::get_todo(&state, actor, id).await?;
    Ok(Json(todo))
}

#[instrument(skip(state, payload))]
pub async fn update_todo(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateTodoRequest>,
) -> ApiResult<Json<TodoDetails>> {
    let todo = services::update_todo(&state, actor, id, payload).await?;
    Ok(Json(todo))
}

#[instrument(skip(state))]
pub async fn delete_todo(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    services::delete_todo(&state, actor, id).await?;
    Ok(Json(MessageResponse::new("Todo deleted successfully")))
}

/// POST /todos/:id/assign { userIds } replaces the assignee set.
#[instrument(skip(state, payload))]
pub async fn assign_todo(
    State(state): State<AppState>,
    actor: Actor,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<AssignRequest>,
) -> ApiResult<Json<TodoDetails>> {
    let todo = services::assign_todo(&state, actor, id, payload).await?;
    Ok(Json(todo))
}
