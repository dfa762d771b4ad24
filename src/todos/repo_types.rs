use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: Uuid,
    pub text: String,
    pub completed: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deadline: Option<OffsetDateTime>,
    pub created_by_id: Uuid,
    pub team_id: Option<Uuid>, // None = personal todo
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl AsRef<Todo> for Todo {
    fn as_ref(&self) -> &Todo {
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TodoAssignment {
    pub todo_id: Uuid,
    pub user_id: Uuid,
}

/// Which rows `Store::list_todos` selects before any in-process filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodoSelection {
    /// Every todo scoped to the team.
    Team(Uuid),
    /// Todos the user created or is assigned to, personal and team alike.
    Involving(Uuid),
}

/// Field update for a todo. `deadline: Some(None)` clears the deadline.
#[derive(Debug, Clone, Default)]
pub struct TodoPatch {
    pub text: Option<String>,
    pub completed: Option<bool>,
    pub deadline: Option<Option<OffsetDateTime>>,
}

#[derive(Debug, Clone)]
pub struct NewTodo {
    pub text: String,
    pub deadline: Option<OffsetDateTime>,
    pub created_by_id: Uuid,
    pub team_id: Option<Uuid>,
}
