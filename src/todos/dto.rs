use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::query::{AssigneeFilter, BucketCounts, DeadlineBucket, SortKey, SortOrder};
use super::repo_types::Todo;
use crate::{teams::repo_types::TeamSummary, users::repo_types::UserSummary};

/// A todo in its full nested shape.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoDetails {
    #[serde(flatten)]
    pub todo: Todo,
    pub created_by: UserSummary,
    pub assigned_to: Vec<UserSummary>,
    pub team: Option<TeamSummary>,
}

impl AsRef<Todo> for TodoDetails {
    fn as_ref(&self) -> &Todo {
        &self.todo
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTodoRequest {
    pub text: String,
    #[serde(default)]
    pub team_id: Option<Uuid>,
    #[serde(default)]
    pub assigned_to: Option<Vec<Uuid>>,
    #[serde(default)]
    pub deadline: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTodoRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    /// Absent leaves the deadline alone; `null` clears it.
    #[serde(default, deserialize_with = "crate::dto::present")]
    pub deadline: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoListQuery {
    pub team_id: Option<Uuid>,
    pub completed: Option<bool>,
    #[serde(default)]
    pub deadline: DeadlineBucket,
    #[serde(default)]
    pub assignee: AssigneeFilter,
    #[serde(default)]
    pub sort: SortKey,
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Serialize)]
pub struct TodoListResponse {
    pub todos: Vec<TodoDetails>,
    pub counts: BucketCounts,
}
