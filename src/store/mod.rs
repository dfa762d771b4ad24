//! The persistent-store seam. Handlers only ever talk to `dyn Store`; the
//! PostgreSQL implementation backs the running service and the in-memory one
//! backs tests and `AppState::fake()`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    teams::repo_types::{Role, Team, TeamMember, TeamPatch},
    todos::repo_types::{NewTodo, Todo, TodoAssignment, TodoPatch, TodoSelection},
    users::repo_types::{NewUser, User, UserPatch},
};

pub use memory::{FailPoint, MemoryStore};
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    // ---- users ----
    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    /// Returns the user with `new.email`, creating it first if absent.
    async fn upsert_user(&self, new: &NewUser) -> anyhow::Result<User>;
    async fn update_user(&self, id: Uuid, patch: &UserPatch) -> anyhow::Result<Option<User>>;
    async fn users_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<User>>;

    // ---- teams ----
    async fn find_team(&self, id: Uuid) -> anyhow::Result<Option<Team>>;
    async fn teams_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<Team>>;
    async fn teams_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Team>>;
    async fn update_team(&self, id: Uuid, patch: &TeamPatch) -> anyhow::Result<Option<Team>>;
    /// Deletes the team with its memberships and todos.
    async fn delete_team(&self, id: Uuid) -> anyhow::Result<bool>;
    async fn find_membership(
        &self,
        team_id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Option<TeamMember>>;
    async fn memberships_of_user(&self, user_id: Uuid) -> anyhow::Result<Vec<TeamMember>>;
    async fn members_of_teams(&self, team_ids: &[Uuid]) -> anyhow::Result<Vec<TeamMember>>;
    /// Inserts a membership; `None` if the pair already exists.
    async fn add_member(
        &self,
        team_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> anyhow::Result<Option<TeamMember>>;
    async fn count_todos_by_team(&self, team_ids: &[Uuid]) -> anyhow::Result<Vec<(Uuid, i64)>>;

    // ---- todos ----
    async fn find_todo(&self, id: Uuid) -> anyhow::Result<Option<Todo>>;
    async fn list_todos(
        &self,
        selection: TodoSelection,
        completed: Option<bool>,
    ) -> anyhow::Result<Vec<Todo>>;
    async fn update_todo(&self, id: Uuid, patch: &TodoPatch) -> anyhow::Result<Option<Todo>>;
    /// Deletes the todo with its assignments.
    async fn delete_todo(&self, id: Uuid) -> anyhow::Result<bool>;
    async fn assignments_for_todos(&self, todo_ids: &[Uuid])
        -> anyhow::Result<Vec<TodoAssignment>>;

    /// Opens a transaction. Dropping the handle without `commit` rolls back.
    async fn begin(&self) -> anyhow::Result<Box<dyn StoreTx>>;
}

/// Writes that must land together.
#[async_trait]
pub trait StoreTx: Send {
    async fn insert_team(&mut self, name: &str, description: Option<&str>)
        -> anyhow::Result<Team>;
    async fn insert_member(
        &mut self,
        team_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> anyhow::Result<TeamMember>;
    async fn insert_todo(&mut self, new: &NewTodo) -> anyhow::Result<Todo>;
    async fn clear_assignments(&mut self, todo_id: Uuid) -> anyhow::Result<()>;
    async fn insert_assignments(&mut self, todo_id: Uuid, user_ids: &[Uuid])
        -> anyhow::Result<()>;
    async fn commit(self: Box<Self>) -> anyhow::Result<()>;
}
