use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreTx};
use crate::{
    teams::repo_types::{Role, Team, TeamMember, TeamPatch},
    todos::repo_types::{NewTodo, Todo, TodoAssignment, TodoPatch, TodoSelection},
    users::repo_types::{NewUser, User, UserPatch},
};

/// A transaction step that can be made to fail, for exercising rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    InsertMember,
    InsertAssignments,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: Vec<User>,
    teams: Vec<Team>,
    members: Vec<TeamMember>,
    todos: Vec<Todo>,
    assignments: Vec<TodoAssignment>,
}

impl Tables {
    fn remove_todos_where(&mut self, pred: impl Fn(&Todo) -> bool) {
        let doomed: Vec<Uuid> = self
            .todos
            .iter()
            .filter(|todo| pred(*todo))
            .map(|todo| todo.id)
            .collect();
        self.todos.retain(|t| !doomed.contains(&t.id));
        self.assignments.retain(|a| !doomed.contains(&a.todo_id));
    }
}

/// Process-local store. Transactions hold the table lock for their whole
/// lifetime and work on a copy that replaces the tables on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_point: Option<FailPoint>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fail_point(fail_point: FailPoint) -> Self {
        Self {
            fail_point: Some(fail_point),
            ..Self::default()
        }
    }

    /// Number of teams, for asserting on rollback.
    pub async fn team_count(&self) -> usize {
        self.tables.lock().await.teams.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn upsert_user(&self, new: &NewUser) -> anyhow::Result<User> {
        let mut t = self.tables.lock().await;
        if let Some(existing) = t.users.iter().find(|u| u.email == new.email) {
            return Ok(existing.clone());
        }
        let user = User {
            id: Uuid::new_v4(),
            email: new.email.clone(),
            name: new.name.clone(),
            image: new.image.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, patch: &UserPatch) -> anyhow::Result<Option<User>> {
        let mut t = self.tables.lock().await;
        let Some(user) = t.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(name) = &patch.name {
            user.name = Some(name.clone());
        }
        if let Some(image) = &patch.image {
            user.image = Some(image.clone());
        }
        Ok(Some(user.clone()))
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.iter().filter(|u| ids.contains(&u.id)).cloned().collect())
    }

    async fn find_team(&self, id: Uuid) -> anyhow::Result<Option<Team>> {
        let t = self.tables.lock().await;
        Ok(t.teams.iter().find(|team| team.id == id).cloned())
    }

    async fn teams_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<Team>> {
        let t = self.tables.lock().await;
        Ok(t.teams.iter().filter(|team| ids.contains(&team.id)).cloned().collect())
    }

    async fn teams_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Team>> {
        let t = self.tables.lock().await;
        Ok(t.teams
            .iter()
            .filter(|team| {
                t.members
                    .iter()
                    .any(|m| m.team_id == team.id && m.user_id == user_id)
            })
            .cloned()
            .collect())
    }

    async fn update_team(&self, id: Uuid, patch: &TeamPatch) -> anyhow::Result<Option<Team>> {
        let mut t = self.tables.lock().await;
        let Some(team) = t.teams.iter_mut().find(|team| team.id == id) else {
            return Ok(None);
        };
        if let Some(name) = &patch.name {
            team.name = name.clone();
        }
        if let Some(description) = &patch.description {
            team.description = description.clone();
        }
        team.updated_at = OffsetDateTime::now_utc();
        Ok(Some(team.clone()))
    }

    async fn delete_team(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut t = self.tables.lock().await;
        let before = t.teams.len();
        t.teams.retain(|team| team.id != id);
        if t.teams.len() == before {
            return Ok(false);
        }
        t.members.retain(|m| m.team_id != id);
        t.remove_todos_where(|todo| todo.team_id == Some(id));
        Ok(true)
    }

    async fn find_membership(
        &self,
        team_id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Option<TeamMember>> {
        let t = self.tables.lock().await;
        Ok(t.members
            .iter()
            .find(|m| m.team_id == team_id && m.user_id == user_id)
            .cloned())
    }

    async fn memberships_of_user(&self, user_id: Uuid) -> anyhow::Result<Vec<TeamMember>> {
        let t = self.tables.lock().await;
        Ok(t.members.iter().filter(|m| m.user_id == user_id).cloned().collect())
    }

    async fn members_of_teams(&self, team_ids: &[Uuid]) -> anyhow::Result<Vec<TeamMember>> {
        let t = self.tables.lock().await;
        Ok(t.members
            .iter()
            .filter(|m| team_ids.contains(&m.team_id))
            .cloned()
            .collect())
    }

    async fn add_member(
        &self,
        team_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> anyhow::Result<Option<TeamMember>> {
        let mut t = self.tables.lock().await;
        if t.members
            .iter()
            .any(|m| m.team_id == team_id && m.user_id == user_id)
        {
            return Ok(None);
        }
        let member = push_member(&mut t, team_id, user_id, role)?;
        Ok(Some(member))
    }

    async fn count_todos_by_team(&self, team_ids: &[Uuid]) -> anyhow::Result<Vec<(Uuid, i64)>> {
        let t = self.tables.lock().await;
        Ok(team_ids
            .iter()
            .map(|id| {
                let n = t.todos.iter().filter(|todo| todo.team_id == Some(*id)).count();
                (*id, n as i64)
            })
            .filter(|(_, n)| *n > 0)
            .collect())
    }

    async fn find_todo(&self, id: Uuid) -> anyhow::Result<Option<Todo>> {
        let t = self.tables.lock().await;
        Ok(t.todos.iter().find(|todo| todo.id == id).cloned())
    }

    async fn list_todos(
        &self,
        selection: TodoSelection,
        completed: Option<bool>,
    ) -> anyhow::Result<Vec<Todo>> {
        let t = self.tables.lock().await;
        Ok(t.todos
            .iter()
            .filter(|todo| match selection {
                TodoSelection::Team(team_id) => todo.team_id == Some(team_id),
                TodoSelection::Involving(user_id) => {
                    todo.created_by_id == user_id
                        || t.assignments
                            .iter()
                            .any(|a| a.todo_id == todo.id && a.user_id == user_id)
                }
            })
            .filter(|todo| completed.map_or(true, |c| todo.completed == c))
            .cloned()
            .collect())
    }

    async fn update_todo(&self, id: Uuid, patch: &TodoPatch) -> anyhow::Result<Option<Todo>> {
        let mut t = self.tables.lock().await;
        let Some(todo) = t.todos.iter_mut().find(|todo| todo.id == id) else {
            return Ok(None);
        };
        if let Some(text) = &patch.text {
            todo.text = text.clone();
        }
        if let Some(completed) = patch.completed {
            todo.completed = completed;
        }
        if let Some(deadline) = patch.deadline {
            todo.deadline = deadline;
        }
        todo.updated_at = OffsetDateTime::now_utc();
        Ok(Some(todo.clone()))
    }

    async fn delete_todo(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut t = self.tables.lock().await;
        let existed = t.todos.iter().any(|todo| todo.id == id);
        t.remove_todos_where(|todo| todo.id == id);
        Ok(existed)
    }

    async fn assignments_for_todos(
        &self,
        todo_ids: &[Uuid],
    ) -> anyhow::Result<Vec<TodoAssignment>> {
        let t = self.tables.lock().await;
        Ok(t.assignments
            .iter()
            .filter(|a| todo_ids.contains(&a.todo_id))
            .cloned()
            .collect())
    }

    async fn begin(&self) -> anyhow::Result<Box<dyn StoreTx>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            fail_point: self.fail_point,
        }))
    }
}

fn push_member(
    t: &mut Tables,
    team_id: Uuid,
    user_id: Uuid,
    role: Role,
) -> anyhow::Result<TeamMember> {
    anyhow::ensure!(
        t.teams.iter().any(|team| team.id == team_id),
        "team {team_id} does not exist"
    );
    anyhow::ensure!(
        t.users.iter().any(|u| u.id == user_id),
        "user {user_id} does not exist"
    );
    let member = TeamMember {
        team_id,
        user_id,
        role,
        joined_at: OffsetDateTime::now_utc(),
    };
    t.members.push(member.clone());
    Ok(member)
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    fail_point: Option<FailPoint>,
}

impl MemoryTx {
    fn trip(&self, point: FailPoint) -> anyhow::Result<()> {
        if self.fail_point == Some(point) {
            anyhow::bail!("injected failure at {point:?}");
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_team(
        &mut self,
        name: &str,
        description: Option<&str>,
    ) -> anyhow::Result<Team> {
        let now = OffsetDateTime::now_utc();
        let team = Team {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        self.working.teams.push(team.clone());
        Ok(team)
    }

    async fn insert_member(
        &mut self,
        team_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> anyhow::Result<TeamMember> {
        self.trip(FailPoint::InsertMember)?;
        anyhow::ensure!(
            !self
                .working
                .members
                .iter()
                .any(|m| m.team_id == team_id && m.user_id == user_id),
            "duplicate membership"
        );
        push_member(&mut self.working, team_id, user_id, role)
    }

    async fn insert_todo(&mut self, new: &NewTodo) -> anyhow::Result<Todo> {
        let now = OffsetDateTime::now_utc();
        let todo = Todo {
            id: Uuid::new_v4(),
            text: new.text.clone(),
            completed: false,
            deadline: new.deadline,
            created_by_id: new.created_by_id,
            team_id: new.team_id,
            created_at: now,
            updated_at: now,
        };
        self.working.todos.push(todo.clone());
        Ok(todo)
    }

    async fn clear_assignments(&mut self, todo_id: Uuid) -> anyhow::Result<()> {
        self.working.assignments.retain(|a| a.todo_id != todo_id);
        Ok(())
    }

    async fn insert_assignments(
        &mut self,
        todo_id: Uuid,
        user_ids: &[Uuid],
    ) -> anyhow::Result<()> {
        self.trip(FailPoint::InsertAssignments)?;
        for user_id in user_ids {
            anyhow::ensure!(
                self.working.users.iter().any(|u| u.id == *user_id),
                "user {user_id} does not exist"
            );
            let exists = self
                .working
                .assignments
                .iter()
                .any(|a| a.todo_id == todo_id && a.user_id == *user_id);
            if !exists {
                self.working.assignments.push(TodoAssignment {
                    todo_id,
                    user_id: *user_id,
                });
            }
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        let MemoryTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_user(store: &MemoryStore, email: &str) -> User {
        store
            .upsert_user(&NewUser {
                email: email.into(),
                name: None,
                image: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_tables_untouched() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_team("Eng", None).await.unwrap();
        }
        assert_eq!(store.team_count().await, 0);
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = MemoryStore::new();
        let owner = seed_user(&store, "a@example.com").await;
        let mut tx = store.begin().await.unwrap();
        let team = tx.insert_team("Eng", Some("core")).await.unwrap();
        tx.insert_member(team.id, owner.id, Role::Owner).await.unwrap();
        tx.commit().await.unwrap();

        let member = store.find_membership(team.id, owner.id).await.unwrap();
        assert_eq!(member.map(|m| m.role), Some(Role::Owner));
    }

    #[tokio::test]
    async fn upsert_returns_existing_row_for_known_email() {
        let store = MemoryStore::new();
        let first = seed_user(&store, "a@example.com").await;
        let again = store
            .upsert_user(&NewUser {
                email: "a@example.com".into(),
                name: Some("Renamed".into()),
                image: None,
            })
            .await
            .unwrap();
        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn deleting_team_cascades_to_members_todos_and_assignments() {
        let store = MemoryStore::new();
        let owner = seed_user(&store, "a@example.com").await;
        let mut tx = store.begin().await.unwrap();
        let team = tx.insert_team("Eng", None).await.unwrap();
        tx.insert_member(team.id, owner.id, Role::Owner).await.unwrap();
        let todo = tx
            .insert_todo(&NewTodo {
                text: "ship".into(),
                deadline: None,
                created_by_id: owner.id,
                team_id: Some(team.id),
            })
            .await
            .unwrap();
        tx.insert_assignments(todo.id, &[owner.id]).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.delete_team(team.id).await.unwrap());
        assert!(store.find_todo(todo.id).await.unwrap().is_none());
        assert!(store.find_membership(team.id, owner.id).await.unwrap().is_none());
        assert!(store.assignments_for_todos(&[todo.id]).await.unwrap().is_empty());
    }
}
