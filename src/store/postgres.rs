use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{Store, StoreTx};
use crate::{
    teams::repo_types::{Role, Team, TeamMember, TeamPatch},
    todos::repo_types::{NewTodo, Todo, TodoAssignment, TodoPatch, TodoSelection},
    users::repo_types::{NewUser, User, UserPatch},
};

const USER_COLS: &str = "id, email, name, image, created_at";
const TEAM_COLS: &str = "id, name, description, created_at, updated_at";
const MEMBER_COLS: &str = "team_id, user_id, role, joined_at";
const TODO_COLS: &str =
    "id, text, completed, deadline, created_by_id, team_id, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find user")?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_optional(&self.db)
                .await
                .context("find user by email")?;
        Ok(user)
    }

    async fn upsert_user(&self, new: &NewUser) -> anyhow::Result<User> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, name, image)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
            RETURNING {USER_COLS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(&new.name)
        .bind(&new.image)
        .fetch_one(&self.db)
        .await
        .context("upsert user")?;
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, patch: &UserPatch) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   image = COALESCE($3, image)
             WHERE id = $1
            RETURNING {USER_COLS}
            "#
        ))
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.image)
        .fetch_optional(&self.db)
        .await
        .context("update user")?;
        Ok(user)
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<User>> {
        let rows =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE id = ANY($1)"))
                .bind(ids)
                .fetch_all(&self.db)
                .await
                .context("users by ids")?;
        Ok(rows)
    }

    async fn find_team(&self, id: Uuid) -> anyhow::Result<Option<Team>> {
        let team = sqlx::query_as::<_, Team>(&format!("SELECT {TEAM_COLS} FROM teams WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find team")?;
        Ok(team)
    }

    async fn teams_by_ids(&self, ids: &[Uuid]) -> anyhow::Result<Vec<Team>> {
        let rows =
            sqlx::query_as::<_, Team>(&format!("SELECT {TEAM_COLS} FROM teams WHERE id = ANY($1)"))
                .bind(ids)
                .fetch_all(&self.db)
                .await
                .context("teams by ids")?;
        Ok(rows)
    }

    async fn teams_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Team>> {
        let rows = sqlx::query_as::<_, Team>(
            r#"
            SELECT t.id, t.name, t.description, t.created_at, t.updated_at
              FROM teams t
              JOIN team_members m ON m.team_id = t.id
             WHERE m.user_id = $1
             ORDER BY t.created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("teams for user")?;
        Ok(rows)
    }

    async fn update_team(&self, id: Uuid, patch: &TeamPatch) -> anyhow::Result<Option<Team>> {
        let team = sqlx::query_as::<_, Team>(&format!(
            r#"
            UPDATE teams
               SET name = COALESCE($2, name),
                   description = CASE WHEN $3 THEN $4 ELSE description END,
                   updated_at = now()
             WHERE id = $1
            RETURNING {TEAM_COLS}
            "#
        ))
        .bind(id)
        .bind(&patch.name)
        .bind(patch.description.is_some())
        .bind(patch.description.clone().flatten())
        .fetch_optional(&self.db)
        .await
        .context("update team")?;
        Ok(team)
    }

    async fn delete_team(&self, id: Uuid) -> anyhow::Result<bool> {
        // team_members and todos (and through them todo_assignments) cascade.
        let res = sqlx::query("DELETE FROM teams WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete team")?;
        Ok(res.rows_affected() > 0)
    }

    async fn find_membership(
        &self,
        team_id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Option<TeamMember>> {
        let row = sqlx::query_as::<_, TeamMember>(&format!(
            "SELECT {MEMBER_COLS} FROM team_members WHERE team_id = $1 AND user_id = $2"
        ))
        .bind(team_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("find membership")?;
        Ok(row)
    }

    async fn memberships_of_user(&self, user_id: Uuid) -> anyhow::Result<Vec<TeamMember>> {
        let rows = sqlx::query_as::<_, TeamMember>(&format!(
            "SELECT {MEMBER_COLS} FROM team_members WHERE user_id = $1 ORDER BY joined_at ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("memberships of user")?;
        Ok(rows)
    }

    async fn members_of_teams(&self, team_ids: &[Uuid]) -> anyhow::Result<Vec<TeamMember>> {
        let rows = sqlx::query_as::<_, TeamMember>(&format!(
            "SELECT {MEMBER_COLS} FROM team_members WHERE team_id = ANY($1) ORDER BY joined_at ASC"
        ))
        .bind(team_ids)
        .fetch_all(&self.db)
        .await
        .context("members of teams")?;
        Ok(rows)
    }

    async fn add_member(
        &self,
        team_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> anyhow::Result<Option<TeamMember>> {
        let row = sqlx::query_as::<_, TeamMember>(&format!(
            r#"
            INSERT INTO team_members (team_id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (team_id, user_id) DO NOTHING
            RETURNING {MEMBER_COLS}
            "#
        ))
        .bind(team_id)
        .bind(user_id)
        .bind(role)
        .fetch_optional(&self.db)
        .await
        .context("add member")?;
        Ok(row)
    }

    async fn count_todos_by_team(&self, team_ids: &[Uuid]) -> anyhow::Result<Vec<(Uuid, i64)>> {
        let rows = sqlx::query_as::<_, (Uuid, i64)>(
            r#"
            SELECT team_id, COUNT(*)
              FROM todos
             WHERE team_id = ANY($1)
             GROUP BY team_id
            "#,
        )
        .bind(team_ids)
        .fetch_all(&self.db)
        .await
        .context("count todos by team")?;
        Ok(rows)
    }

    async fn find_todo(&self, id: Uuid) -> anyhow::Result<Option<Todo>> {
        let todo = sqlx::query_as::<_, Todo>(&format!("SELECT {TODO_COLS} FROM todos WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find todo")?;
        Ok(todo)
    }

    async fn list_todos(
        &self,
        selection: TodoSelection,
        completed: Option<bool>,
    ) -> anyhow::Result<Vec<Todo>> {
        let (scope, subject) = match selection {
            TodoSelection::Team(team_id) => ("t.team_id = $1", team_id),
            TodoSelection::Involving(user_id) => (
                r#"(t.created_by_id = $1
                    OR EXISTS (SELECT 1 FROM todo_assignments a
                                WHERE a.todo_id = t.id AND a.user_id = $1))"#,
                user_id,
            ),
        };
        let rows = sqlx::query_as::<_, Todo>(&format!(
            r#"
            SELECT t.id, t.text, t.completed, t.deadline, t.created_by_id, t.team_id,
                   t.created_at, t.updated_at
              FROM todos t
             WHERE {scope}
               AND ($2::boolean IS NULL OR t.completed = $2)
             ORDER BY t.completed ASC, t.deadline ASC NULLS LAST, t.created_at DESC
            "#
        ))
        .bind(subject)
        .bind(completed)
        .fetch_all(&self.db)
        .await
        .context("list todos")?;
        Ok(rows)
    }

    async fn update_todo(&self, id: Uuid, patch: &TodoPatch) -> anyhow::Result<Option<Todo>> {
        let todo = sqlx::query_as::<_, Todo>(&format!(
            r#"
            UPDATE todos
               SET text = COALESCE($2, text),
                   completed = COALESCE($3, completed),
                   deadline = CASE WHEN $4 THEN $5 ELSE deadline END,
                   updated_at = now()
             WHERE id = $1
            RETURNING {TODO_COLS}
            "#
        ))
        .bind(id)
        .bind(&patch.text)
        .bind(patch.completed)
        .bind(patch.deadline.is_some())
        .bind(patch.deadline.flatten())
        .fetch_optional(&self.db)
        .await
        .context("update todo")?;
        Ok(todo)
    }

    async fn delete_todo(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM todos WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete todo")?;
        Ok(res.rows_affected() > 0)
    }

    async fn assignments_for_todos(
        &self,
        todo_ids: &[Uuid],
    ) -> anyhow::Result<Vec<TodoAssignment>> {
        let rows = sqlx::query_as::<_, TodoAssignment>(
            r#"
            SELECT todo_id, user_id
              FROM todo_assignments
             WHERE todo_id = ANY($1)
             ORDER BY assigned_at ASC
            "#,
        )
        .bind(todo_ids)
        .fetch_all(&self.db)
        .await
        .context("assignments for todos")?;
        Ok(rows)
    }

    async fn begin(&self) -> anyhow::Result<Box<dyn StoreTx>> {
        let tx = self.db.begin().await.context("begin tx")?;
        Ok(Box::new(PgTx { tx }))
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn insert_team(
        &mut self,
        name: &str,
        description: Option<&str>,
    ) -> anyhow::Result<Team> {
        let team = sqlx::query_as::<_, Team>(&format!(
            r#"
            INSERT INTO teams (id, name, description)
            VALUES ($1, $2, $3)
            RETURNING {TEAM_COLS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .fetch_one(&mut *self.tx)
        .await
        .context("insert team")?;
        Ok(team)
    }

    async fn insert_member(
        &mut self,
        team_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> anyhow::Result<TeamMember> {
        let member = sqlx::query_as::<_, TeamMember>(&format!(
            r#"
            INSERT INTO team_members (team_id, user_id, role)
            VALUES ($1, $2, $3)
            RETURNING {MEMBER_COLS}
            "#
        ))
        .bind(team_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(&mut *self.tx)
        .await
        .context("insert member")?;
        Ok(member)
    }

    async fn insert_todo(&mut self, new: &NewTodo) -> anyhow::Result<Todo> {
        let todo = sqlx::query_as::<_, Todo>(&format!(
            r#"
            INSERT INTO todos (id, text, deadline, created_by_id, team_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {TODO_COLS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.text)
        .bind(new.deadline)
        .bind(new.created_by_id)
        .bind(new.team_id)
        .fetch_one(&mut *self.tx)
        .await
        .context("insert todo")?;
        Ok(todo)
    }

    async fn clear_assignments(&mut self, todo_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM todo_assignments WHERE todo_id = $1")
            .bind(todo_id)
            .execute(&mut *self.tx)
            .await
            .context("clear assignments")?;
        Ok(())
    }

    async fn insert_assignments(
        &mut self,
        todo_id: Uuid,
        user_ids: &[Uuid],
    ) -> anyhow::Result<()> {
        if user_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r#"
            INSERT INTO todo_assignments (todo_id, user_id)
            SELECT $1, u FROM unnest($2::uuid[]) AS u
            ON CONFLICT (todo_id, user_id) DO NOTHING
            "#,
        )
        .bind(todo_id)
        .bind(user_ids)
        .execute(&mut *self.tx)
        .await
        .context("insert assignments")?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        self.tx.commit().await.context("commit tx")?;
        Ok(())
    }
}
