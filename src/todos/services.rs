use std::collections::HashMap;

use anyhow::Context;
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
    UtcOffset,
};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{AssignRequest, CreateTodoRequest, TodoDetails, TodoListQuery, TodoListResponse, UpdateTodoRequest},
    query::{self, DayWindow, ListOptions},
    repo_types::{NewTodo, Todo, TodoPatch, TodoSelection},
};
use crate::{
    access::{self, TodoAccess},
    auth::{guard, Actor},
    error::{ApiError, ApiResult},
    state::AppState,
    teams::repo_types::TeamSummary,
    users::repo_types::UserSummary,
};

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates. A bare date means
/// midnight at `day_offset`, the same boundary the deadline buckets use.
pub(crate) fn parse_deadline(raw: &str, day_offset: UtcOffset) -> ApiResult<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(ts);
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map(|d| d.midnight().assume_offset(day_offset))
        .map_err(|_| ApiError::invalid(format!("Invalid deadline: {raw}")))
}

fn non_empty_text(text: &str) -> ApiResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ApiError::invalid("Todo text must not be empty"));
    }
    Ok(text.to_string())
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(*id);
        }
    }
    out
}

/// Team-scoped todos only take team members; personal todos take any
/// existing user.
async fn check_assignees(st: &AppState, team_id: Option<Uuid>, ids: &[Uuid]) -> ApiResult<()> {
    if ids.is_empty() {
        return Ok(());
    }
    match team_id {
        Some(team_id) => {
            let members: Vec<Uuid> = st
                .store
                .members_of_teams(&[team_id])
                .await?
                .into_iter()
                .map(|m| m.user_id)
                .collect();
            let outsiders = access::non_members(ids, &members);
            if !outsiders.is_empty() {
                warn!(%team_id, count = outsiders.len(), "assignees outside team");
                return Err(ApiError::AssigneesNotInTeam(outsiders));
            }
        }
        None => {
            let known: Vec<Uuid> = st
                .store
                .users_by_ids(ids)
                .await?
                .into_iter()
                .map(|u| u.id)
                .collect();
            let unknown = access::non_members(ids, &known);
            if !unknown.is_empty() {
                let list: Vec<String> = unknown.iter().map(Uuid::to_string).collect();
                return Err(ApiError::invalid(format!("Unknown users: {}", list.join(", "))));
            }
        }
    }
    Ok(())
}

/// Attaches creator, assignee and team summaries, keeping input order.
pub(crate) async fn hydrate(st: &AppState, todos: Vec<Todo>) -> ApiResult<Vec<TodoDetails>> {
    if todos.is_empty() {
        return Ok(Vec::new());
    }
    let todo_ids: Vec<Uuid> = todos.iter().map(|t| t.id).collect();
    let assignments = st.store.assignments_for_todos(&todo_ids).await?;

    let mut user_ids: Vec<Uuid> = todos.iter().map(|t| t.created_by_id).collect();
    user_ids.extend(assignments.iter().map(|a| a.user_id));
    let user_ids = dedup(&user_ids);
    let users: HashMap<Uuid, UserSummary> = st
        .store
        .users_by_ids(&user_ids)
        .await?
        .iter()
        .map(|u| (u.id, UserSummary::from(u)))
        .collect();

    let team_ids = dedup(&todos.iter().filter_map(|t| t.team_id).collect::<Vec<_>>());
    let teams: HashMap<Uuid, TeamSummary> = if team_ids.is_empty() {
        HashMap::new()
    } else {
        st.store
            .teams_by_ids(&team_ids)
            .await?
            .iter()
            .map(|t| (t.id, TeamSummary::from(t)))
            .collect()
    };

    let mut out = Vec::with_capacity(todos.len());
    for todo in todos {
        let created_by = users
            .get(&todo.created_by_id)
            .cloned()
            .with_context(|| format!("creator {} of todo {} missing", todo.created_by_id, todo.id))?;
        let assigned_to = assignments
            .iter()
            .filter(|a| a.todo_id == todo.id)
            .filter_map(|a| users.get(&a.user_id).cloned())
            .collect();
        let team = todo.team_id.and_then(|id| teams.get(&id).cloned());
        out.push(TodoDetails {
            todo,
            created_by,
            assigned_to,
            team,
        });
    }
    Ok(out)
}

async fn hydrate_one(st: &AppState, todo: Todo) -> ApiResult<TodoDetails> {
    hydrate(st, vec![todo])
        .await?
        .pop()
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("hydrate dropped a todo")))
}

async fn reload(st: &AppState, todo_id: Uuid) -> ApiResult<TodoDetails> {
    let todo = st
        .store
        .find_todo(todo_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Todo not found"))?;
    hydrate_one(st, todo).await
}

pub async fn list_todos(
    st: &AppState,
    actor: Actor,
    q: TodoListQuery,
    now: OffsetDateTime,
) -> ApiResult<TodoListResponse> {
    let selection = match q.team_id {
        Some(team_id) => {
            guard::require_membership(st, actor, team_id).await?;
            TodoSelection::Team(team_id)
        }
        None => TodoSelection::Involving(actor.0),
    };

    let selected = st.store.list_todos(selection, q.completed).await?;
    let day = DayWindow::containing(now, st.config.day_offset);
    let counts = query::count_buckets(&selected, &day);

    let details = hydrate(st, selected).await?;
    let opts = ListOptions {
        deadline: q.deadline,
        assignee: q.assignee,
        sort: q.sort,
        order: q.order,
    };
    let todos = query::apply(details, actor.0, opts, &day);
    Ok(TodoListResponse { todos, counts })
}

pub async fn create_todo(
    st: &AppState,
    actor: Actor,
    req: CreateTodoRequest,
) -> ApiResult<TodoDetails> {
    if let Some(team_id) = req.team_id {
        guard::require_membership(st, actor, team_id).await?;
    }

    let text = non_empty_text(&req.text)?;
    let deadline = req
        .deadline
        .as_deref()
        .map(|raw| parse_deadline(raw, st.config.day_offset))
        .transpose()?;
    let assignees = match req.assigned_to.as_deref() {
        Some(ids) if !ids.is_empty() => dedup(ids),
        _ => vec![actor.0],
    };
    check_assignees(st, req.team_id, &assignees).await?;

    let new = NewTodo {
        text,
        deadline,
        created_by_id: actor.0,
        team_id: req.team_id,
    };
    let mut tx = st.store.begin().await?;
    let todo = tx.insert_todo(&new).await?;
    tx.insert_assignments(todo.id, &assignees).await?;
    tx.commit().await?;

    info!(todo_id = %todo.id, user_id = %actor.0, team_id = ?todo.team_id, "todo created");
    hydrate_one(st, todo).await
}

pub async fn get_todo(st: &AppState, actor: Actor, todo_id: Uuid) -> ApiResult<TodoDetails> {
    let access = guard::todo_access(st, actor, todo_id).await?;
    guard::ensure(&access, actor, TodoAccess::can_view, "view")?;
    hydrate_one(st, access.todo).await
}

pub async fn update_todo(
    st: &AppState,
    actor: Actor,
    todo_id: Uuid,
    req: UpdateTodoRequest,
) -> ApiResult<TodoDetails> {
    let access = guard::todo_access(st, actor, todo_id).await?;
    guard::ensure(&access, actor, TodoAccess::can_update, "update")?;

    let patch = TodoPatch {
        text: req.text.as_deref().map(non_empty_text).transpose()?,
        completed: req.completed,
        deadline: match req.deadline {
            None => None,
            Some(None) => Some(None),
            Some(Some(raw)) => Some(Some(parse_deadline(&raw, st.config.day_offset)?)),
        },
    };

    let todo = st
        .store
        .update_todo(todo_id, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found("Todo not found"))?;
    info!(%todo_id, user_id = %actor.0, "todo updated");
    hydrate_one(st, todo).await
}

pub async fn delete_todo(st: &AppState, actor: Actor, todo_id: Uuid) -> ApiResult<()> {
    let access = guard::todo_access(st, actor, todo_id).await?;
    guard::ensure(&access, actor, TodoAccess::can_delete, "delete")?;

    if !st.store.delete_todo(todo_id).await? {
        return Err(ApiError::not_found("Todo not found"));
    }
    info!(%todo_id, user_id = %actor.0, "todo deleted");
    Ok(())
}

/// Replaces the whole assignment set. An empty list clears it.
pub async fn assign_todo(
    st: &AppState,
    actor: Actor,
    todo_id: Uuid,
    req: AssignRequest,
) -> ApiResult<TodoDetails> {
    let access = guard::todo_access(st, actor, todo_id).await?;
    guard::ensure(&access, actor, TodoAccess::can_assign, "assign users to")?;

    let user_ids = dedup(&req.user_ids);
    check_assignees(st, access.todo.team_id, &user_ids).await?;

    let mut tx = st.store.begin().await?;
    tx.clear_assignments(todo_id).await?;
    tx.insert_assignments(todo_id, &user_ids).await?;
    tx.commit().await?;

    info!(%todo_id, user_id = %actor.0, assignees = user_ids.len(), "assignments replaced");
    reload(st, todo_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FailPoint, MemoryStore};
    use crate::teams::{dto::CreateTeamRequest, services as teams};
    use crate::users::repo_types::{NewUser, User};
    use std::sync::Arc;
    use time::macros::datetime;
    use crate::config::AppConfig;

    async fn user(st: &AppState, email: &str) -> User {
        st.store
            .upsert_user(&NewUser {
                email: email.into(),
                name: Some(email.into()),
                image: None,
            })
            .await
            .unwrap()
    }

    async fn team_with(st: &AppState, owner: &User, members: &[&User]) -> Uuid {
        let team = teams::create_team(
            st,
            Actor(owner.id),
            CreateTeamRequest {
                name: "Eng".into(),
                description: None,
            },
        )
        .await
        .unwrap();
        for m in members {
            st.store
                .add_member(team.id, m.id, crate::teams::repo_types::Role::Member)
                .await
                .unwrap();
        }
        team.id
    }

    fn create(text: &str, team_id: Option<Uuid>, assigned_to: Option<Vec<Uuid>>) -> CreateTodoRequest {
        CreateTodoRequest {
            text: text.into(),
            team_id,
            assigned_to,
            deadline: None,
        }
    }

    #[test]
    fn parses_timestamps_and_plain_dates() {
        let minus_five = UtcOffset::from_hms(-5, 0, 0).unwrap();
        assert_eq!(
            parse_deadline("2026-10-20T09:30:00+09:00", minus_five).unwrap(),
            datetime!(2026-10-20 09:30 +9)
        );
        assert_eq!(
            parse_deadline("2026-10-20", UtcOffset::UTC).unwrap(),
            datetime!(2026-10-20 00:00 UTC)
        );
        assert_eq!(
            parse_deadline("2026-10-20", minus_five).unwrap(),
            datetime!(2026-10-20 00:00 -5)
        );
        assert!(matches!(
            parse_deadline("next friday", UtcOffset::UTC),
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn create_defaults_assignment_to_creator() {
        let st = AppState::fake();
        let b = user(&st, "b@example.com").await;
        let todo = create_todo(&st, Actor(b.id), create("write docs", None, None))
            .await
            .unwrap();
        assert_eq!(todo.created_by.id, b.id);
        let assignees: Vec<Uuid> = todo.assigned_to.iter().map(|u| u.id).collect();
        assert_eq!(assignees, vec![b.id]);
        assert!(todo.team.is_none());
    }

    #[tokio::test]
    async fn create_rejects_blank_text_and_bad_deadline() {
        let st = AppState::fake();
        let b = user(&st, "b@example.com").await;
        let err = create_todo(&st, Actor(b.id), create("   ", None, None))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        let mut req = create("ok", None, None);
        req.deadline = Some("tomorrow-ish".into());
        let err = create_todo(&st, Actor(b.id), req).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn create_in_team_requires_membership() {
        let st = AppState::fake();
        let a = user(&st, "a@example.com").await;
        let c = user(&st, "c@example.com").await;
        let team_id = team_with(&st, &a, &[]).await;
        let err = create_todo(&st, Actor(c.id), create("sneak", Some(team_id), None))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn personal_todo_is_private_to_creator() {
        let st = AppState::fake();
        let a = user(&st, "a@example.com").await;
        let b = user(&st, "b@example.com").await;
        let todo = create_todo(&st, Actor(b.id), create("write docs", None, None))
            .await
            .unwrap();
        let id = todo.todo.id;

        assert!(get_todo(&st, Actor(b.id), id).await.is_ok());
        for err in [
            get_todo(&st, Actor(a.id), id).await.unwrap_err(),
            update_todo(
                &st,
                Actor(a.id),
                id,
                UpdateTodoRequest {
                    text: None,
                    completed: Some(true),
                    deadline: None,
                },
            )
            .await
            .unwrap_err(),
            delete_todo(&st, Actor(a.id), id).await.unwrap_err(),
        ] {
            assert!(matches!(err, ApiError::Forbidden(_)));
        }
        delete_todo(&st, Actor(b.id), id).await.unwrap();
        let err = get_todo(&st, Actor(b.id), id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn team_todo_scenario() {
        let st = AppState::fake();
        let a = user(&st, "a@example.com").await;
        let b = user(&st, "b@example.com").await;
        let c = user(&st, "c@example.com").await;
        let team_id = team_with(&st, &a, &[&b]).await;

        let todo = create_todo(&st, Actor(a.id), create("ship", Some(team_id), Some(vec![a.id, b.id])))
            .await
            .unwrap();
        let id = todo.todo.id;
        assert_eq!(todo.team.as_ref().map(|t| t.id), Some(team_id));

        let updated = update_todo(
            &st,
            Actor(b.id),
            id,
            UpdateTodoRequest {
                text: Some("ship it".into()),
                completed: None,
                deadline: Some(Some("2026-10-25".into())),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.todo.text, "ship it");
        assert_eq!(updated.todo.deadline, Some(datetime!(2026-10-25 00:00 UTC)));

        let err = get_todo(&st, Actor(c.id), id).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        // Members can't delete others' team todos; owners can.
        let err = delete_todo(&st, Actor(b.id), id).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        delete_todo(&st, Actor(a.id), id).await.unwrap();
    }

    #[tokio::test]
    async fn null_deadline_clears_it() {
        let st = AppState::fake();
        let b = user(&st, "b@example.com").await;
        let mut req = create("dated", None, None);
        req.deadline = Some("2026-10-20".into());
        let todo = create_todo(&st, Actor(b.id), req).await.unwrap();
        assert!(todo.todo.deadline.is_some());

        let cleared = update_todo(
            &st,
            Actor(b.id),
            todo.todo.id,
            UpdateTodoRequest {
                text: None,
                completed: None,
                deadline: Some(None),
            },
        )
        .await
        .unwrap();
        assert_eq!(cleared.todo.deadline, None);
    }

    #[tokio::test]
    async fn assigning_outsiders_is_rejected_whole() {
        let st = AppState::fake();
        let a = user(&st, "a@example.com").await;
        let b = user(&st, "b@example.com").await;
        let c = user(&st, "c@example.com").await;
        let d = user(&st, "d@example.com").await;
        let team_id = team_with(&st, &a, &[&b]).await;
        let todo = create_todo(&st, Actor(a.id), create("ship", Some(team_id), None))
            .await
            .unwrap();

        let err = assign_todo(
            &st,
            Actor(a.id),
            todo.todo.id,
            AssignRequest {
                user_ids: vec![b.id, c.id, d.id],
            },
        )
        .await
        .unwrap_err();
        match err {
            ApiError::AssigneesNotInTeam(ids) => assert_eq!(ids, vec![c.id, d.id]),
            other => panic!("unexpected error: {other:?}"),
        }

        let unchanged = get_todo(&st, Actor(a.id), todo.todo.id).await.unwrap();
        let ids: Vec<Uuid> = unchanged.assigned_to.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![a.id]);
    }

    #[tokio::test]
    async fn assigning_empty_set_clears_assignees() {
        let st = AppState::fake();
        let b = user(&st, "b@example.com").await;
        let todo = create_todo(&st, Actor(b.id), create("solo", None, None))
            .await
            .unwrap();
        let cleared = assign_todo(&st, Actor(b.id), todo.todo.id, AssignRequest { user_ids: vec![] })
            .await
            .unwrap();
        assert!(cleared.assigned_to.is_empty());
    }

    #[tokio::test]
    async fn personal_todo_accepts_any_existing_user_but_not_unknown_ids() {
        let st = AppState::fake();
        let a = user(&st, "a@example.com").await;
        let b = user(&st, "b@example.com").await;
        let todo = create_todo(&st, Actor(b.id), create("solo", None, None))
            .await
            .unwrap();

        let res = assign_todo(&st, Actor(b.id), todo.todo.id, AssignRequest { user_ids: vec![a.id] })
            .await
            .unwrap();
        assert_eq!(res.assigned_to.len(), 1);
        // The assignee can now see it.
        assert!(get_todo(&st, Actor(a.id), todo.todo.id).await.is_ok());

        let err = assign_todo(
            &st,
            Actor(b.id),
            todo.todo.id,
            AssignRequest {
                user_ids: vec![Uuid::new_v4()],
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn failed_assignment_insert_surfaces_as_internal_error() {
        let store = MemoryStore::with_fail_point(FailPoint::InsertAssignments);
        let st = AppState::with_store(store);
        let b = user(&st, "b@example.com").await;

        // Seed directly; the create path would trip the same fail point.
        let mut tx = st.store.begin().await.unwrap();
        let todo = tx
            .insert_todo(&NewTodo {
                text: "solo".into(),
                deadline: None,
                created_by_id: b.id,
                team_id: None,
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let err = assign_todo(&st, Actor(b.id), todo.id, AssignRequest { user_ids: vec![b.id] })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
        assert!(st.store.find_todo(todo.id).await.unwrap().is_some());
        assert!(st.store.assignments_for_todos(&[todo.id]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_without_team_returns_created_and_assigned() {
        let st = AppState::fake();
        let a = user(&st, "a@example.com").await;
        let b = user(&st, "b@example.com").await;
        let team_id = team_with(&st, &a, &[&b]).await;

        create_todo(&st, Actor(b.id), create("mine", None, None)).await.unwrap();
        create_todo(&st, Actor(a.id), create("for b", Some(team_id), Some(vec![b.id])))
            .await
            .unwrap();
        create_todo(&st, Actor(a.id), create("not b", Some(team_id), Some(vec![a.id])))
            .await
            .unwrap();

        let now = OffsetDateTime::now_utc();
        let res = list_todos(&st, Actor(b.id), TodoListQuery::default(), now)
            .await
            .unwrap();
        let mut texts: Vec<&str> = res.todos.iter().map(|t| t.todo.text.as_str()).collect();
        texts.sort();
        assert_eq!(texts, ["for b", "mine"]);
        assert_eq!(res.counts.all, 2);

        let by_team = list_todos(
            &st,
            Actor(b.id),
            TodoListQuery {
                team_id: Some(team_id),
                ..TodoListQuery::default()
            },
            now,
        )
        .await
        .unwrap();
        assert_eq!(by_team.todos.len(), 2);
    }

    #[tokio::test]
    async fn list_by_foreign_team_is_forbidden() {
        let st = AppState::fake();
        let a = user(&st, "a@example.com").await;
        let c = user(&st, "c@example.com").await;
        let team_id = team_with(&st, &a, &[]).await;
        let err = list_todos(
            &st,
            Actor(c.id),
            TodoListQuery {
                team_id: Some(team_id),
                ..TodoListQuery::default()
            },
            OffsetDateTime::now_utc(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn plain_date_is_due_today_under_a_local_day_offset() {
        let mut config = AppConfig::for_tests();
        config.day_offset = UtcOffset::from_hms(-5, 0, 0).unwrap();
        let st = AppState::from_parts(Arc::new(MemoryStore::new()), Arc::new(config));
        let b = user(&st, "b@example.com").await;
        let mut req = create("standup notes", None, None);
        req.deadline = Some("2026-10-19".into());
        create_todo(&st, Actor(b.id), req).await.unwrap();

        // Noon on the 19th at -05:00.
        let now = datetime!(2026-10-19 17:00 UTC);
        let today = list_todos(
            &st,
            Actor(b.id),
            TodoListQuery {
                deadline: query::DeadlineBucket::Today,
                ..TodoListQuery::default()
            },
            now,
        )
        .await
        .unwrap();
        assert_eq!(today.todos.len(), 1);
        assert_eq!(today.counts.today, 1);
        assert_eq!(today.counts.upcoming, 1);
        assert_eq!(today.counts.overdue, 0);
    }

    #[tokio::test]
    async fn deleting_a_todo_drops_its_assignments() {
        let st = AppState::fake();
        let a = user(&st, "a@example.com").await;
        let b = user(&st, "b@example.com").await;
        let todo = create_todo(&st, Actor(b.id), create("shared chore", None, Some(vec![b.id, a.id])))
            .await
            .unwrap();
        let id = todo.todo.id;
        let listed = list_todos(&st, Actor(a.id), TodoListQuery::default(), OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert_eq!(listed.todos.len(), 1);

        delete_todo(&st, Actor(b.id), id).await.unwrap();
        assert!(st.store.assignments_for_todos(&[id]).await.unwrap().is_empty());
        let listed = list_todos(&st, Actor(a.id), TodoListQuery::default(), OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert!(listed.todos.is_empty());
        assert_eq!(listed.counts.all, 0);
    }
}
