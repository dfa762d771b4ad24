//! Loads the entity graph an authorization decision needs and turns the
//! outcome into a typed rejection, so handlers never repeat the check.

use tracing::warn;
use uuid::Uuid;

use super::extractors::Actor;
use crate::{
    access::{self, TodoAccess},
    error::{ApiError, ApiResult},
    state::AppState,
    teams::repo_types::{Team, TeamMember},
};

async fn load_team(st: &AppState, team_id: Uuid) -> ApiResult<Team> {
    st.store
        .find_team(team_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Team not found"))
}

/// Team plus the actor's membership; any role passes.
pub async fn team_for_member(
    st: &AppState,
    Actor(actor): Actor,
    team_id: Uuid,
) -> ApiResult<(Team, TeamMember)> {
    let team = load_team(st, team_id).await?;
    let membership = st.store.find_membership(team_id, actor).await?;
    match membership {
        Some(m) if access::can_view_team(Some(&m)) => Ok((team, m)),
        _ => {
            warn!(%actor, %team_id, "team access denied");
            Err(ApiError::forbidden("You do not have access to this team"))
        }
    }
}

/// Team plus the actor's membership; only owners pass.
pub async fn team_for_owner(
    st: &AppState,
    Actor(actor): Actor,
    team_id: Uuid,
) -> ApiResult<(Team, TeamMember)> {
    let team = load_team(st, team_id).await?;
    let membership = st.store.find_membership(team_id, actor).await?;
    match membership {
        Some(m) if access::can_manage_team(Some(&m)) => Ok((team, m)),
        _ => {
            warn!(%actor, %team_id, "team owner check failed");
            Err(ApiError::forbidden("Only a team owner can do this"))
        }
    }
}

/// Membership check for scoping by team id without loading the team first.
pub async fn require_membership(
    st: &AppState,
    Actor(actor): Actor,
    team_id: Uuid,
) -> ApiResult<TeamMember> {
    st.store
        .find_membership(team_id, actor)
        .await?
        .ok_or_else(|| {
            warn!(%actor, %team_id, "not a team member");
            ApiError::forbidden("You are not a member of this team")
        })
}

/// The todo with its assignees and the actor's role in its team.
pub async fn todo_access(
    st: &AppState,
    Actor(actor): Actor,
    todo_id: Uuid,
) -> ApiResult<TodoAccess> {
    let todo = st
        .store
        .find_todo(todo_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Todo not found"))?;

    let assignee_ids = st
        .store
        .assignments_for_todos(&[todo.id])
        .await?
        .into_iter()
        .map(|a| a.user_id)
        .collect();

    let team_role = match todo.team_id {
        Some(team_id) => st
            .store
            .find_membership(team_id, actor)
            .await?
            .map(|m| m.role),
        None => None,
    };

    Ok(TodoAccess {
        todo,
        assignee_ids,
        team_role,
    })
}

/// Runs `allowed` against the loaded access data and rejects with 403 if it
/// fails.
pub fn ensure(
    access: &TodoAccess,
    Actor(actor): Actor,
    allowed: fn(&TodoAccess, Uuid) -> bool,
    action: &str,
) -> ApiResult<()> {
    if allowed(access, actor) {
        Ok(())
    } else {
        warn!(%actor, todo_id = %access.todo.id, action, "todo access denied");
        Err(ApiError::forbidden(format!(
            "You do not have permission to {action} this todo"
        )))
    }
}
