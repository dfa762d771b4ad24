use std::collections::HashMap;

use anyhow::Context;
use tracing::info;
use uuid::Uuid;

use super::{
    dto::{CreateTeamRequest, InviteRequest, MemberDetails, TeamDetails, TeamListItem, UpdateTeamRequest},
    repo_types::{Role, Team, TeamMember, TeamPatch},
};
use crate::{
    auth::{
        guard,
        services::{is_valid_email, normalize_email},
        Actor,
    },
    error::{ApiError, ApiResult},
    state::AppState,
    todos::{repo_types::TodoSelection, services as todos},
    users::repo_types::User,
};

fn team_name(raw: &str) -> ApiResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::invalid("Team name must not be empty"));
    }
    Ok(name.to_string())
}

/// Pairs each membership with its user profile.
async fn with_profiles(st: &AppState, members: Vec<TeamMember>) -> ApiResult<Vec<MemberDetails>> {
    let ids: Vec<Uuid> = members.iter().map(|m| m.user_id).collect();
    let users: HashMap<Uuid, User> = st
        .store
        .users_by_ids(&ids)
        .await?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    members
        .into_iter()
        .map(|member| -> ApiResult<MemberDetails> {
            let user = users
                .get(&member.user_id)
                .cloned()
                .with_context(|| format!("member {} of team {} missing", member.user_id, member.team_id))?;
            Ok(MemberDetails { member, user })
        })
        .collect()
}

pub async fn list_teams(st: &AppState, Actor(actor): Actor) -> ApiResult<Vec<TeamListItem>> {
    let teams = st.store.teams_for_user(actor).await?;
    if teams.is_empty() {
        return Ok(Vec::new());
    }
    let team_ids: Vec<Uuid> = teams.iter().map(|t| t.id).collect();

    let members = with_profiles(st, st.store.members_of_teams(&team_ids).await?).await?;
    let todo_counts: HashMap<Uuid, i64> = st
        .store
        .count_todos_by_team(&team_ids)
        .await?
        .into_iter()
        .collect();

    let items = teams
        .into_iter()
        .map(|team| {
            let members: Vec<MemberDetails> = members
                .iter()
                .filter(|m| m.member.team_id == team.id)
                .cloned()
                .collect();
            TeamListItem {
                member_count: members.len(),
                todo_count: todo_counts.get(&team.id).copied().unwrap_or(0),
                members,
                team,
            }
        })
        .collect();
    Ok(items)
}

/// The team and its owner membership are written together or not at all.
pub async fn create_team(st: &AppState, Actor(actor): Actor, req: CreateTeamRequest) -> ApiResult<Team> {
    let name = team_name(&req.name)?;

    let mut tx = st.store.begin().await?;
    let team = tx.insert_team(&name, req.description.as_deref()).await?;
    tx.insert_member(team.id, actor, Role::Owner).await?;
    tx.commit().await?;

    info!(team_id = %team.id, owner = %actor, "team created");
    Ok(team)
}

pub async fn get_team(st: &AppState, actor: Actor, team_id: Uuid) -> ApiResult<TeamDetails> {
    let (team, _) = guard::team_for_member(st, actor, team_id).await?;

    let members = with_profiles(st, st.store.members_of_teams(&[team_id]).await?).await?;
    let mut rows = st.store.list_todos(TodoSelection::Team(team_id), None).await?;
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let todos = todos::hydrate(st, rows).await?;

    Ok(TeamDetails {
        team,
        members,
        todos,
    })
}

pub async fn update_team(
    st: &AppState,
    actor: Actor,
    team_id: Uuid,
    req: UpdateTeamRequest,
) -> ApiResult<Team> {
    guard::team_for_owner(st, actor, team_id).await?;

    let patch = TeamPatch {
        name: req.name.as_deref().map(team_name).transpose()?,
        description: req.description,
    };
    let team = st
        .store
        .update_team(team_id, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found("Team not found"))?;
    info!(%team_id, "team updated");
    Ok(team)
}

/// Memberships and team todos go with the team.
pub async fn delete_team(st: &AppState, actor: Actor, team_id: Uuid) -> ApiResult<()> {
    guard::team_for_owner(st, actor, team_id).await?;

    if !st.store.delete_team(team_id).await? {
        return Err(ApiError::not_found("Team not found"));
    }
    info!(%team_id, by = %actor.0, "team deleted");
    Ok(())
}

pub async fn invite_member(
    st: &AppState,
    actor: Actor,
    team_id: Uuid,
    req: InviteRequest,
) -> ApiResult<MemberDetails> {
    guard::team_for_owner(st, actor, team_id).await?;

    let email = req
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|e| is_valid_email(e))
        .ok_or_else(|| ApiError::invalid("A valid email address is required"))?;

    let user = st
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::not_found("No user with that email"))?;

    let member = st
        .store
        .add_member(team_id, user.id, Role::Member)
        .await?
        .ok_or_else(|| ApiError::invalid("User is already a member of this team"))?;

    info!(%team_id, user_id = %user.id, "member invited");
    Ok(MemberDetails { member, user })
}
