use std::collections::HashMap;

use tracing::info;
use uuid::Uuid;

use super::{
    dto::{MeResponse, MembershipWithTeam, UpdateMeRequest},
    repo_types::{User, UserPatch},
};
use crate::{
    auth::Actor,
    error::{ApiError, ApiResult},
    state::AppState,
    teams::repo_types::Team,
};

pub async fn get_me(st: &AppState, Actor(actor): Actor) -> ApiResult<MeResponse> {
    let user = st
        .store
        .find_user(actor)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let memberships = st.store.memberships_of_user(actor).await?;
    let team_ids: Vec<Uuid> = memberships.iter().map(|m| m.team_id).collect();
    let mut teams: HashMap<Uuid, Team> = st
        .store
        .teams_by_ids(&team_ids)
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();

    // A team deleted between the two reads just drops out.
    let teams = memberships
        .into_iter()
        .filter_map(|member| {
            let team = teams.remove(&member.team_id)?;
            Some(MembershipWithTeam { member, team })
        })
        .collect();

    Ok(MeResponse { user, teams })
}

pub async fn update_me(st: &AppState, Actor(actor): Actor, req: UpdateMeRequest) -> ApiResult<User> {
    let patch = UserPatch {
        name: req.name,
        image: req.image,
    };
    let user = st
        .store
        .update_user(actor, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    info!(user_id = %actor, "profile updated");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teams::{dto::CreateTeamRequest, services as teams};
    use crate::users::repo_types::NewUser;

    #[tokio::test]
    async fn me_lists_memberships_with_teams() {
        let st = AppState::fake();
        let a = st
            .store
            .upsert_user(&NewUser {
                email: "a@example.com".into(),
                name: Some("Ann".into()),
                image: None,
            })
            .await
            .unwrap();
        let team = teams::create_team(
            &st,
            Actor(a.id),
            CreateTeamRequest {
                name: "Eng".into(),
                description: None,
            },
        )
        .await
        .unwrap();

        let me = get_me(&st, Actor(a.id)).await.unwrap();
        assert_eq!(me.user.email, "a@example.com");
        assert_eq!(me.teams.len(), 1);
        assert_eq!(me.teams[0].team.id, team.id);
    }

    #[tokio::test]
    async fn unknown_actor_is_not_found() {
        let st = AppState::fake();
        let err = get_me(&st, Actor(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_keeps_absent_fields() {
        let st = AppState::fake();
        let a = st
            .store
            .upsert_user(&NewUser {
                email: "a@example.com".into(),
                name: Some("Ann".into()),
                image: Some("https://img/a.png".into()),
            })
            .await
            .unwrap();
        let updated = update_me(
            &st,
            Actor(a.id),
            UpdateMeRequest {
                name: Some("Anna".into()),
                image: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name.as_deref(), Some("Anna"));
        assert_eq!(updated.image.as_deref(), Some("https://img/a.png"));
    }
}
