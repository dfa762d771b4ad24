use serde::{Deserialize, Serialize};

use super::repo_types::User;
use crate::teams::repo_types::{Team, TeamMember};

#[derive(Debug, Serialize)]
pub struct MembershipWithTeam {
    #[serde(flatten)]
    pub member: TeamMember,
    pub team: Team,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: User,
    pub teams: Vec<MembershipWithTeam>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMeRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}
