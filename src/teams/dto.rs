use serde::{Deserialize, Serialize};

use super::repo_types::{Team, TeamMember};
use crate::{todos::dto::TodoDetails, users::repo_types::User};

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTeamRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// Absent leaves the description alone; `null` clears it.
    #[serde(default, deserialize_with = "crate::dto::present")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    #[serde(default)]
    pub email: Option<String>,
}

/// A membership with the member's profile attached.
#[derive(Debug, Clone, Serialize)]
pub struct MemberDetails {
    #[serde(flatten)]
    pub member: TeamMember,
    pub user: User,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamListItem {
    #[serde(flatten)]
    pub team: Team,
    pub members: Vec<MemberDetails>,
    pub member_count: usize,
    pub todo_count: i64,
}

#[derive(Debug, Serialize)]
pub struct TeamDetails {
    #[serde(flatten)]
    pub team: Team,
    pub members: Vec<MemberDetails>,
    pub todos: Vec<TodoDetails>,
}

#[derive(Debug, Serialize)]
pub struct InviteResponse {
    pub message: String,
    pub member: MemberDetails,
}
