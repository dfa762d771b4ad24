//! Authorization predicates. Each takes the actor id and relationship data the
//! caller already loaded; none of them touch the store.

use uuid::Uuid;

use crate::teams::repo_types::{Role, TeamMember};
use crate::todos::repo_types::Todo;

/// What a todo check needs: the todo, its assignees, and the actor's role in
/// the todo's team (`None` for personal todos or non-members).
#[derive(Debug, Clone)]
pub struct TodoAccess {
    pub todo: Todo,
    pub assignee_ids: Vec<Uuid>,
    pub team_role: Option<Role>,
}

pub fn can_view_team(membership: Option<&TeamMember>) -> bool {
    membership.is_some()
}

/// Update, delete and invite all require the owner role.
pub fn can_manage_team(membership: Option<&TeamMember>) -> bool {
    matches!(membership, Some(m) if m.role == Role::Owner)
}

impl TodoAccess {
    fn is_creator(&self, actor: Uuid) -> bool {
        self.todo.created_by_id == actor
    }

    fn is_team_member(&self) -> bool {
        self.todo.team_id.is_some() && self.team_role.is_some()
    }

    /// View and update share the same rule.
    pub fn can_view(&self, actor: Uuid) -> bool {
        self.is_creator(actor) || self.assignee_ids.contains(&actor) || self.is_team_member()
    }

    pub fn can_update(&self, actor: Uuid) -> bool {
        self.can_view(actor)
    }

    pub fn can_delete(&self, actor: Uuid) -> bool {
        self.is_creator(actor)
            || (self.todo.team_id.is_some() && self.team_role == Some(Role::Owner))
    }

    pub fn can_assign(&self, actor: Uuid) -> bool {
        self.is_creator(actor) || self.is_team_member()
    }
}

/// Proposed assignees that are not in `members`, in request order without
/// duplicates.
pub fn non_members(proposed: &[Uuid], members: &[Uuid]) -> Vec<Uuid> {
    let mut out: Vec<Uuid> = Vec::new();
    for id in proposed {
        if !members.contains(id) && !out.contains(id) {
            out.push(*id);
        }
    }
    out
}
