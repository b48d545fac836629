// src/services/permissions.rs
//
// Access decisions. No I/O here; callers turn a `false` into a ServiceError.

use crate::models::{FileRecord, TeamRole, Visibility};

// Owner removes admins and members, admin removes members, member removes nobody
pub fn can_remove_member(remover: TeamRole, target: TeamRole) -> bool {
    matches!(
        (remover, target),
        (TeamRole::Owner, TeamRole::Admin)
            | (TeamRole::Owner, TeamRole::Member)
            | (TeamRole::Admin, TeamRole::Member)
    )
}

// Nobody can hand out ownership; admins may only promote members
pub fn can_change_role(updater: TeamRole, target: TeamRole, new_role: TeamRole) -> bool {
    if new_role == TeamRole::Owner {
        return false;
    }

    match (updater, target) {
        (TeamRole::Owner, TeamRole::Admin) | (TeamRole::Owner, TeamRole::Member) => true,
        (TeamRole::Admin, TeamRole::Member) => new_role == TeamRole::Admin,
        _ => false,
    }
}

pub fn can_invite(role: TeamRole) -> bool {
    matches!(role, TeamRole::Owner | TeamRole::Admin)
}

pub fn can_read_file(file: &FileRecord, user_id: &str, user_team_ids: &[String]) -> bool {
    if file.creator_id == user_id {
        return true;
    }

    match &file.visibility {
        Visibility::Public => true,
        Visibility::Team(team_id) => user_team_ids.iter().any(|id| id == team_id),
        Visibility::Private => false,
    }
}

// The creator is the only one who can rename, delete or re-scope a file
pub fn can_manage_file(file: &FileRecord, user_id: &str) -> bool {
    file.creator_id == user_id
}
