// src/services/team_service.rs

use chrono::Utc;
use log::{debug, error, info};
use uuid::Uuid;

use crate::db::Database;
use crate::models::{ServiceError, Team, TeamMember, TeamRole, User};
use crate::services::permissions;

const MAX_TEAM_NAME_CHARS: usize = 25;

// Membership gate shared by every team-scoped read and mutation
pub(crate) fn gate_team(
    team: Option<&Team>,
    team_id: &str,
    user_id: &str,
) -> Result<Team, ServiceError> {
    let team = team.ok_or_else(|| {
        error!("❌ Team not found: {}", team_id);
        ServiceError::NotFound("Team not found".to_string())
    })?;

    if !team.is_member(user_id) {
        error!("❌ User: {} is not a member of team: {}", user_id, team_id);
        return Err(ServiceError::Forbidden(
            "You are not a member of this team".to_string(),
        ));
    }

    Ok(team.clone())
}

/// Team registry.
///
/// Every membership mutation is a single read-modify-write transaction, so
/// `members` and `memberIds` can never be observed out of step and two
/// concurrent removals of different members both land.
#[derive(Clone)]
pub struct TeamService {
    db: Database,
}

impl TeamService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create_team(&self, name: &str, creator: &User) -> Result<Team, ServiceError> {
        let name = name.trim();
        let length = name.chars().count();
        if length == 0 || length > MAX_TEAM_NAME_CHARS {
            return Err(ServiceError::BadRequest(format!(
                "Team name must be between 1 and {} characters",
                MAX_TEAM_NAME_CHARS
            )));
        }

        info!("📝 Creating team: {} for user: {}", name, creator.id);

        let team = self.db.transaction(|tx| {
            let lowered = name.to_lowercase();
            let duplicate = tx.teams().any(|team| {
                team.owner().map_or(false, |owner| owner.user_id == creator.id)
                    && team.name.trim().to_lowercase() == lowered
            });
            if duplicate {
                return Err(ServiceError::Conflict(format!(
                    "You already have a team named \"{}\"",
                    name
                )));
            }

            let team = Team::new(Uuid::new_v4().to_string(), name.to_string(), creator, Utc::now());
            tx.put_team(team.clone());
            Ok(team)
        })?;

        info!("✅ Team created: {}", team.id);
        Ok(team)
    }

    // Teams whose member map contains the user, newest first
    pub fn teams_for_user(&self, user_id: &str) -> Result<Vec<Team>, ServiceError> {
        let mut teams = self.db.read(|c| {
            c.teams
                .values()
                .filter(|team| team.is_member(user_id))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        teams.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        debug!("Found {} teams for user: {}", teams.len(), user_id);
        Ok(teams)
    }

    pub fn team_ids_for_user(&self, user_id: &str) -> Result<Vec<String>, ServiceError> {
        self.db.read(|c| {
            c.teams
                .values()
                .filter(|team| team.is_member(user_id))
                .map(|team| team.id.clone())
                .collect()
        })
    }

    pub fn team_by_id(&self, team_id: &str, requesting_user_id: &str) -> Result<Team, ServiceError> {
        self.db
            .read(|c| gate_team(c.teams.get(team_id), team_id, requesting_user_id))?
    }

    pub fn members(&self, team_id: &str, requesting_user_id: &str) -> Result<Vec<TeamMember>, ServiceError> {
        let team = self.team_by_id(team_id, requesting_user_id)?;
        Ok(team.ordered_members().into_iter().cloned().collect())
    }

    // Direct membership grant. Invitations go through InvitationService::accept instead.
    pub fn add_member(&self, team_id: &str, new_user: &User, role: TeamRole) -> Result<Team, ServiceError> {
        if role == TeamRole::Owner {
            return Err(ServiceError::BadRequest(
                "A team can only have one owner".to_string(),
            ));
        }

        let team = self.db.transaction(|tx| {
            let mut team = tx
                .team(team_id)
                .cloned()
                .ok_or_else(|| ServiceError::NotFound("Team not found".to_string()))?;
            team.insert_member(TeamMember::new(new_user, role, Utc::now()))?;
            tx.put_team(team.clone());
            Ok(team)
        })?;

        info!("✅ User: {} added to team: {} as {}", new_user.id, team_id, role);
        Ok(team)
    }

    pub fn remove_member(
        &self,
        team_id: &str,
        target_user_id: &str,
        remover_user_id: &str,
    ) -> Result<Team, ServiceError> {
        info!("👥 User: {} removing: {} from team: {}", remover_user_id, target_user_id, team_id);

        let team = self.db.transaction(|tx| {
            let mut team = gate_team(tx.team(team_id), team_id, remover_user_id)?;
            if target_user_id == remover_user_id {
                return Err(ServiceError::Conflict(
                    "You cannot remove yourself, leave the team instead".to_string(),
                ));
            }
            let remover_role = team
                .role_of(remover_user_id)
                .ok_or_else(|| ServiceError::NotFound("Member not found in this team".to_string()))?;
            let target_role = team
                .role_of(target_user_id)
                .ok_or_else(|| ServiceError::NotFound("Member not found in this team".to_string()))?;

            if target_role == TeamRole::Owner {
                return Err(ServiceError::Forbidden(
                    "Cannot remove the owner of the team".to_string(),
                ));
            }
            if !permissions::can_remove_member(remover_role, target_role) {
                return Err(ServiceError::Forbidden(format!(
                    "A team {} cannot remove a team {}",
                    remover_role, target_role
                )));
            }

            team.remove_member(target_user_id, Utc::now());
            tx.put_team(team.clone());
            Ok(team)
        })?;

        info!("✅ User: {} removed from team: {}", target_user_id, team_id);
        Ok(team)
    }

    pub fn update_member_role(
        &self,
        team_id: &str,
        target_user_id: &str,
        new_role: TeamRole,
        updater_user_id: &str,
    ) -> Result<TeamMember, ServiceError> {
        if new_role == TeamRole::Owner {
            return Err(ServiceError::BadRequest(
                "Ownership cannot be assigned to another member".to_string(),
            ));
        }

        info!(
            "🔄 User: {} setting role of: {} in team: {} to {}",
            updater_user_id, target_user_id, team_id, new_role
        );

        let member = self.db.transaction(|tx| {
            let mut team = gate_team(tx.team(team_id), team_id, updater_user_id)?;
            if target_user_id == updater_user_id {
                return Err(ServiceError::Conflict(
                    "You cannot change your own role".to_string(),
                ));
            }
            let updater_role = team
                .role_of(updater_user_id)
                .ok_or_else(|| ServiceError::NotFound("Member not found in this team".to_string()))?;
            let target_role = team
                .role_of(target_user_id)
                .ok_or_else(|| ServiceError::NotFound("Member not found in this team".to_string()))?;

            if target_role == TeamRole::Owner {
                return Err(ServiceError::Forbidden(
                    "The team owner's role cannot be changed".to_string(),
                ));
            }
            if !permissions::can_change_role(updater_role, target_role, new_role) {
                return Err(ServiceError::Forbidden(format!(
                    "A team {} cannot change a {} to {}",
                    updater_role, target_role, new_role
                )));
            }

            let member = team.set_role(target_user_id, new_role, Utc::now())?.clone();
            tx.put_team(team);
            Ok(member)
        })?;

        info!("✅ Role of: {} in team: {} is now {}", target_user_id, team_id, new_role);
        Ok(member)
    }

    pub fn leave_team(&self, team_id: &str, user_id: &str) -> Result<(), ServiceError> {
        self.db.transaction(|tx| {
            let mut team = gate_team(tx.team(team_id), team_id, user_id)?;
            if team.role_of(user_id) == Some(TeamRole::Owner) {
                return Err(ServiceError::Conflict(
                    "The owner cannot leave their own team".to_string(),
                ));
            }

            team.remove_member(user_id, Utc::now());
            tx.put_team(team);
            Ok(())
        })?;

        info!("👋 User: {} left team: {}", user_id, team_id);
        Ok(())
    }
}
