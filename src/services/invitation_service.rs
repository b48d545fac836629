// src/services/invitation_service.rs

use chrono::Utc;
use lazy_static::lazy_static;
use log::{error, info};
use regex::Regex;

use crate::db::Database;
use crate::models::{Invitation, InvitationStatus, ServiceError, TeamMember, TeamRole, User};
use crate::services::permissions;
use crate::services::team_service::gate_team;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid");
}

fn normalize_email(email: &str) -> Result<String, ServiceError> {
    let email = email.trim().to_lowercase();
    if !EMAIL_RE.is_match(&email) {
        return Err(ServiceError::BadRequest(
            "Please provide a valid email address".to_string(),
        ));
    }
    Ok(email)
}

/// Invitation workflow.
///
/// Acceptance flips the invitation and appends the member inside one
/// transaction, so an accepted invitation and the membership it grants are
/// always observed together.
#[derive(Clone)]
pub struct InvitationService {
    db: Database,
}

impl InvitationService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create(&self, team_id: &str, inviter: &User, invitee_email: &str) -> Result<Invitation, ServiceError> {
        let email = normalize_email(invitee_email)?;

        info!("✉️ User: {} inviting {} to team: {}", inviter.id, email, team_id);

        let invitation = self.db.transaction(|tx| {
            let invitee = tx
                .users()
                .find(|u| u.email.to_lowercase() == email)
                .cloned()
                .ok_or_else(|| {
                    error!("❌ No user registered with email: {}", email);
                    ServiceError::NotFound(format!("No user found with email {}", email))
                })?;

            if invitee.id == inviter.id {
                return Err(ServiceError::Conflict(
                    "You cannot invite yourself".to_string(),
                ));
            }

            let team = gate_team(tx.team(team_id), team_id, &inviter.id)?;
            let inviter_role = team.role_of(&inviter.id).unwrap_or(TeamRole::Member);
            if !permissions::can_invite(inviter_role) {
                return Err(ServiceError::Forbidden(
                    "Only team owners and admins can invite members".to_string(),
                ));
            }

            if team.is_member(&invitee.id) {
                return Err(ServiceError::Conflict(format!(
                    "{} is already a member of {}",
                    email, team.name
                )));
            }

            let duplicate = tx
                .invitations()
                .any(|i| i.team_id == team_id && i.user_email == email && i.is_pending());
            if duplicate {
                return Err(ServiceError::Conflict(format!(
                    "{} already has a pending invitation to {}",
                    email, team.name
                )));
            }

            let invitation = Invitation::new(&team, inviter, &invitee, Utc::now());
            tx.put_invitation(invitation.clone());
            Ok(invitation)
        })?;

        info!("✅ Invitation created: {}", invitation.id);
        Ok(invitation)
    }

    pub fn accept(&self, invitation_id: &str, user: &User) -> Result<Invitation, ServiceError> {
        let invitation = self.db.transaction(|tx| {
            let mut invitation = pending_invitation(tx.invitation(invitation_id), user)?;

            let mut team = tx
                .team(&invitation.team_id)
                .cloned()
                .ok_or_else(|| ServiceError::NotFound("Team no longer exists".to_string()))?;

            let now = Utc::now();
            team.insert_member(TeamMember::new(user, TeamRole::Member, now))?;
            invitation.respond(InvitationStatus::Accepted, now);

            tx.put_team(team);
            tx.put_invitation(invitation.clone());
            Ok(invitation)
        })?;

        info!("✅ User: {} joined team: {}", user.id, invitation.team_id);
        Ok(invitation)
    }

    pub fn decline(&self, invitation_id: &str, user: &User) -> Result<Invitation, ServiceError> {
        let invitation = self.db.transaction(|tx| {
            let mut invitation = pending_invitation(tx.invitation(invitation_id), user)?;
            invitation.respond(InvitationStatus::Declined, Utc::now());
            tx.put_invitation(invitation.clone());
            Ok(invitation)
        })?;

        info!("🚫 User: {} declined invitation: {}", user.id, invitation_id);
        Ok(invitation)
    }

    // The caller's pending invitations, newest first
    pub fn pending_for_user(&self, user: &User) -> Result<Vec<Invitation>, ServiceError> {
        let mut invitations = self.db.read(|c| {
            c.invitations
                .values()
                .filter(|i| i.user_id == user.id && i.is_pending())
                .cloned()
                .collect::<Vec<_>>()
        })?;
        invitations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(invitations)
    }

    pub fn invitations_for_team(&self, team_id: &str, requesting_user_id: &str) -> Result<Vec<Invitation>, ServiceError> {
        let mut invitations = self.db.read(|c| {
            gate_team(c.teams.get(team_id), team_id, requesting_user_id)?;
            Ok::<_, ServiceError>(
                c.invitations
                    .values()
                    .filter(|i| i.team_id == team_id)
                    .cloned()
                    .collect::<Vec<_>>(),
            )
        })??;
        invitations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(invitations)
    }
}

fn pending_invitation(invitation: Option<&Invitation>, user: &User) -> Result<Invitation, ServiceError> {
    let invitation = invitation
        .ok_or_else(|| ServiceError::NotFound("Invitation not found".to_string()))?;

    if invitation.user_id != user.id {
        return Err(ServiceError::Forbidden(
            "This invitation was sent to someone else".to_string(),
        ));
    }
    if !invitation.is_pending() {
        return Err(ServiceError::Conflict(format!(
            "Invitation has already been {}",
            invitation.status
        )));
    }

    Ok(invitation.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Bob@Example.COM ").unwrap(), "bob@example.com");
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("a b@x.com").is_err());
        assert!(normalize_email("").is_err());
    }
}
