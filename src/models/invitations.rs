// src/models/invitations.rs
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::{Team, User};

// Status for team invitations. Only pending invitations can be acted on.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvitationStatus {
    #[serde(rename = "pending")]
    #[display(fmt = "pending")]
    Pending,
    #[serde(rename = "accepted")]
    #[display(fmt = "accepted")]
    Accepted,
    #[serde(rename = "declined")]
    #[display(fmt = "declined")]
    Declined,
}

// Team invitation addressed to an existing user
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub id: String,
    pub team_id: String,
    pub team_name: String,
    pub inviter_id: String,
    pub inviter_name: String,
    pub user_email: String,
    pub user_id: String,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

// Request to create a new invitation
#[derive(Serialize, Deserialize, Debug)]
pub struct CreateInvitationRequest {
    pub email: String,
}

impl Invitation {
    pub fn new(team: &Team, inviter: &User, invitee: &User, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            team_id: team.id.clone(),
            team_name: team.name.clone(),
            inviter_id: inviter.id.clone(),
            inviter_name: inviter.display_name().to_string(),
            user_email: invitee.email.clone(),
            user_id: invitee.id.clone(),
            status: InvitationStatus::Pending,
            created_at: now,
            responded_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == InvitationStatus::Pending
    }

    // Moves a pending invitation to a terminal status
    pub(crate) fn respond(&mut self, status: InvitationStatus, now: DateTime<Utc>) {
        self.status = status;
        self.responded_at = Some(now);
    }
}
