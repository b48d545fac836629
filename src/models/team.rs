// src/models/team.rs
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::TryFrom;

use super::{ServiceError, User};

// Roles are ordered: Owner > Admin > Member
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    #[display(fmt = "member")]
    Member = 0,
    #[display(fmt = "admin")]
    Admin = 1,
    #[display(fmt = "owner")]
    Owner = 2,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub role: TeamRole,
    pub joined_at: DateTime<Utc>,
}

impl TeamMember {
    pub fn new(user: &User, role: TeamRole, joined_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            name: user.display_name().to_string(),
            role,
            joined_at,
        }
    }
}

/// A team and its membership.
///
/// Members are keyed by user id, so the `memberIds` projection written to the
/// store is always derived from the same map as `members` and cannot drift.
/// Deserialisation rejects documents whose projections disagree or that do
/// not carry exactly one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "TeamDocument", try_from = "TeamDocument")]
pub struct Team {
    pub id: String,
    pub name: String,
    members: BTreeMap<String, TeamMember>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Team {
    // Creates a team whose only member is its owner
    pub fn new(id: String, name: String, owner: &User, now: DateTime<Utc>) -> Self {
        let mut members = BTreeMap::new();
        members.insert(owner.id.clone(), TeamMember::new(owner, TeamRole::Owner, now));

        Self {
            id,
            name,
            members,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn member(&self, user_id: &str) -> Option<&TeamMember> {
        self.members.get(user_id)
    }

    pub fn role_of(&self, user_id: &str) -> Option<TeamRole> {
        self.members.get(user_id).map(|m| m.role)
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.contains_key(user_id)
    }

    pub fn owner(&self) -> Option<&TeamMember> {
        self.members.values().find(|m| m.role == TeamRole::Owner)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn member_ids(&self) -> Vec<String> {
        self.ordered_members().into_iter().map(|m| m.user_id.clone()).collect()
    }

    // Members in join order; ties fall back to user id
    pub fn ordered_members(&self) -> Vec<&TeamMember> {
        let mut members: Vec<&TeamMember> = self.members.values().collect();
        members.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.user_id.cmp(&b.user_id)));
        members
    }

    pub(crate) fn insert_member(&mut self, member: TeamMember) -> Result<(), ServiceError> {
        if member.role == TeamRole::Owner {
            return Err(ServiceError::BadRequest(
                "A team can only have one owner".to_string(),
            ));
        }
        if self.members.contains_key(&member.user_id) {
            return Err(ServiceError::Conflict(format!(
                "{} is already a member of {}",
                member.email, self.name
            )));
        }

        self.updated_at = member.joined_at;
        self.members.insert(member.user_id.clone(), member);
        Ok(())
    }

    pub(crate) fn remove_member(&mut self, user_id: &str, now: DateTime<Utc>) -> Option<TeamMember> {
        let removed = self.members.remove(user_id);
        if removed.is_some() {
            self.updated_at = now;
        }
        removed
    }

    pub(crate) fn set_role(
        &mut self,
        user_id: &str,
        role: TeamRole,
        now: DateTime<Utc>,
    ) -> Result<&TeamMember, ServiceError> {
        if role == TeamRole::Owner {
            return Err(ServiceError::BadRequest(
                "Ownership cannot be assigned to another member".to_string(),
            ));
        }

        let member = self
            .members
            .get_mut(user_id)
            .ok_or_else(|| ServiceError::NotFound("Member not found in this team".to_string()))?;
        if member.role == TeamRole::Owner {
            return Err(ServiceError::Forbidden(
                "The team owner's role cannot be changed".to_string(),
            ));
        }

        member.role = role;
        self.updated_at = now;
        Ok(member)
    }
}

// Stored/serialised shape of a team
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TeamDocument {
    pub id: String,
    pub name: String,
    pub members: Vec<TeamMember>,
    pub member_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Team> for TeamDocument {
    fn from(team: Team) -> Self {
        let members: Vec<TeamMember> = team.ordered_members().into_iter().cloned().collect();
        let member_ids = members.iter().map(|m| m.user_id.clone()).collect();

        Self {
            id: team.id,
            name: team.name,
            members,
            member_ids,
            created_at: team.created_at,
            updated_at: team.updated_at,
        }
    }
}

impl TryFrom<TeamDocument> for Team {
    type Error = String;

    fn try_from(doc: TeamDocument) -> Result<Self, Self::Error> {
        let mut members = BTreeMap::new();
        for member in doc.members {
            if members.insert(member.user_id.clone(), member).is_some() {
                return Err(format!("team {} lists a member twice", doc.id));
            }
        }

        let mut member_ids = doc.member_ids.clone();
        member_ids.sort();
        member_ids.dedup();
        if member_ids.len() != doc.member_ids.len()
            || member_ids.len() != members.len()
            || !member_ids.iter().all(|id| members.contains_key(id))
        {
            return Err(format!("team {} memberIds disagree with members", doc.id));
        }

        let owners = members.values().filter(|m| m.role == TeamRole::Owner).count();
        if owners != 1 {
            return Err(format!("team {} has {} owners", doc.id, owners));
        }

        Ok(Self {
            id: doc.id,
            name: doc.name,
            members,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        })
    }
}

// Request bodies
#[derive(Serialize, Deserialize, Debug)]
pub struct TeamData {
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UpdateRoleRequest {
    pub role: TeamRole,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            name: id.to_uppercase(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_new_team_has_owner_as_only_member() {
        let team = Team::new("t1".into(), "Eng".into(), &user("alice"), Utc::now());

        assert_eq!(team.member_ids(), vec!["alice".to_string()]);
        assert_eq!(team.role_of("alice"), Some(TeamRole::Owner));
        assert_eq!(team.owner().map(|m| m.user_id.as_str()), Some("alice"));
    }

    #[test]
    fn test_insert_member_rejects_owner_and_duplicates() {
        let mut team = Team::new("t1".into(), "Eng".into(), &user("alice"), Utc::now());

        let as_owner = TeamMember::new(&user("bob"), TeamRole::Owner, Utc::now());
        assert!(matches!(team.insert_member(as_owner), Err(ServiceError::BadRequest(_))));

        let bob = TeamMember::new(&user("bob"), TeamRole::Member, Utc::now());
        team.insert_member(bob.clone()).unwrap();
        assert!(matches!(team.insert_member(bob), Err(ServiceError::Conflict(_))));
        assert_eq!(team.member_count(), 2);
    }

    #[test]
    fn test_set_role_never_touches_owner() {
        let mut team = Team::new("t1".into(), "Eng".into(), &user("alice"), Utc::now());
        team.insert_member(TeamMember::new(&user("bob"), TeamRole::Member, Utc::now()))
            .unwrap();

        assert!(matches!(
            team.set_role("alice", TeamRole::Member, Utc::now()),
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            team.set_role("bob", TeamRole::Owner, Utc::now()),
            Err(ServiceError::BadRequest(_))
        ));
        assert_eq!(
            team.set_role("bob", TeamRole::Admin, Utc::now()).unwrap().role,
            TeamRole::Admin
        );
    }

    #[test]
    fn test_document_projection_matches_members() {
        let mut team = Team::new("t1".into(), "Eng".into(), &user("alice"), Utc::now());
        team.insert_member(TeamMember::new(&user("bob"), TeamRole::Admin, Utc::now()))
            .unwrap();

        let value = serde_json::to_value(&team).unwrap();
        assert_eq!(value["memberIds"], json!(["alice", "bob"]));
        assert_eq!(value["members"][1]["role"], json!("admin"));

        let back: Team = serde_json::from_value(value).unwrap();
        assert_eq!(back, team);
    }

    #[test]
    fn test_document_with_drifted_member_ids_is_rejected() {
        let team = Team::new("t1".into(), "Eng".into(), &user("alice"), Utc::now());
        let mut value = serde_json::to_value(&team).unwrap();
        value["memberIds"] = json!(["alice", "mallory"]);

        assert!(serde_json::from_value::<Team>(value).is_err());
    }

    #[test]
    fn test_document_without_owner_is_rejected() {
        let team = Team::new("t1".into(), "Eng".into(), &user("alice"), Utc::now());
        let mut value = serde_json::to_value(&team).unwrap();
        value["members"][0]["role"] = json!("admin");

        assert!(serde_json::from_value::<Team>(value).is_err());
    }

    #[test]
    fn test_roles_are_ordered() {
        assert!(TeamRole::Owner > TeamRole::Admin);
        assert!(TeamRole::Admin > TeamRole::Member);
        assert_eq!(TeamRole::Admin.to_string(), "admin");
    }
}
