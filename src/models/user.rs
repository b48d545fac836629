use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// A registered user. Created the first time the identity provider vouches for them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    // Name shown to other users, falling back to the email's local part
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.email.split('@').next().unwrap_or(&self.email)
        } else {
            &self.name
        }
    }
}

// What a verified session tells us about the caller
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub user_id: String,
    pub email: String,
    pub display_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UpdateProfileRequest {
    pub name: String,
}
