// src/services/user_service.rs

use chrono::Utc;
use log::{error, info};

use crate::db::Database;
use crate::models::{ServiceError, SessionIdentity, User};

const MAX_NAME_CHARS: usize = 50;

#[derive(Clone)]
pub struct UserService {
    db: Database,
}

impl UserService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // Creates the user on their first verified session; later calls return the stored record untouched
    pub fn upsert_from_identity(&self, identity: &SessionIdentity) -> Result<User, ServiceError> {
        if let Some(user) = self.db.read(|c| c.users.get(&identity.user_id).cloned())? {
            return Ok(user);
        }

        self.db.transaction(|tx| {
            if let Some(existing) = tx.user(&identity.user_id) {
                return Ok(existing.clone());
            }

            let email = identity.email.trim().to_lowercase();
            let name = identity
                .display_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
            let now = Utc::now();

            let user = User {
                id: identity.user_id.clone(),
                email,
                name,
                created_at: now,
                updated_at: now,
            };
            tx.put_user(user.clone());

            info!("👤 Registered new user: {}", user.id);
            Ok(user)
        })
    }

    pub fn get(&self, user_id: &str) -> Result<User, ServiceError> {
        self.db
            .read(|c| c.users.get(user_id).cloned())?
            .ok_or_else(|| {
                error!("❌ User not found: {}", user_id);
                ServiceError::NotFound("User not found".to_string())
            })
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let email = email.trim().to_lowercase();
        self.db
            .read(|c| c.users.values().find(|u| u.email.to_lowercase() == email).cloned())
    }

    // Only the name is editable; the email belongs to the identity provider
    pub fn update_profile(&self, user_id: &str, name: &str) -> Result<User, ServiceError> {
        let name = name.trim();
        let length = name.chars().count();
        if length == 0 || length > MAX_NAME_CHARS {
            return Err(ServiceError::BadRequest(format!(
                "Name must be between 1 and {} characters",
                MAX_NAME_CHARS
            )));
        }

        let user = self.db.transaction(|tx| {
            let mut user = tx
                .user(user_id)
                .cloned()
                .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;
            user.name = name.to_string();
            user.updated_at = Utc::now();
            tx.put_user(user.clone());
            Ok(user)
        })?;

        info!("✅ Profile updated for user: {}", user_id);
        Ok(user)
    }
}
