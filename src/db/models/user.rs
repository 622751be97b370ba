use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::models::loose_string;
use crate::util::identity::IdentityUser;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(#[serde(deserialize_with = "loose_string")] pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// `Users` table model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// `UserAuth` table model; links a user to the identity-provider account they signed in with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAuth {
    pub user_id: UserId,
    pub provider: String,
    pub provider_user_id: String,
    #[serde(default)]
    pub auth_payload: Value,
}

impl From<&IdentityUser> for User {
    fn from(identity: &IdentityUser) -> Self {
        Self {
            id: UserId(identity.id.clone()),
            name: identity.display_name().to_string(),
            email: identity.email().to_string(),
            created_at: Utc::now(),
        }
    }
}

impl From<&IdentityUser> for UserAuth {
    fn from(identity: &IdentityUser) -> Self {
        Self {
            user_id: UserId(identity.id.clone()),
            provider: identity.provider().to_string(),
            provider_user_id: identity.provider_user_id().to_string(),
            auth_payload: identity.raw.clone(),
        }
    }
}
