//! Site users
//!
//! Roles are free-form strings owned by the authentication layer. The engine
//! only gives meaning to two of them: drivers can be assigned to legs, and
//! admins cannot be removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tenant::SiteNo;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_DRIVER: &str = "driver";

/// Input of an add-user request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub id: String,
    #[serde(default)]
    pub password: Option<String>,
    pub role: String,
}

/// A user of a site. Credentials are never read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteUser {
    pub id: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// User count of a site against its cap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub site_no: SiteNo,
    pub current_users: u64,
    pub max_users: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_user_serializes_without_password() {
        let user = SiteUser {
            id: "A1".to_string(),
            role: ROLE_ADMIN.to_string(),
            created_at: DateTime::from_timestamp(0, 0).unwrap(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["role"], "admin");
    }
}
