use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role that passes `require_admin`
pub const ADMIN_ROLE: &str = "admin";
/// Role assigned to newly registered profiles
pub const DEFAULT_ROLE: &str = "member";

/// Stored caller profile, keyed by uid in `user_profiles`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(uid: impl Into<String>, role: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
            role: role.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_minimal_document() {
        let profile: UserProfile = serde_json::from_value(json!({
            "uid": "u1",
            "role": "admin",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        assert!(profile.is_admin());
        assert_eq!(profile.email, None);
    }
}
