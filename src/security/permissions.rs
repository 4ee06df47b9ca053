use std::sync::Arc;

use crate::database::models::{UserProfile, ADMIN_ROLE};
use crate::database::store::{DocumentStore, USER_PROFILES};

use super::context::Caller;
use super::error::SecurityError;
use super::logger::SecurityLogger;

/// Role checks against stored user profiles. Every rejection is written
/// to the security log before the error is returned.
#[derive(Clone)]
pub struct PermissionChecker {
    store: Arc<dyn DocumentStore>,
    logger: SecurityLogger,
}

impl PermissionChecker {
    pub fn new(store: Arc<dyn DocumentStore>, logger: SecurityLogger) -> Self {
        Self { store, logger }
    }

    pub async fn require_authenticated(&self, caller: &Caller) -> Result<UserProfile, SecurityError> {
        let uid = match caller.uid() {
            Some(uid) => uid,
            None => {
                self.logger.log_unauthorized_access(None, "authentication_required").await;
                return Err(SecurityError::authentication("Authentication required"));
            }
        };

        let document = self.store.get(USER_PROFILES, uid).await.map_err(|e| {
            tracing::error!("Profile lookup failed for '{}': {}", uid, e);
            SecurityError::from(e)
        })?;

        let profile = document.and_then(|doc| match serde_json::from_value::<UserProfile>(doc) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!("Unreadable profile for '{}': {}", uid, e);
                None
            }
        });

        match profile {
            Some(profile) => Ok(profile),
            None => {
                self.logger.log_unauthorized_access(Some(uid), "user_profile").await;
                Err(SecurityError::authorization("User profile not found"))
            }
        }
    }

    pub async fn require_admin(&self, caller: &Caller) -> Result<UserProfile, SecurityError> {
        let profile = self.require_authenticated(caller).await?;

        if !profile.is_admin() {
            self.logger.log_unauthorized_access(Some(&profile.uid), ADMIN_ROLE).await;
            return Err(SecurityError::authorization("Admin access required"));
        }
        Ok(profile)
    }

    pub async fn require_role(&self, caller: &Caller, allowed_roles: &[String]) -> Result<UserProfile, SecurityError> {
        let profile = self.require_authenticated(caller).await?;

        if !allowed_roles.iter().any(|role| *role == profile.role) {
            let joined = allowed_roles.join(",");
            self.logger.log_unauthorized_access(Some(&profile.uid), &joined).await;
            return Err(SecurityError::authorization(format!(
                "Required role: {}",
                allowed_roles.join(" or ")
            )));
        }
        Ok(profile)
    }
}
