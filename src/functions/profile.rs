// Profile functions: registerProfile, whoami, getUserProfile, setUserRole
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use super::FunctionRegistry;
use crate::config::AppConfig;
use crate::database::models::{UserProfile, ADMIN_ROLE, DEFAULT_ROLE};
use crate::database::store::{DocumentStore, TxOutcome, USER_PROFILES};
use crate::error::ApiError;
use crate::security::{CallContext, EndpointPolicy, FieldRule, PolicyError, RateLimit, SecurityDeps};

/// Roles a profile may hold
pub const ROLES: &[&str] = &[ADMIN_ROLE, "manager", DEFAULT_ROLE, "viewer"];

pub fn register(
    registry: &mut FunctionRegistry,
    config: &AppConfig,
    store: Arc<dyn DocumentStore>,
    deps: &SecurityDeps,
) -> Result<(), PolicyError> {
    let default_limit = RateLimit::per_seconds(config.rate_limit.window_secs, config.rate_limit.max_requests);

    let profiles = store.clone();
    registry.register(
        move |payload: Value, ctx: CallContext| register_profile(profiles.clone(), payload, ctx),
        EndpointPolicy::builder("registerProfile")
            .rate_limit(default_limit)
            .field("email", FieldRule::Email)
            .log_access(true)
            .build()?,
        deps,
    );

    registry.register(
        whoami,
        EndpointPolicy::builder("whoami").require_auth().log_access(true).build()?,
        deps,
    );

    let profiles = store.clone();
    registry.register(
        move |payload: Value, ctx: CallContext| get_user_profile(profiles.clone(), payload, ctx),
        EndpointPolicy::builder("getUserProfile")
            .require_role([ADMIN_ROLE, "manager"])
            .required(["uid"])
            .field("uid", FieldRule::Identifier)
            .build()?,
        deps,
    );

    let profiles = store;
    registry.register(
        move |payload: Value, ctx: CallContext| set_user_role(profiles.clone(), payload, ctx),
        EndpointPolicy::builder("setUserRole")
            .require_admin()
            .required(["uid", "role"])
            .field("uid", FieldRule::Identifier)
            .log_access(true)
            .build()?,
        deps,
    );

    Ok(())
}

/// Create the caller's profile with the default role, or return the
/// existing one unchanged
async fn register_profile(store: Arc<dyn DocumentStore>, payload: Value, ctx: CallContext) -> Result<Value, ApiError> {
    let uid = ctx
        .caller
        .uid()
        .ok_or_else(|| ApiError::unauthorized("Sign in before registering a profile"))?
        .to_string();

    let mut profile = UserProfile::new(uid.clone(), DEFAULT_ROLE);
    profile.email = payload.get("email").and_then(Value::as_str).map(str::to_string);
    profile.display_name = payload
        .get("display_name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    let fresh = serde_json::to_value(&profile)?;

    let mut existing = None;
    let outcome = store
        .transact(USER_PROFILES, &uid, &mut |current: Option<Value>| match current {
            Some(doc) => {
                existing = Some(doc);
                TxOutcome::Abort
            }
            None => TxOutcome::Commit(fresh.clone()),
        })
        .await?;

    match (outcome, existing) {
        (TxOutcome::Commit(doc), _) => {
            tracing::info!("Registered profile for '{}'", uid);
            Ok(json!({ "created": true, "profile": doc }))
        }
        (TxOutcome::Abort, Some(doc)) => Ok(json!({ "created": false, "profile": doc })),
        (TxOutcome::Abort, None) => Err(ApiError::internal_server_error("Profile registration aborted")),
    }
}

async fn whoami(_payload: Value, ctx: CallContext) -> Result<Value, ApiError> {
    let profile = ctx
        .profile
        .ok_or_else(|| ApiError::internal_server_error("Profile not loaded"))?;
    Ok(serde_json::to_value(profile)?)
}

async fn get_user_profile(store: Arc<dyn DocumentStore>, payload: Value, _ctx: CallContext) -> Result<Value, ApiError> {
    let uid = payload["uid"].as_str().unwrap_or_default();
    store
        .get(USER_PROFILES, uid)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Profile '{}' not found", uid)))
}

async fn set_user_role(store: Arc<dyn DocumentStore>, payload: Value, ctx: CallContext) -> Result<Value, ApiError> {
    let uid = payload["uid"].as_str().unwrap_or_default().to_string();
    let role = payload["role"].as_str().unwrap_or_default().to_string();

    if !ROLES.contains(&role.as_str()) {
        return Err(ApiError::validation_error(
            format!("Unknown role '{}'. Expected one of: {}", role, ROLES.join(", ")),
            None,
        ));
    }

    let mut unreadable = false;
    let outcome = store
        .transact(USER_PROFILES, &uid, &mut |current: Option<Value>| {
            let Some(doc) = current else {
                return TxOutcome::Abort;
            };
            match serde_json::from_value::<UserProfile>(doc) {
                Ok(mut profile) => {
                    profile.role = role.clone();
                    profile.updated_at = Utc::now();
                    match serde_json::to_value(&profile) {
                        Ok(updated) => TxOutcome::Commit(updated),
                        Err(_) => {
                            unreadable = true;
                            TxOutcome::Abort
                        }
                    }
                }
                Err(_) => {
                    unreadable = true;
                    TxOutcome::Abort
                }
            }
        })
        .await?;

    match outcome {
        TxOutcome::Commit(doc) => {
            tracing::info!(
                "Role of '{}' set to '{}' by '{}'",
                uid,
                role,
                ctx.caller.uid().unwrap_or("-")
            );
            Ok(doc)
        }
        TxOutcome::Abort if unreadable => Err(ApiError::internal_server_error("Stored profile is unreadable")),
        TxOutcome::Abort => Err(ApiError::not_found(format!("Profile '{}' not found", uid))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::database::MemoryStore;
    use crate::security::Caller;

    async fn setup(profiles: &[(&str, &str)]) -> (MemoryStore, FunctionRegistry) {
        let store = MemoryStore::new();
        for (uid, role) in profiles {
            store
                .put(USER_PROFILES, uid, serde_json::to_value(UserProfile::new(*uid, *role)).unwrap())
                .await;
        }
        let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
        let deps = SecurityDeps::new(shared.clone(), Arc::new(ManualClock::new(0)));
        let mut registry = FunctionRegistry::new();
        register(&mut registry, &AppConfig::from_env(), shared, &deps).unwrap();
        (store, registry)
    }

    #[tokio::test]
    async fn register_profile_is_idempotent() {
        let (_store, registry) = setup(&[]).await;
        let caller = Caller::authenticated("new_user");

        let first = registry
            .invoke("registerProfile", json!({"email": "New@Example.com"}), caller.clone())
            .await
            .unwrap();
        assert_eq!(first["created"], json!(true));
        assert_eq!(first["profile"]["role"], json!("member"));
        assert_eq!(first["profile"]["email"], json!("new@example.com"));

        let second = registry.invoke("registerProfile", json!({}), caller).await.unwrap();
        assert_eq!(second["created"], json!(false));
        assert_eq!(second["profile"]["email"], json!("new@example.com"));
    }

    #[tokio::test]
    async fn register_profile_needs_identity() {
        let (_store, registry) = setup(&[]).await;
        let err = registry
            .invoke("registerProfile", json!({}), Caller::anonymous())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn whoami_returns_own_profile() {
        let (_store, registry) = setup(&[("u1", "viewer")]).await;
        let out = registry.invoke("whoami", json!({}), Caller::authenticated("u1")).await.unwrap();
        assert_eq!(out["uid"], json!("u1"));
        assert_eq!(out["role"], json!("viewer"));
    }

    #[tokio::test]
    async fn get_user_profile_requires_manager_or_admin() {
        let (_store, registry) = setup(&[("boss", "manager"), ("u1", "member")]).await;

        let out = registry
            .invoke("getUserProfile", json!({"uid": "u1"}), Caller::authenticated("boss"))
            .await
            .unwrap();
        assert_eq!(out["role"], json!("member"));

        let err = registry
            .invoke("getUserProfile", json!({"uid": "boss"}), Caller::authenticated("u1"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);

        let err = registry
            .invoke("getUserProfile", json!({"uid": "ghost"}), Caller::authenticated("boss"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn set_user_role_updates_profile() {
        let (store, registry) = setup(&[("root", "admin"), ("u1", "member")]).await;

        let out = registry
            .invoke("setUserRole", json!({"uid": "u1", "role": "manager"}), Caller::authenticated("root"))
            .await
            .unwrap();
        assert_eq!(out["role"], json!("manager"));

        let stored = store.get(USER_PROFILES, "u1").await.unwrap().unwrap();
        assert_eq!(stored["role"], json!("manager"));
    }

    #[tokio::test]
    async fn set_user_role_rejects_unknown_role_and_missing_target() {
        let (_store, registry) = setup(&[("root", "admin")]).await;
        let root = Caller::authenticated("root");

        let err = registry
            .invoke("setUserRole", json!({"uid": "root", "role": "overlord"}), root.clone())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let err = registry
            .invoke("setUserRole", json!({"uid": "ghost", "role": "member"}), root)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
