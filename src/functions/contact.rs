use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::FunctionRegistry;
use crate::database::store::{DocumentStore, CONTACT_MESSAGES};
use crate::error::ApiError;
use crate::security::{CallContext, EndpointPolicy, FieldRule, PolicyError, RateLimit, SecurityDeps, SecurityLogger};

pub const MAX_MESSAGE_CHARS: usize = 5000;

pub fn register(
    registry: &mut FunctionRegistry,
    store: Arc<dyn DocumentStore>,
    deps: &SecurityDeps,
) -> Result<(), PolicyError> {
    let logger = deps.logger.clone();
    registry.register(
        move |payload: Value, ctx: CallContext| submit_contact_form(store.clone(), logger.clone(), payload, ctx),
        EndpointPolicy::builder("submitContactForm")
            .rate_limit(RateLimit::per_seconds(60, 5))
            .required(["email", "message"])
            .field("email", FieldRule::Email)
            .log_access(true)
            .build()?,
        deps,
    );
    Ok(())
}

/// Store a sanitized contact message. Anyone may call this, so oversized
/// bodies are flagged before they are refused.
async fn submit_contact_form(
    store: Arc<dyn DocumentStore>,
    logger: SecurityLogger,
    payload: Value,
    ctx: CallContext,
) -> Result<Value, ApiError> {
    let message = payload["message"]
        .as_str()
        .ok_or_else(|| ApiError::validation_error("message must be a string", None))?;

    let length = message.chars().count();
    if length > MAX_MESSAGE_CHARS {
        let mut details = Map::new();
        details.insert("endpoint".into(), json!(ctx.endpoint));
        details.insert("length".into(), json!(length));
        details.insert("client_addr".into(), json!(ctx.caller.client_addr));
        logger
            .log_suspicious_activity(ctx.caller.uid(), "oversized_contact_message", details)
            .await;

        return Err(ApiError::validation_error(
            format!("message exceeds {} characters", MAX_MESSAGE_CHARS),
            None,
        ));
    }

    let document = json!({
        "email": payload["email"],
        "name": payload.get("name").cloned().unwrap_or(Value::Null),
        "message": message,
        "submitted_by": ctx.caller.uid(),
        "created_at": Utc::now().to_rfc3339(),
    });

    let id = store.insert(CONTACT_MESSAGES, document).await?;
    tracing::info!("Contact message {} received", id);
    Ok(json!({ "id": id }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::database::store::SECURITY_LOGS;
    use crate::database::MemoryStore;
    use crate::security::{Caller, SecurityLogEntry, SecurityEventType};

    fn setup() -> (MemoryStore, FunctionRegistry) {
        let store = MemoryStore::new();
        let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
        let deps = SecurityDeps::new(shared.clone(), Arc::new(ManualClock::new(0)));
        let mut registry = FunctionRegistry::new();
        register(&mut registry, shared, &deps).unwrap();
        (store, registry)
    }

    fn visitor() -> Caller {
        Caller::anonymous().with_client_addr("203.0.113.7")
    }

    #[tokio::test]
    async fn stores_sanitized_message() {
        let (store, registry) = setup();

        let out = registry
            .invoke(
                "submitContactForm",
                json!({"email": " Visitor@Example.COM ", "name": "<b>Ann</b>", "message": "hello <script>x</script>"}),
                visitor(),
            )
            .await
            .unwrap();
        assert!(out["id"].is_string());

        let messages = store.documents(CONTACT_MESSAGES).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["email"], json!("visitor@example.com"));
        assert!(!messages[0]["message"].as_str().unwrap().contains('<'));
        assert!(!messages[0]["name"].as_str().unwrap().contains('<'));
    }

    #[tokio::test]
    async fn missing_fields_are_reported_together() {
        let (_store, registry) = setup();
        let err = registry
            .invoke("submitContactForm", json!({"message": ""}), visitor())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.message().contains("email"));
        assert!(err.message().contains("message"));
    }

    #[tokio::test]
    async fn oversized_message_is_flagged() {
        let (store, registry) = setup();
        let err = registry
            .invoke(
                "submitContactForm",
                json!({"email": "a@b.co", "message": "x".repeat(MAX_MESSAGE_CHARS + 1)}),
                visitor(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(store.documents(CONTACT_MESSAGES).await.is_empty());

        let entries: Vec<SecurityLogEntry> = store
            .documents(SECURITY_LOGS)
            .await
            .into_iter()
            .map(|d| serde_json::from_value(d).unwrap())
            .collect();
        assert!(entries
            .iter()
            .any(|e| e.event_type == SecurityEventType::SuspiciousActivity));
    }

    #[tokio::test]
    async fn sixth_submission_in_a_minute_is_rejected() {
        let (_store, registry) = setup();
        let payload = json!({"email": "a@b.co", "message": "hi"});

        for _ in 0..5 {
            registry.invoke("submitContactForm", payload.clone(), visitor()).await.unwrap();
        }
        let err = registry
            .invoke("submitContactForm", payload, visitor())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 429);
    }
}
