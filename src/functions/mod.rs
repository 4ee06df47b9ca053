//! Registered functions, each bound to its endpoint policy.

pub mod contact;
pub mod profile;

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::DocumentStore;
use crate::error::ApiError;
use crate::security::{build_secured_handler, Caller, EndpointPolicy, FunctionHandler, SecuredHandler, SecurityDeps};

/// Name → secured handler lookup used by the HTTP dispatcher
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, SecuredHandler<ApiError>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler to its policy. A later registration under the same
    /// name replaces the earlier one.
    pub fn register<H>(&mut self, handler: H, policy: EndpointPolicy, deps: &SecurityDeps)
    where
        H: FunctionHandler<ApiError> + 'static,
    {
        let name = policy.endpoint_name().to_string();
        if self.functions.contains_key(&name) {
            tracing::warn!("Function '{}' registered twice, replacing", name);
        }
        self.functions
            .insert(name.clone(), build_secured_handler(handler, policy, deps.clone()));
        tracing::debug!("Registered function '{}'", name);
    }

    pub fn get(&self, name: &str) -> Option<&SecuredHandler<ApiError>> {
        self.functions.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub async fn invoke(&self, name: &str, payload: Value, caller: Caller) -> Result<Value, ApiError> {
        let function = self
            .get(name)
            .ok_or_else(|| ApiError::not_found(format!("Function '{}' not found", name)))?;
        function.call(payload, caller).await
    }
}

/// Registry with every built-in function
pub fn default_registry(
    config: &AppConfig,
    store: Arc<dyn DocumentStore>,
    deps: &SecurityDeps,
) -> Result<FunctionRegistry, crate::security::PolicyError> {
    let mut registry = FunctionRegistry::new();
    profile::register(&mut registry, config, store.clone(), deps)?;
    contact::register(&mut registry, store, deps)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::database::MemoryStore;
    use crate::security::CallContext;
    use serde_json::json;

    #[tokio::test]
    async fn unknown_function_is_not_found() {
        let registry = FunctionRegistry::new();
        let err = registry.invoke("nope", json!({}), Caller::anonymous()).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn dispatches_by_name() {
        let store = MemoryStore::new();
        let deps = SecurityDeps::new(Arc::new(store), Arc::new(ManualClock::new(0)));
        let mut registry = FunctionRegistry::new();
        registry.register(
            |payload: Value, _ctx: CallContext| async move { Ok::<_, ApiError>(json!({ "echo": payload })) },
            EndpointPolicy::builder("echo").build().unwrap(),
            &deps,
        );

        let out = registry.invoke("echo", json!(1), Caller::anonymous()).await.unwrap();
        assert_eq!(out, json!({ "echo": 1 }));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["echo"]);
    }

    #[tokio::test]
    async fn default_registry_exposes_builtins() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let deps = SecurityDeps::new(store.clone(), Arc::new(ManualClock::new(0)));
        let config = AppConfig::from_env();

        let registry = default_registry(&config, store, &deps).unwrap();
        let names: Vec<&str> = registry.names().collect();
        for expected in ["getUserProfile", "registerProfile", "setUserRole", "submitContactForm", "whoami"] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
    }
}
