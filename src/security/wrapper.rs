//! Secured function pipeline.
//!
//! Every registered function runs through the same fixed sequence of
//! stages. The first failing stage ends the call; the handler only runs
//! once all of them pass.
//!
//! ```text
//! RateLimit → Validation → Authorization → Handler → access log
//! ```

use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::database::models::UserProfile;
use crate::database::store::DocumentStore;

use super::context::{CallContext, Caller};
use super::error::{ErrorKind, SecurityError};
use super::logger::{SecurityEvent, SecurityEventType, SecurityLogger, Severity};
use super::permissions::PermissionChecker;
use super::policy::{Access, EndpointPolicy};
use super::rate_limiter::{RateLimitDecision, RateLimiter};
use super::validator;

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    RateLimit,
    Validation,
    Authorization,
    Handler,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::RateLimit => "rate_limit",
            PipelineStage::Validation => "validation",
            PipelineStage::Authorization => "authorization",
            PipelineStage::Handler => "handler",
        }
    }
}

/// Business logic behind a secured function
pub trait FunctionHandler<E>: Send + Sync {
    fn call(&self, payload: Value, ctx: CallContext) -> BoxFuture<'static, Result<Value, E>>;
}

impl<E, F, Fut> FunctionHandler<E> for F
where
    F: Fn(Value, CallContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, E>> + Send + 'static,
{
    fn call(&self, payload: Value, ctx: CallContext) -> BoxFuture<'static, Result<Value, E>> {
        Box::pin(self(payload, ctx))
    }
}

/// Collaborators shared by every secured function
#[derive(Clone)]
pub struct SecurityDeps {
    pub limiter: RateLimiter,
    pub permissions: PermissionChecker,
    pub logger: SecurityLogger,
}

impl SecurityDeps {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        let logger = SecurityLogger::new(store.clone());
        Self::with_logger(store, clock, logger)
    }

    pub fn with_logger(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, logger: SecurityLogger) -> Self {
        Self {
            limiter: RateLimiter::new(store.clone(), clock),
            permissions: PermissionChecker::new(store, logger.clone()),
            logger,
        }
    }
}

/// A handler bound to its policy and collaborators
pub struct SecuredHandler<E> {
    handler: Arc<dyn FunctionHandler<E>>,
    policy: Arc<EndpointPolicy>,
    deps: SecurityDeps,
}

impl<E> Clone for SecuredHandler<E> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            policy: self.policy.clone(),
            deps: self.deps.clone(),
        }
    }
}

pub fn build_secured_handler<E, H>(handler: H, policy: EndpointPolicy, deps: SecurityDeps) -> SecuredHandler<E>
where
    H: FunctionHandler<E> + 'static,
{
    SecuredHandler {
        handler: Arc::new(handler),
        policy: Arc::new(policy),
        deps,
    }
}

impl<E> SecuredHandler<E>
where
    E: From<SecurityError> + ErrorKind + Display + Send + 'static,
{
    pub fn policy(&self) -> &EndpointPolicy {
        &self.policy
    }

    /// Run the pipeline. Handler errors come back exactly as the handler
    /// returned them; pipeline failures are converted with `E::from`.
    pub async fn call(&self, payload: Value, caller: Caller) -> Result<Value, E> {
        let started = Instant::now();

        let (stage, outcome) = match self.guard(payload, &caller).await {
            Ok((payload, profile)) => {
                let ctx = CallContext {
                    endpoint: self.policy.endpoint_name().to_string(),
                    caller: caller.clone(),
                    profile,
                };
                (PipelineStage::Handler, self.handler.call(payload, ctx).await)
            }
            Err((stage, err)) => {
                tracing::debug!(
                    "Function '{}' stopped at {} stage: {}",
                    self.policy.endpoint_name(),
                    stage.as_str(),
                    err
                );
                (stage, Err(E::from(err)))
            }
        };

        if self.policy.log_access() {
            self.log_access(&caller, stage, &outcome, started.elapsed()).await;
        }

        outcome
    }

    async fn guard(
        &self,
        payload: Value,
        caller: &Caller,
    ) -> Result<(Value, Option<UserProfile>), (PipelineStage, SecurityError)> {
        if let Some(limit) = self.policy.rate_limit() {
            let key = caller.scope_key(self.policy.endpoint_name());
            if let RateLimitDecision::Rejected { retry_after_seconds } = self.deps.limiter.check(&key, limit).await {
                return Err((
                    PipelineStage::RateLimit,
                    SecurityError::RateLimitExceeded { retry_after_seconds },
                ));
            }
        }

        let payload = match self.policy.validation() {
            Some(rules) => {
                let object = payload
                    .as_object()
                    .ok_or_else(|| (PipelineStage::Validation, SecurityError::validation("Payload must be a JSON object")))?;
                validator::require_fields(object, &rules.required)
                    .and_then(|_| validator::sanitize_object(object, &rules.schema))
                    .map(Value::Object)
                    .map_err(|e| (PipelineStage::Validation, e))?
            }
            None => payload,
        };

        let checks = &self.deps.permissions;
        let profile = match self.policy.access() {
            Access::Admin => Some(checks.require_admin(caller).await),
            Access::Roles(roles) => Some(checks.require_role(caller, roles).await),
            Access::Authenticated => Some(checks.require_authenticated(caller).await),
            Access::Anonymous => None,
        }
        .transpose()
        .map_err(|e| (PipelineStage::Authorization, e))?;

        Ok((payload, profile))
    }

    async fn log_access(&self, caller: &Caller, stage: PipelineStage, outcome: &Result<Value, E>, elapsed: Duration) {
        let severity = if outcome.is_ok() { Severity::Info } else { Severity::Warning };
        let mut event = SecurityEvent::new(SecurityEventType::EndpointAccess, severity, self.policy.endpoint_name())
            .user(caller.uid())
            .success(outcome.is_ok())
            .detail("elapsed_ms", elapsed.as_millis() as u64);

        if let Err(err) = outcome {
            event = event
                .detail("stage", stage.as_str())
                .detail("error_kind", err.kind())
                .detail("error_message", err.to_string());
        }

        self.deps.logger.log(event).await;
    }
}
