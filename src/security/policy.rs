//! Endpoint policies, declared once when a function is registered.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Validator applied to a named payload field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRule {
    Email,
    Identifier,
}

/// Longest sliding window a policy may declare (one day)
pub const MAX_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub window_ms: u64,
    pub max_requests: u32,
}

impl RateLimit {
    pub fn new(window_ms: u64, max_requests: u32) -> Self {
        Self { window_ms, max_requests }
    }

    /// Overflowing windows saturate and are then refused by `build`
    pub fn per_seconds(window_secs: u64, max_requests: u32) -> Self {
        Self::new(window_secs.checked_mul(1000).unwrap_or(u64::MAX), max_requests)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRules {
    pub required: Vec<String>,
    pub schema: BTreeMap<String, FieldRule>,
}

/// The single authorization check a policy resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Anonymous,
    Authenticated,
    Roles(Vec<String>),
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("endpoint name must not be empty")]
    EmptyName,

    #[error("rate limit for '{0}' needs a window of 1 ms to 1 day and a non-zero max_requests")]
    InvalidRateLimit(String),

    #[error("role list for '{0}' must contain at least one non-empty role")]
    EmptyRoleList(String),

    #[error("validation rules for '{0}' contain an empty field name")]
    EmptyFieldName(String),
}

/// Immutable security policy attached to a registered function
#[derive(Debug, Clone)]
pub struct EndpointPolicy {
    endpoint_name: String,
    access: Access,
    rate_limit: Option<RateLimit>,
    validation: Option<ValidationRules>,
    log_access: bool,
}

impl EndpointPolicy {
    pub fn builder(endpoint_name: impl Into<String>) -> EndpointPolicyBuilder {
        EndpointPolicyBuilder {
            endpoint_name: endpoint_name.into(),
            ..Default::default()
        }
    }

    pub fn endpoint_name(&self) -> &str {
        &self.endpoint_name
    }

    pub fn access(&self) -> &Access {
        &self.access
    }

    pub fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit
    }

    pub fn validation(&self) -> Option<&ValidationRules> {
        self.validation.as_ref()
    }

    pub fn log_access(&self) -> bool {
        self.log_access
    }
}

#[derive(Debug, Clone, Default)]
pub struct EndpointPolicyBuilder {
    endpoint_name: String,
    require_admin: bool,
    require_role: Option<Vec<String>>,
    require_auth: bool,
    rate_limit: Option<RateLimit>,
    validation: Option<ValidationRules>,
    log_access: bool,
}

impl EndpointPolicyBuilder {
    pub fn require_admin(mut self) -> Self {
        self.require_admin = true;
        self
    }

    pub fn require_role<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.require_role = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    pub fn require_auth(mut self) -> Self {
        self.require_auth = true;
        self
    }

    pub fn rate_limit(mut self, limit: RateLimit) -> Self {
        self.rate_limit = Some(limit);
        self
    }

    pub fn required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.validation
            .get_or_insert_with(ValidationRules::default)
            .required
            .extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.validation
            .get_or_insert_with(ValidationRules::default)
            .schema
            .insert(name.into(), rule);
        self
    }

    pub fn log_access(mut self, enabled: bool) -> Self {
        self.log_access = enabled;
        self
    }

    /// Validate the declaration and freeze it.
    ///
    /// Admin beats a role list, which beats plain authentication.
    pub fn build(self) -> Result<EndpointPolicy, PolicyError> {
        let name = self.endpoint_name.trim().to_string();
        if name.is_empty() {
            return Err(PolicyError::EmptyName);
        }

        if let Some(limit) = self.rate_limit {
            if limit.window_ms == 0 || limit.window_ms > MAX_WINDOW_MS || limit.max_requests == 0 {
                return Err(PolicyError::InvalidRateLimit(name));
            }
        }

        if let Some(rules) = &self.validation {
            let blank_required = rules.required.iter().any(|f| f.trim().is_empty());
            let blank_schema = rules.schema.keys().any(|f| f.trim().is_empty());
            if blank_required || blank_schema {
                return Err(PolicyError::EmptyFieldName(name));
            }
        }

        let access = if self.require_admin {
            Access::Admin
        } else if let Some(roles) = self.require_role {
            let roles: Vec<String> = roles.into_iter().filter(|r| !r.trim().is_empty()).collect();
            if roles.is_empty() {
                return Err(PolicyError::EmptyRoleList(name));
            }
            Access::Roles(roles)
        } else if self.require_auth {
            Access::Authenticated
        } else {
            Access::Anonymous
        };

        Ok(EndpointPolicy {
            endpoint_name: name,
            access,
            rate_limit: self.rate_limit,
            validation: self.validation,
            log_access: self.log_access,
        })
    }
}
