//! Append-only security audit log.
//!
//! `log` never fails: an audit outage must not abort the operation being
//! audited. Store errors are reported through `tracing` only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::database::store::{DocumentStore, SECURITY_LOGS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    FailedAuthentication,
    UnauthorizedAccess,
    SuspiciousActivity,
    EndpointAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    High,
    Critical,
}

/// An event as reported by a caller of the logger
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityEvent {
    pub event_type: SecurityEventType,
    pub severity: Severity,
    pub user_id: Option<String>,
    pub action: String,
    pub details: Map<String, Value>,
    pub success: bool,
}

impl SecurityEvent {
    pub fn new(event_type: SecurityEventType, severity: Severity, action: impl Into<String>) -> Self {
        Self {
            event_type,
            severity,
            user_id: None,
            action: action.into(),
            details: Map::new(),
            success: false,
        }
    }

    pub fn user(mut self, user_id: Option<&str>) -> Self {
        self.user_id = user_id.map(str::to_string);
        self
    }

    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }
}

/// Stored form of a security event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: SecurityEventType,
    pub severity: Severity,
    pub user_id: Option<String>,
    pub action: String,
    pub details: Map<String, Value>,
    pub success: bool,
}

impl SecurityLogEntry {
    fn stamp(event: SecurityEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type: event.event_type,
            severity: event.severity,
            user_id: event.user_id,
            action: event.action,
            details: event.details,
            success: event.success,
        }
    }
}

#[derive(Clone)]
pub struct SecurityLogger {
    store: Arc<dyn DocumentStore>,
    persist: bool,
}

impl SecurityLogger {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store, persist: true }
    }

    /// Keep the tracing mirror but skip writes to the store
    pub fn with_persistence(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub async fn log(&self, event: SecurityEvent) {
        let entry = SecurityLogEntry::stamp(event);

        match entry.severity {
            Severity::Info => tracing::info!(
                target: "taskflow::security",
                event_type = ?entry.event_type,
                user_id = entry.user_id.as_deref().unwrap_or("-"),
                success = entry.success,
                "{}", entry.action
            ),
            Severity::Warning => tracing::warn!(
                target: "taskflow::security",
                event_type = ?entry.event_type,
                user_id = entry.user_id.as_deref().unwrap_or("-"),
                success = entry.success,
                "{}", entry.action
            ),
            Severity::High | Severity::Critical => tracing::warn!(
                target: "taskflow::security",
                event_type = ?entry.event_type,
                severity = ?entry.severity,
                user_id = entry.user_id.as_deref().unwrap_or("-"),
                success = entry.success,
                "{}", entry.action
            ),
        }

        if !self.persist {
            return;
        }

        let document = match serde_json::to_value(&entry) {
            Ok(document) => document,
            Err(e) => {
                tracing::error!("Failed to serialize security log entry: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.insert(SECURITY_LOGS, document).await {
            tracing::error!("Failed to write security log entry '{}': {}", entry.action, e);
        }
    }

    pub async fn log_failed_auth(&self, user_id: Option<&str>, reason: &str) {
        self.log(
            SecurityEvent::new(SecurityEventType::FailedAuthentication, Severity::Warning, "authentication")
                .user(user_id)
                .detail("reason", reason),
        )
        .await
    }

    pub async fn log_unauthorized_access(&self, user_id: Option<&str>, resource: &str) {
        self.log(
            SecurityEvent::new(SecurityEventType::UnauthorizedAccess, Severity::High, "access_denied")
                .user(user_id)
                .detail("resource", resource),
        )
        .await
    }

    pub async fn log_suspicious_activity(&self, user_id: Option<&str>, activity: &str, details: Map<String, Value>) {
        let mut event = SecurityEvent::new(SecurityEventType::SuspiciousActivity, Severity::Critical, activity)
            .user(user_id);
        event.details = details;
        self.log(event).await
    }
}
