//! Sliding-window rate limiter over the document store.
//!
//! One record per scope key holds the admitted timestamps of the current
//! window. Check-and-increment runs inside a store transaction so that
//! concurrent callers on the same key cannot both take the last slot.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::clock::Clock;
use crate::database::store::{DocumentStore, TxOutcome, RATE_LIMITS};

use super::policy::RateLimit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Rejected { retry_after_seconds: u64 },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

/// Stored window for one scope key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    #[serde(default)]
    pub timestamps: Vec<i64>,
    #[serde(default)]
    pub last_update: i64,
}

impl RateLimitWindow {
    /// Unreadable documents count as an empty window
    fn from_document(document: Option<Value>) -> Self {
        match document {
            Some(doc) => serde_json::from_value(doc).unwrap_or_else(|e| {
                tracing::warn!("Discarding malformed rate limit window: {}", e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Prune to `(now - window, now]`, then admit `now` if there is room.
    /// Timestamps ahead of `now` (a replica with a fast clock) are dropped.
    fn admit(mut self, now: i64, limit: RateLimit) -> (RateLimitDecision, Option<Self>) {
        let window_ms = i64::try_from(limit.window_ms).unwrap_or(i64::MAX);
        let cutoff = now.saturating_sub(window_ms);
        self.timestamps.retain(|&t| t > cutoff && t <= now);
        self.timestamps.sort_unstable();

        let max = limit.max_requests as usize;
        if self.timestamps.len() >= max {
            let oldest = self.timestamps.first().copied().unwrap_or(now);
            let wait_ms = oldest.saturating_add(window_ms).saturating_sub(now).max(0);
            let retry_after_seconds = (wait_ms / 1000 + i64::from(wait_ms % 1000 != 0)).max(1) as u64;
            return (RateLimitDecision::Rejected { retry_after_seconds }, None);
        }

        self.timestamps.push(now);
        self.last_update = now;
        let remaining = (max - self.timestamps.len()) as u32;
        (RateLimitDecision::Allowed { remaining }, Some(self))
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Check and count one request against `scope_key`.
    ///
    /// A store failure admits the request (fail open) with the full quota
    /// reported as remaining. Only a full window rejects.
    pub async fn check(&self, scope_key: &str, limit: RateLimit) -> RateLimitDecision {
        let now = self.clock.now_ms();
        let mut decision = None;

        let mut body = |current: Option<Value>| {
            let (verdict, updated) = RateLimitWindow::from_document(current).admit(now, limit);
            decision = Some(verdict);
            match updated.map(serde_json::to_value) {
                Some(Ok(document)) => TxOutcome::Commit(document),
                Some(Err(e)) => {
                    tracing::error!("Failed to serialize rate limit window: {}", e);
                    TxOutcome::Abort
                }
                None => TxOutcome::Abort,
            }
        };

        let result = self.store.transact(RATE_LIMITS, scope_key, &mut body).await;

        match (result, decision) {
            (Ok(_), Some(verdict)) => {
                if let RateLimitDecision::Rejected { retry_after_seconds } = verdict {
                    tracing::warn!(
                        "Rate limit exceeded for '{}' (retry after {}s)",
                        scope_key,
                        retry_after_seconds
                    );
                }
                verdict
            }
            (Ok(_), None) => {
                tracing::error!("Rate limit transaction for '{}' finished without a decision", scope_key);
                RateLimitDecision::Allowed { remaining: limit.max_requests }
            }
            (Err(e), _) => {
                tracing::error!("Rate limiter store error for '{}', failing open: {}", scope_key, e);
                RateLimitDecision::Allowed { remaining: limit.max_requests }
            }
        }
    }
}
