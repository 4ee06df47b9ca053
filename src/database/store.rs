use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Collection holding one sliding-window record per scope key
pub const RATE_LIMITS: &str = "rate_limits";
/// Append-only audit collection
pub const SECURITY_LOGS: &str = "security_logs";
/// Caller profiles keyed by uid
pub const USER_PROFILES: &str = "user_profiles";
/// Public contact form submissions
pub const CONTACT_MESSAGES: &str = "contact_messages";

/// Errors from a document store adapter
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store operation timed out: {0}")]
    Timeout(String),

    #[error("Document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// What a transaction body decided to do with the record it read
#[derive(Debug, Clone, PartialEq)]
pub enum TxOutcome {
    /// Replace (or create) the record with this document
    Commit(Value),
    /// Leave the record untouched
    Abort,
}

/// Transaction body: receives the current document (None if absent).
/// Adapters may call it more than once if they retry on contention,
/// so it must not assume a single invocation.
pub type TxBody<'a> = dyn FnMut(Option<Value>) -> TxOutcome + Send + 'a;

/// Persistence port shared by the rate limiter, security logger and
/// permission checker
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Atomic read-modify-write of a single keyed record. Concurrent
    /// transactions on the same (collection, key) are serialized.
    async fn transact(
        &self,
        collection: &str,
        key: &str,
        body: &mut TxBody<'_>,
    ) -> Result<TxOutcome, StoreError>;

    /// Append a new record under a generated id and return the id
    async fn insert(&self, collection: &str, document: Value) -> Result<String, StoreError>;

    /// Point lookup by key
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// Cheap connectivity check for the health endpoint
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
