use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{DocumentStore, StoreError, TxBody, TxOutcome};

type Collections = HashMap<String, HashMap<String, Value>>;

/// In-process document store.
///
/// Transactions hold the write lock for the whole read-modify-write, which
/// gives the same per-key serializability as the Postgres adapter. Clones
/// share state. `set_unavailable(true)` makes every call fail with
/// `StoreError::Unavailable`, for exercising dependency-error paths.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<Collections>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Seed or overwrite a record directly, bypassing transactions
    pub async fn put(&self, collection: &str, key: &str, document: Value) {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), document);
    }

    /// All records of a collection (order unspecified)
    pub async fn documents(&self, collection: &str) -> Vec<Value> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn transact(
        &self,
        collection: &str,
        key: &str,
        body: &mut TxBody<'_>,
    ) -> Result<TxOutcome, StoreError> {
        self.check_available()?;

        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        let current = docs.get(key).cloned();

        let outcome = body(current);
        if let TxOutcome::Commit(document) = &outcome {
            docs.insert(key.to_string(), document.clone());
        }
        Ok(outcome)
    }

    async fn insert(&self, collection: &str, document: Value) -> Result<String, StoreError> {
        self.check_available()?;

        let id = Uuid::new_v4().to_string();
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), document);
        Ok(id)
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        self.check_available()?;

        let collections = self.collections.read().await;
        Ok(collections.get(collection).and_then(|docs| docs.get(key)).cloned())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn transact_commits_and_aborts() {
        let store = MemoryStore::new();

        let outcome = store
            .transact("c", "k", &mut |current: Option<Value>| {
                assert!(current.is_none());
                TxOutcome::Commit(json!({"n": 1}))
            })
            .await
            .unwrap();
        assert_eq!(outcome, TxOutcome::Commit(json!({"n": 1})));

        store
            .transact("c", "k", &mut |current: Option<Value>| {
                assert_eq!(current, Some(json!({"n": 1})));
                TxOutcome::Abort
            })
            .await
            .unwrap();

        assert_eq!(store.get("c", "k").await.unwrap(), Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn insert_generates_distinct_ids() {
        let store = MemoryStore::new();
        let a = store.insert("logs", json!({"a": 1})).await.unwrap();
        let b = store.insert("logs", json!({"b": 2})).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.documents("logs").await.len(), 2);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        assert!(matches!(store.get("c", "k").await, Err(StoreError::Unavailable(_))));
        assert!(store.insert("c", json!({})).await.is_err());
        assert!(store.ping().await.is_err());

        store.set_unavailable(false);
        assert!(store.ping().await.is_ok());
    }
}
