use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::store::{DocumentStore, StoreError, TxBody, TxOutcome};

/// DocumentStore backed by a single `documents` JSONB table.
///
/// `transact` takes a transaction-scoped advisory lock on the
/// (collection, key) pair before reading, so concurrent transactions on
/// the same key queue up even when the row does not exist yet.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => StoreError::Timeout("timed out acquiring a connection".to_string()),
        sqlx::Error::PoolClosed => StoreError::Unavailable("connection pool closed".to_string()),
        sqlx::Error::Io(e) => StoreError::Unavailable(e.to_string()),
        other => StoreError::Sqlx(other),
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn transact(
        &self,
        collection: &str,
        key: &str,
        body: &mut TxBody<'_>,
    ) -> Result<TxOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1 || '/' || $2, 0))")
            .bind(collection)
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        let current: Option<Value> = sqlx::query("SELECT body FROM documents WHERE collection = $1 AND key = $2")
            .bind(collection)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx)?
            .map(|row| row.get("body"));

        let outcome = body(current);
        match &outcome {
            TxOutcome::Commit(document) => {
                sqlx::query(
                    r#"
                    INSERT INTO documents (collection, key, body)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (collection, key)
                    DO UPDATE SET body = EXCLUDED.body, updated_at = now()
                    "#,
                )
                .bind(collection)
                .bind(key)
                .bind(document)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
                tx.commit().await.map_err(map_sqlx)?;
            }
            TxOutcome::Abort => {
                tx.rollback().await.map_err(map_sqlx)?;
            }
        }

        Ok(outcome)
    }

    async fn insert(&self, collection: &str, document: Value) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO documents (collection, key, body) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(&id)
            .bind(&document)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(id)
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = $1 AND key = $2")
            .bind(collection)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(row.map(|row| row.get("body")))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(map_sqlx)?;
        Ok(())
    }
}
