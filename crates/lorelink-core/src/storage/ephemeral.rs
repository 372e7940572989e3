//! SQLite-backed ephemeral store
//!
//! Lets several processes sharing one database see the same progress
//! records, rate windows and cooldown markers. Expiry is wall-clock unix
//! milliseconds; expired rows are invisible and cleared by
//! [`SqliteEphemeralStore::purge_expired`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::cache::EphemeralStore;
use crate::error::Result;

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry(ttl: Duration) -> i64 {
    now_millis().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

/// [`EphemeralStore`] over the `ephemeral_entries` table
#[derive(Clone)]
pub struct SqliteEphemeralStore {
    pool: SqlitePool,
}

impl SqliteEphemeralStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delete expired rows, returning how many were removed
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM ephemeral_entries WHERE expires_at <= ?")
            .bind(now_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl EphemeralStore for SqliteEphemeralStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM ephemeral_entries WHERE key = ? AND expires_at > ?")
                .bind(key)
                .bind(now_millis())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ephemeral_entries (key, value, expires_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expiry(ttl))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed: Option<(i64,)> =
            sqlx::query_as("DELETE FROM ephemeral_entries WHERE key = ? RETURNING expires_at")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(removed.is_some_and(|(expires_at,)| expires_at > now_millis()))
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let now = now_millis();
        let result = match expected {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO ephemeral_entries (key, value, expires_at) VALUES (?, ?, ?)
                    ON CONFLICT(key) DO UPDATE
                        SET value = excluded.value, expires_at = excluded.expires_at
                        WHERE ephemeral_entries.expires_at <= ?
                    "#,
                )
                .bind(key)
                .bind(new)
                .bind(expiry(ttl))
                .bind(now)
                .execute(&self.pool)
                .await?
            }
            Some(current) => {
                sqlx::query(
                    r#"
                    UPDATE ephemeral_entries SET value = ?, expires_at = ?
                    WHERE key = ? AND value = ? AND expires_at > ?
                    "#,
                )
                .bind(new)
                .bind(expiry(ttl))
                .bind(key)
                .bind(current)
                .bind(now)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    const HOUR: Duration = Duration::from_secs(3600);

    async fn store() -> SqliteEphemeralStore {
        let db = Database::in_memory().await.expect("Failed to create database");
        SqliteEphemeralStore::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = store().await;
        assert_eq!(store.get("progress:saga").await.unwrap(), None);

        store.set("progress:saga", "one", HOUR).await.unwrap();
        store.set("progress:saga", "two", HOUR).await.unwrap();
        assert_eq!(store.get("progress:saga").await.unwrap().as_deref(), Some("two"));

        assert!(store.delete("progress:saga").await.unwrap());
        assert!(!store.delete("progress:saga").await.unwrap());
        assert_eq!(store.get("progress:saga").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible() {
        let store = store().await;
        store.set("rate:saga", "[]", Duration::ZERO).await.unwrap();
        assert_eq!(store.get("rate:saga").await.unwrap(), None);
        assert!(!store.delete("rate:saga").await.unwrap());

        store.set("rate:saga", "[]", Duration::ZERO).await.unwrap();
        store.set("rate:coast", "[]", HOUR).await.unwrap();
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.get("rate:coast").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let store = store().await;

        assert!(store.compare_and_swap("k", None, "a", HOUR).await.unwrap());
        assert!(!store.compare_and_swap("k", None, "b", HOUR).await.unwrap());
        assert!(!store.compare_and_swap("k", Some("x"), "b", HOUR).await.unwrap());
        assert!(store.compare_and_swap("k", Some("a"), "b", HOUR).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));

        // an expired value counts as absent
        store.set("k", "stale", Duration::ZERO).await.unwrap();
        assert!(!store.compare_and_swap("k", Some("stale"), "c", HOUR).await.unwrap());
        assert!(store.compare_and_swap("k", None, "c", HOUR).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("c"));
    }
}
