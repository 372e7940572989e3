//! Ephemeral key-value storage with expiry
//!
//! Progress records, rate-limit windows and learning cooldown markers live
//! here rather than in the database. They are short-lived by nature and are
//! polled, never pushed.

mod ttl;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use ttl::TtlCache;

/// Short-lived key-value store shared by scheduler and learning engine
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Get a live value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a value that expires after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Delete a value, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically replace the value if it currently equals `expected`
    ///
    /// `expected == None` succeeds only when the key is absent or expired.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool>;
}

/// Process-local [`EphemeralStore`]
#[derive(Debug, Default)]
pub struct InMemoryEphemeralStore {
    entries: TtlCache<String, String>,
}

impl InMemoryEphemeralStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EphemeralStore for InMemoryEphemeralStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(&key.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string(), ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(&key.to_string()))
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let expected = expected.map(str::to_string);
        Ok(self
            .entries
            .compare_and_swap(key.to_string(), expected.as_ref(), new.to_string(), ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryEphemeralStore::new();
        let ttl = Duration::from_secs(60);

        assert!(store.get("progress:saga").await.unwrap().is_none());
        store.set("progress:saga", "queued", ttl).await.unwrap();
        assert_eq!(
            store.get("progress:saga").await.unwrap().as_deref(),
            Some("queued")
        );

        assert!(store.delete("progress:saga").await.unwrap());
        assert!(!store.delete("progress:saga").await.unwrap());
    }

    #[tokio::test]
    async fn test_cas_only_one_winner() {
        let store = InMemoryEphemeralStore::new();
        let ttl = Duration::from_secs(60);

        let first = store.compare_and_swap("lock", None, "a", ttl).await.unwrap();
        let second = store.compare_and_swap("lock", None, "b", ttl).await.unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("a"));
    }
}
