//! Job progress records
//!
//! One record per graph lives in the ephemeral store under `progress:{graph}`
//! as JSON. State changes that decide who owns a graph go through
//! compare-and-swap on the serialized record.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::EphemeralStore;
use crate::error::{Error, Result};

/// Lifecycle of a generation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    #[serde(rename = "error")]
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether a job in this state still owns its graph
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Polled view of a graph's generation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub graph_id: String,
    pub job_id: String,
    pub status: JobStatus,
    /// Pairs the job will look at
    pub total: u64,
    pub processed: u64,
    /// Suggestions stored
    pub created: u64,
    /// Pairs dropped because of a pair-level error
    pub skipped: u64,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ProgressRecord {
    pub fn queued(graph_id: impl Into<String>) -> Self {
        Self {
            graph_id: graph_id.into(),
            job_id: Uuid::new_v4().to_string(),
            status: JobStatus::Queued,
            total: 0,
            processed: 0,
            created: 0,
            skipped: 0,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// Share of pairs processed, as a percentage
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            if self.status == JobStatus::Completed { 100.0 } else { 0.0 }
        } else {
            100.0 * self.processed as f64 / self.total as f64
        }
    }

    pub(crate) fn started(mut self) -> Self {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        self
    }

    pub(crate) fn finish(&mut self, status: JobStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.finished_at = Some(Utc::now());
    }
}

pub fn progress_key(graph_id: &str) -> String {
    format!("progress:{}", graph_id)
}

/// A record together with the exact text it was read from
#[derive(Debug, Clone)]
pub(crate) struct Versioned {
    pub raw: String,
    pub record: ProgressRecord,
}

/// Reads and writes progress records
#[derive(Clone)]
pub(crate) struct ProgressBoard {
    cache: Arc<dyn EphemeralStore>,
    ttl: Duration,
}

impl ProgressBoard {
    pub fn new(cache: Arc<dyn EphemeralStore>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub async fn get(&self, graph_id: &str) -> Result<Option<ProgressRecord>> {
        Ok(self.get_versioned(graph_id).await?.map(|v| v.record))
    }

    pub async fn get_versioned(&self, graph_id: &str) -> Result<Option<Versioned>> {
        let Some(raw) = self.cache.get(&progress_key(graph_id)).await? else {
            return Ok(None);
        };
        let record = serde_json::from_str(&raw)
            .map_err(|e| Error::CacheError(format!("corrupt progress record for {}: {}", graph_id, e)))?;
        Ok(Some(Versioned { raw, record }))
    }

    /// Overwrite the record
    pub async fn put(&self, record: &ProgressRecord) -> Result<()> {
        let raw = serde_json::to_string(record)?;
        self.cache.set(&progress_key(&record.graph_id), &raw, self.ttl).await
    }

    /// Write `record` only if the stored record is still `expected`
    pub async fn swap(&self, expected: Option<&Versioned>, record: &ProgressRecord) -> Result<bool> {
        let raw = serde_json::to_string(record)?;
        self.cache
            .compare_and_swap(
                &progress_key(&record.graph_id),
                expected.map(|v| v.raw.as_str()),
                &raw,
                self.ttl,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryEphemeralStore;

    fn board() -> ProgressBoard {
        ProgressBoard::new(Arc::new(InMemoryEphemeralStore::new()), Duration::from_secs(60))
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&JobStatus::Failed).unwrap(), "\"error\"");
        assert_eq!(serde_json::to_string(&JobStatus::Queued).unwrap(), "\"queued\"");
        assert!(JobStatus::Running.is_active());
        assert!(!JobStatus::Cancelled.is_active());
    }

    #[test]
    fn test_percent() {
        let mut record = ProgressRecord::queued("saga");
        assert_eq!(record.percent(), 0.0);
        record.total = 8;
        record.processed = 2;
        assert_eq!(record.percent(), 25.0);

        let mut empty = ProgressRecord::queued("saga");
        empty.finish(JobStatus::Completed, None);
        assert_eq!(empty.percent(), 100.0);
    }

    #[tokio::test]
    async fn test_swap_detects_concurrent_change() {
        let board = board();
        let queued = ProgressRecord::queued("saga");
        assert!(board.swap(None, &queued).await.unwrap());
        assert!(!board.swap(None, &queued).await.unwrap());

        let seen = board.get_versioned("saga").await.unwrap().unwrap();
        let running = seen.record.clone().started();
        assert!(board.swap(Some(&seen), &running).await.unwrap());

        // the old version no longer matches
        let mut cancelled = seen.record.clone();
        cancelled.finish(JobStatus::Cancelled, None);
        assert!(!board.swap(Some(&seen), &cancelled).await.unwrap());
        assert_eq!(
            board.get("saga").await.unwrap().unwrap().status,
            JobStatus::Running
        );
    }

    #[tokio::test]
    async fn test_corrupt_record() {
        let cache = Arc::new(InMemoryEphemeralStore::new());
        cache
            .set("progress:saga", "not json", Duration::from_secs(60))
            .await
            .unwrap();
        let board = ProgressBoard::new(cache, Duration::from_secs(60));
        assert!(matches!(board.get("saga").await, Err(Error::CacheError(_))));
    }
}
