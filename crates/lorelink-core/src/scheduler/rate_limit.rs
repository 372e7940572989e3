//! Per-graph job rate limiting
//!
//! Keeps the start times of recent jobs under `rate:{graph}` and refuses a
//! new job once the rolling window is full. A slot that ends up unused, for
//! instance because another scheduler claimed the graph first, is handed
//! back with [`RateLimiter::release`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::EphemeralStore;
use crate::error::Result;

/// Attempts before giving up on a contended window
const MAX_CAS_ATTEMPTS: usize = 8;

pub fn rate_key(graph_id: &str) -> String {
    format!("rate:{}", graph_id)
}

/// A start recorded in a graph's window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSlot {
    started_at: DateTime<Utc>,
}

/// Rolling-window limiter over the ephemeral store
#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn EphemeralStore>,
    max_jobs: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn EphemeralStore>, max_jobs: u32, window: Duration) -> Self {
        Self {
            cache,
            max_jobs,
            window,
        }
    }

    /// Take a slot for a new job if the window allows one
    pub async fn try_acquire(&self, graph_id: &str) -> Result<Option<RateSlot>> {
        self.try_acquire_at(graph_id, Utc::now()).await
    }

    pub(crate) async fn try_acquire_at(
        &self,
        graph_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RateSlot>> {
        let key = rate_key(graph_id);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let raw = self.cache.get(&key).await?;
            let mut starts = self.live_starts(raw.as_deref(), now);
            if starts.len() >= self.max_jobs as usize {
                return Ok(None);
            }
            starts.push(now);

            let next = serde_json::to_string(&starts)?;
            if self
                .cache
                .compare_and_swap(&key, raw.as_deref(), &next, self.window)
                .await?
            {
                return Ok(Some(RateSlot { started_at: now }));
            }
        }
        Ok(None)
    }

    /// Give back a slot whose job never got queued
    ///
    /// Returns whether the slot was still in the window.
    pub async fn release(&self, graph_id: &str, slot: RateSlot) -> Result<bool> {
        let key = rate_key(graph_id);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(raw) = self.cache.get(&key).await? else {
                return Ok(false);
            };
            let mut starts = self.live_starts(Some(&raw), Utc::now());
            let Some(pos) = starts.iter().position(|s| *s == slot.started_at) else {
                return Ok(false);
            };
            starts.remove(pos);

            let next = serde_json::to_string(&starts)?;
            if self
                .cache
                .compare_and_swap(&key, Some(&raw), &next, self.window)
                .await?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Jobs started within the window ending now
    pub async fn recent_jobs(&self, graph_id: &str) -> Result<usize> {
        let raw = self.cache.get(&rate_key(graph_id)).await?;
        Ok(self.live_starts(raw.as_deref(), Utc::now()).len())
    }

    fn live_starts(&self, raw: Option<&str>, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let window = chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::MAX);
        let starts: Vec<DateTime<Utc>> = raw
            .and_then(|r| serde_json::from_str(r).ok())
            .unwrap_or_default();
        starts
            .into_iter()
            .filter(|start| now.signed_duration_since(*start) < window)
            .collect()
    }
}
