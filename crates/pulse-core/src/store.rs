//! Contracts for the durable document store, plus in-memory
//! implementations used by the CLI and tests.
//!
//! Every save is optimistic: it succeeds only when the record's version
//! matches the stored version. The monitor's policy on conflict is drop,
//! don't retry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::model::{MetricsSample, StreamRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("version conflict saving stream {id}: expected {expected}, found {found}")]
    VersionConflict { id: String, expected: u64, found: u64 },
    #[error("stream {0} not found")]
    NotFound(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

#[async_trait]
pub trait StreamStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<StreamRecord>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<StreamRecord>, StoreError>;

    /// Save under the optimistic version check. On success the record's
    /// version is bumped and `updated_at` refreshed in place, so the same
    /// instance can be saved again.
    async fn save(&self, record: &mut StreamRecord) -> Result<(), StoreError>;
}

#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn append(&self, sample: MetricsSample) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemoryStreamStore {
    records: RwLock<HashMap<String, StreamRecord>>,
}

impl MemoryStreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created record, replacing any record with the same
    /// id. Record creation is external to the monitor.
    pub async fn insert(&self, record: StreamRecord) {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record);
    }

    pub async fn remove(&self, id: &str) -> Option<StreamRecord> {
        self.records.write().await.remove(id)
    }
}

#[async_trait]
impl StreamStore for MemoryStreamStore {
    async fn find_all(&self) -> Result<Vec<StreamRecord>, StoreError> {
        let records = self.records.read().await;
        let mut all: Vec<StreamRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<StreamRecord>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn save(&self, record: &mut StreamRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let stored = records
            .get(&record.id)
            .ok_or_else(|| StoreError::NotFound(record.id.clone()))?;

        if stored.version != record.version {
            return Err(StoreError::VersionConflict {
                id: record.id.clone(),
                expected: record.version,
                found: stored.version,
            });
        }

        record.version += 1;
        record.updated_at = Utc::now();
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }
}

/// Append-only metrics history. The retention horizon stands in for the
/// TTL index a real document store would enforce; pruning happens on
/// append and the monitor itself never deletes.
pub struct MemoryMetricsStore {
    samples: RwLock<Vec<MetricsSample>>,
    retention: Duration,
}

impl MemoryMetricsStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            samples: RwLock::new(Vec::new()),
            retention,
        }
    }

    pub async fn all(&self) -> Vec<MetricsSample> {
        self.samples.read().await.clone()
    }

    pub async fn for_stream(&self, stream_id: &str) -> Vec<MetricsSample> {
        self.samples
            .read()
            .await
            .iter()
            .filter(|s| s.stream_id == stream_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MetricsStore for MemoryMetricsStore {
    async fn append(&self, sample: MetricsSample) -> Result<(), StoreError> {
        let mut samples = self.samples.write().await;
        let cutoff =
            Utc::now() - chrono::Duration::milliseconds(self.retention.as_millis() as i64);
        samples.retain(|s| s.timestamp >= cutoff);
        samples.push(sample);
        Ok(())
    }
}
