use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use watch_stats_models::{AnalyticsPayload, ResultKey, StoredResult, UserId};

use crate::error::StoreError;
use crate::store::{CommitOutcome, ResultStore, ResultTable};

/// Result store persisted as a single JSON document.
///
/// Every write rewrites the file through a temp file and a rename, and only
/// then updates the in-memory table, so a failed write leaves both untouched.
pub struct JsonFileResultStore {
    path: PathBuf,
    table: Mutex<ResultTable>,
}

impl JsonFileResultStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let table = Self::load(&path).await?;
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(path: &Path) -> Result<ResultTable, StoreError> {
        if !tokio::fs::try_exists(path).await? {
            debug!("Result file {:?} does not exist, starting empty", path);
            return Ok(ResultTable::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        match serde_json::from_str::<ResultTable>(&content) {
            Ok(table) => {
                info!("Loaded {} stored results from {:?}", table.len(), path);
                Ok(table)
            }
            Err(e) => {
                warn!("Result file {:?} is corrupted ({}). Starting with an empty store.", path, e);
                Ok(ResultTable::default())
            }
        }
    }

    async fn persist(&self, table: &ResultTable) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(table)?;
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        debug!("Saved {} results to {:?}", table.len(), self.path);
        Ok(())
    }
}

#[async_trait]
impl ResultStore for JsonFileResultStore {
    async fn get(&self, key: &ResultKey) -> Result<Option<StoredResult>, StoreError> {
        Ok(self.table.lock().await.get(key).cloned())
    }

    async fn upsert(&self, key: &ResultKey, data: AnalyticsPayload, uploaded_at: DateTime<Utc>) -> Result<StoredResult, StoreError> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        let stored = next.upsert(key, data, uploaded_at);
        self.persist(&next).await?;
        *table = next;
        Ok(stored)
    }

    async fn compare_and_upsert(
        &self,
        key: &ResultKey,
        expected: Option<DateTime<Utc>>,
        data: AnalyticsPayload,
        uploaded_at: DateTime<Utc>,
    ) -> Result<CommitOutcome, StoreError> {
        let mut table = self.table.lock().await;
        let mut next = table.clone();
        let outcome = next.compare_and_upsert(key, expected, data, uploaded_at);
        if let CommitOutcome::Written(_) = outcome {
            self.persist(&next).await?;
            *table = next;
        }
        Ok(outcome)
    }

    async fn list_partitions(&self, user: &UserId) -> Result<BTreeMap<String, Vec<i32>>, StoreError> {
        Ok(self.table.lock().await.partitions(user))
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let mut table = self.table.lock().await;
        let removed = table.len();
        let empty = ResultTable::default();
        self.persist(&empty).await?;
        *table = empty;
        Ok(removed)
    }
}
