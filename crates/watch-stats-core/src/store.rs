use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use watch_stats_models::{AnalyticsPayload, ProfileYears, ResultKey, StoredResult, UserId};

use crate::error::StoreError;

/// Outcome of a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Written(StoredResult),
    /// Someone else committed first; carries what is stored now.
    Conflict(Option<StoredResult>),
}

/// Materialized analytics, at most one result per (user, profile, year).
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn get(&self, key: &ResultKey) -> Result<Option<StoredResult>, StoreError>;

    /// Insert or replace unconditionally.
    async fn upsert(&self, key: &ResultKey, data: AnalyticsPayload, uploaded_at: DateTime<Utc>) -> Result<StoredResult, StoreError>;

    /// Write only if the stored `uploaded_at` still equals `expected`
    /// (`None` meaning nothing is stored yet).
    async fn compare_and_upsert(
        &self,
        key: &ResultKey,
        expected: Option<DateTime<Utc>>,
        data: AnalyticsPayload,
        uploaded_at: DateTime<Utc>,
    ) -> Result<CommitOutcome, StoreError>;

    /// Profile -> years with a stored result, newest year first.
    async fn list_partitions(&self, user: &UserId) -> Result<BTreeMap<String, Vec<i32>>, StoreError>;

    /// Drop every stored result, returning how many were removed.
    async fn clear(&self) -> Result<usize, StoreError>;
}

/// Plain keyed table shared by the store implementations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultTable {
    results: Vec<StoredResult>,
}

impl ResultTable {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, key: &ResultKey) -> Option<&StoredResult> {
        self.results.iter().find(|r| &r.key == key)
    }

    pub fn upsert(&mut self, key: &ResultKey, data: AnalyticsPayload, uploaded_at: DateTime<Utc>) -> StoredResult {
        let stored = StoredResult {
            key: key.clone(),
            data,
            uploaded_at,
        };
        match self.results.iter_mut().find(|r| &r.key == key) {
            Some(existing) => *existing = stored.clone(),
            None => self.results.push(stored.clone()),
        }
        stored
    }

    pub fn compare_and_upsert(
        &mut self,
        key: &ResultKey,
        expected: Option<DateTime<Utc>>,
        data: AnalyticsPayload,
        uploaded_at: DateTime<Utc>,
    ) -> CommitOutcome {
        let current = self.get(key).map(|r| r.uploaded_at);
        if current != expected {
            return CommitOutcome::Conflict(self.get(key).cloned());
        }
        CommitOutcome::Written(self.upsert(key, data, uploaded_at))
    }

    pub fn partitions(&self, user: &UserId) -> BTreeMap<String, Vec<i32>> {
        let mut grouped = ProfileYears::new();
        for result in self.results.iter().filter(|r| &r.key.user == user) {
            grouped
                .entry(result.key.profile_name.clone())
                .or_default()
                .insert(result.key.year);
        }
        grouped
            .into_iter()
            .map(|(profile, years)| (profile, years.into_iter().rev().collect()))
            .collect()
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.results.len();
        self.results.clear();
        removed
    }
}

#[derive(Default)]
pub struct InMemoryResultStore {
    table: RwLock<ResultTable>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn get(&self, key: &ResultKey) -> Result<Option<StoredResult>, StoreError> {
        Ok(self.table.read().await.get(key).cloned())
    }

    async fn upsert(&self, key: &ResultKey, data: AnalyticsPayload, uploaded_at: DateTime<Utc>) -> Result<StoredResult, StoreError> {
        Ok(self.table.write().await.upsert(key, data, uploaded_at))
    }

    async fn compare_and_upsert(
        &self,
        key: &ResultKey,
        expected: Option<DateTime<Utc>>,
        data: AnalyticsPayload,
        uploaded_at: DateTime<Utc>,
    ) -> Result<CommitOutcome, StoreError> {
        Ok(self.table.write().await.compare_and_upsert(key, expected, data, uploaded_at))
    }

    async fn list_partitions(&self, user: &UserId) -> Result<BTreeMap<String, Vec<i32>>, StoreError> {
        Ok(self.table.read().await.partitions(user))
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        Ok(self.table.write().await.clear())
    }
}
