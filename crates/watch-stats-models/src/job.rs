use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::analytics::AnalyticsPayload;

/// Profile name -> distinct years with activity, ascending.
pub type ProfileYears = BTreeMap<String, BTreeSet<i32>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identity of the account that owns an upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One independently computed (profile, year) partition of an upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkUnit {
    pub profile_name: String,
    pub year: i32,
}

impl WorkUnit {
    pub fn new(profile_name: impl Into<String>, year: i32) -> Self {
        Self {
            profile_name: profile_name.into(),
            year,
        }
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.profile_name, self.year)
    }
}

/// Store key; at most one result exists per key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResultKey {
    pub user: UserId,
    pub profile_name: String,
    pub year: i32,
}

impl ResultKey {
    pub fn new(user: &UserId, unit: &WorkUnit) -> Self {
        Self {
            user: user.clone(),
            profile_name: unit.profile_name.clone(),
            year: unit.year,
        }
    }

    pub fn unit(&self) -> WorkUnit {
        WorkUnit::new(self.profile_name.clone(), self.year)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredResult {
    pub key: ResultKey,
    pub data: AnalyticsPayload,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Scheduled,
    Running,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Scheduled => "scheduled",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_is_uuid() {
        let id = JobId::generate();
        assert_eq!(id.as_str().len(), 36);
        assert_ne!(id, JobId::generate());
        assert_eq!(serde_json::to_value(&id).unwrap(), id.as_str());
    }

    #[test]
    fn test_status_vocabulary() {
        assert_eq!(serde_json::to_value(JobStatus::Completed).unwrap(), "completed");
        assert_eq!(JobStatus::Running.as_str(), "running");
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Scheduled.is_terminal());
    }

    #[test]
    fn test_work_unit_display_and_key() {
        let unit = WorkUnit::new("Alice", 2023);
        assert_eq!(unit.to_string(), "Alice - 2023");

        let key = ResultKey::new(&UserId::new("user-1"), &unit);
        assert_eq!(key.unit(), unit);
        assert_eq!(key.user.as_str(), "user-1");
    }
}
