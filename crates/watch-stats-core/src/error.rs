use watch_stats_models::{JobId, WorkUnit};

/// A single export row whose timestamp or duration could not be parsed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Malformed row {row}: {reason}")]
pub struct MalformedRowError {
    /// Zero-based position of the row in the batch it was read from
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Result store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Result store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Result store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to encode job data: {0}")]
    Encode(#[source] bincode::Error),
    #[error("Failed to decode job data: {0}")]
    Decode(#[source] bincode::Error),
    #[error("Job data compression error: {0}")]
    Compression(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("CSV headers do not match expected viewing activity columns. Expected: {expected:?}, found: {found:?}")]
    SchemaMismatch { expected: Vec<String>, found: Vec<String> },

    #[error(transparent)]
    MalformedRow(#[from] MalformedRowError),

    #[error("Job {0} not found or expired")]
    JobNotFound(JobId),

    #[error("No data found for {0}")]
    NoDataForPartition(WorkUnit),

    #[error("Failed to process {unit}: {message}")]
    UnitProcessing { unit: WorkUnit, message: String },

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("Unable to read CSV file: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
