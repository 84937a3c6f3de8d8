use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One row of a viewing-activity export, exactly as read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawRecord {
    pub profile_name: String,
    pub start_time: String,
    pub duration: String, // HH:MM:SS
    pub title: String,
    #[serde(default)]
    pub supplemental_video_type: Option<String>, // Trailers, teasers, hooks...
    pub device_type: String,
    pub country: String,
}

impl RawRecord {
    /// Promotional rows carry a non-empty supplemental video type.
    pub fn is_promotional(&self) -> bool {
        self.supplemental_video_type
            .as_deref()
            .map(|kind| !kind.trim().is_empty())
            .unwrap_or(false)
    }
}

/// A non-promotional row with its derived fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedRecord {
    pub profile_name: String,
    pub started_at: NaiveDateTime,
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32, // 1-12
    pub watch_hours: f64,
    pub clean_title: String,
    pub device_type: String,
    pub country: String,
}

/// A normalized record resolved against the reference catalog.
///
/// Unmatched titles carry `"Unknown"` in all three resolved fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedRecord {
    pub record: NormalizedRecord,
    pub canonical_title: String,
    pub media_type: String,
    pub rating: String,
}

impl EnrichedRecord {
    pub fn watch_hours(&self) -> f64 {
        self.record.watch_hours
    }

    pub fn clean_title(&self) -> &str {
        &self.record.clean_title
    }

    pub fn month(&self) -> u32 {
        self.record.month
    }
}
