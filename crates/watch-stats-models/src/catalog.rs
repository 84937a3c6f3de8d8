use serde::{Deserialize, Serialize};

/// Placeholder used for every resolved field when no catalog entry matches.
pub const UNKNOWN: &str = "Unknown";

pub const MEDIA_TYPE_MOVIE: &str = "Movie";
pub const MEDIA_TYPE_TV_SHOW: &str = "TV Show";

/// Reference catalog row: canonical title plus the metadata we enrich with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogEntry {
    pub title: String,
    pub media_type: String, // "Movie", "TV Show", or whatever the dataset uses
    pub rating: String,     // Content rating, e.g. "TV-MA", "PG-13"
}

impl CatalogEntry {
    pub fn new(title: impl Into<String>, media_type: impl Into<String>, rating: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            media_type: media_type.into(),
            rating: rating.into(),
        }
    }
}
