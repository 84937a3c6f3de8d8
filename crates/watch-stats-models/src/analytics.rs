use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MONTH_LABELS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TitleWatchtime {
    pub title: String,
    pub hrs: f64,
}

/// Share of total watch time for one media type, in percent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeShare {
    #[serde(rename = "type")]
    pub media_type: String,
    pub hrs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyWatchtime {
    pub month: String,
    pub hrs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatingWatchtime {
    pub rating: String,
    pub hrs: f64,
}

/// Hours watched by one profile in one calendar year.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct YearlyWatchtime {
    pub year: i32,
    pub hrs: f64,
}

/// Profile -> yearly trend, years ascending.
pub type YearlyTrends = BTreeMap<String, Vec<YearlyWatchtime>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WatchSummary {
    pub total_hours: f64,
    pub unique_titles: usize,
    pub unique_movies: usize,
    pub unique_shows: usize,
}

/// Analytics computed for one (profile, year) partition.
///
/// The order of every list is part of the contract: titles and ratings are
/// sorted by descending hours, months always run JAN..DEC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsPayload {
    pub total_title_watchtime: Vec<TitleWatchtime>,
    pub total_type_watchtime: Vec<TypeShare>,
    pub monthly_watchtime: Vec<MonthlyWatchtime>,
    pub ratings_watchtime: Vec<RatingWatchtime>,
    #[serde(default)]
    pub summary: WatchSummary,
}
