//! The four analytics views plus a summary, computed from one partition's
//! enriched records.

use std::collections::{BTreeMap, BTreeSet};
use watch_stats_models::{
    AnalyticsPayload, EnrichedRecord, MonthlyWatchtime, NormalizedRecord, RatingWatchtime, TitleWatchtime, TypeShare,
    WatchSummary, YearlyTrends, YearlyWatchtime, MEDIA_TYPE_MOVIE, MEDIA_TYPE_TV_SHOW, MONTH_LABELS, UNKNOWN,
};

pub const DEFAULT_TOP_TITLES: usize = 10;

/// Callers must not pass an empty batch; an empty partition is reported as
/// "no data" before aggregation.
pub fn aggregate(records: &[EnrichedRecord], top_titles: usize) -> AnalyticsPayload {
    AnalyticsPayload {
        total_title_watchtime: title_watchtime(records, top_titles),
        total_type_watchtime: type_shares(records),
        monthly_watchtime: monthly_watchtime(records),
        ratings_watchtime: ratings_watchtime(records),
        summary: summary(records),
    }
}

/// Hours per clean title, descending, truncated to `limit` and rounded to 2 places.
pub fn title_watchtime(records: &[EnrichedRecord], limit: usize) -> Vec<TitleWatchtime> {
    let totals = sum_by(records, |r| r.clean_title());

    sorted_descending(totals)
        .into_iter()
        .take(limit)
        .map(|(title, hrs)| TitleWatchtime { title, hrs: round2(hrs) })
        .collect()
}

/// Percentage of total hours per media type, `Unknown` included.
pub fn type_shares(records: &[EnrichedRecord]) -> Vec<TypeShare> {
    let totals = sum_by(records, |r| r.media_type.as_str());
    let total: f64 = totals.values().sum();

    sorted_descending(totals)
        .into_iter()
        .map(|(media_type, hrs)| {
            let share = if total > 0.0 { hrs / total * 100.0 } else { 0.0 };
            TypeShare { media_type, hrs: round2(share) }
        })
        .collect()
}

/// Always twelve entries, JAN through DEC.
pub fn monthly_watchtime(records: &[EnrichedRecord]) -> Vec<MonthlyWatchtime> {
    let mut hours = [0.0_f64; 12];
    for record in records {
        let month = record.month();
        if (1..=12).contains(&month) {
            hours[(month - 1) as usize] += record.watch_hours();
        }
    }

    MONTH_LABELS
        .iter()
        .zip(hours)
        .map(|(label, hrs)| MonthlyWatchtime { month: label.to_string(), hrs })
        .collect()
}

pub fn ratings_watchtime(records: &[EnrichedRecord]) -> Vec<RatingWatchtime> {
    let totals = sum_by(records, |r| r.rating.as_str());

    sorted_descending(totals)
        .into_iter()
        .map(|(rating, hrs)| RatingWatchtime { rating, hrs })
        .collect()
}

/// Unique counts ignore records the catalog could not resolve.
pub fn summary(records: &[EnrichedRecord]) -> WatchSummary {
    let mut titles = BTreeSet::new();
    let mut movies = BTreeSet::new();
    let mut shows = BTreeSet::new();
    let mut total_hours = 0.0;

    for record in records {
        total_hours += record.watch_hours();
        if record.canonical_title == UNKNOWN {
            continue;
        }
        titles.insert(record.canonical_title.as_str());
        match record.media_type.as_str() {
            MEDIA_TYPE_MOVIE => {
                movies.insert(record.canonical_title.as_str());
            }
            MEDIA_TYPE_TV_SHOW => {
                shows.insert(record.canonical_title.as_str());
            }
            _ => {}
        }
    }

    WatchSummary {
        total_hours: round2(total_hours),
        unique_titles: titles.len(),
        unique_movies: movies.len(),
        unique_shows: shows.len(),
    }
}

/// Hours per calendar year, years ascending, unrounded.
///
/// Works on normalized records because the trend spans every year of an
/// upload, not one partition.
pub fn yearly_watchtime(records: &[NormalizedRecord]) -> Vec<YearlyWatchtime> {
    let mut totals: BTreeMap<i32, f64> = BTreeMap::new();
    for record in records {
        *totals.entry(record.year).or_insert(0.0) += record.watch_hours;
    }
    totals.into_iter().map(|(year, hrs)| YearlyWatchtime { year, hrs }).collect()
}

/// [`yearly_watchtime`] for each profile in the batch.
pub fn yearly_trends(records: &[NormalizedRecord]) -> YearlyTrends {
    let mut by_profile: BTreeMap<&str, BTreeMap<i32, f64>> = BTreeMap::new();
    for record in records {
        *by_profile
            .entry(record.profile_name.as_str())
            .or_default()
            .entry(record.year)
            .or_insert(0.0) += record.watch_hours;
    }
    by_profile
        .into_iter()
        .map(|(profile, years)| {
            let trend = years.into_iter().map(|(year, hrs)| YearlyWatchtime { year, hrs }).collect();
            (profile.to_string(), trend)
        })
        .collect()
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn sum_by<'a, F>(records: &'a [EnrichedRecord], key: F) -> BTreeMap<String, f64>
where
    F: Fn(&'a EnrichedRecord) -> &'a str,
{
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for record in records {
        *totals.entry(key(record).to_string()).or_insert(0.0) += record.watch_hours();
    }
    totals
}

/// Descending by hours; the stable sort over a BTreeMap leaves ties in ascending key order.
fn sorted_descending(totals: BTreeMap<String, f64>) -> Vec<(String, f64)> {
    let mut entries: Vec<(String, f64)> = totals.into_iter().collect();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1));
    entries
}
