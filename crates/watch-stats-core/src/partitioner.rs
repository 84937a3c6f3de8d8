//! Splits an upload into (profile, year) units of work and decides which
//! units still need computing.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use watch_stats_models::{NormalizedRecord, ProfileYears, StoredResult, WorkUnit};

/// Distinct years with activity for every profile in the batch.
pub fn discover_units(records: &[NormalizedRecord]) -> ProfileYears {
    let mut profile_years = ProfileYears::new();
    for record in records {
        profile_years
            .entry(record.profile_name.clone())
            .or_default()
            .insert(record.year);
    }
    profile_years
}

/// Profiles ascending, then years ascending within each profile.
pub fn processing_order(profile_years: &ProfileYears) -> Vec<WorkUnit> {
    profile_years
        .iter()
        .flat_map(|(profile, years)| years.iter().map(move |year| WorkUnit::new(profile.clone(), *year)))
        .collect()
}

/// First instant after `year`, in UTC.
pub fn year_end(year: i32) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Whether a unit needs (re)computing.
///
/// The current or a future year is always recomputed since it can still gain
/// activity. A past year is recomputed only when nothing is stored or the
/// stored result was produced before that year had ended.
pub fn should_process(existing: Option<&StoredResult>, unit: &WorkUnit, now: DateTime<Utc>) -> bool {
    if unit.year >= now.year() {
        return true;
    }

    match existing {
        None => true,
        Some(stored) => match year_end(unit.year) {
            Some(boundary) => stored.uploaded_at < boundary,
            None => true,
        },
    }
}
