//! Turns raw export rows into analytics-ready records.
//!
//! Every step is a pure transform over the batch: promotional rows are
//! dropped, titles lose their season/episode suffix, and the start time and
//! duration columns are parsed into calendar fields and fractional hours.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use tracing::debug;
use watch_stats_config::RowErrorPolicy;
use watch_stats_models::{NormalizedRecord, RawRecord};

use crate::error::MalformedRowError;

const EPISODE_MARKERS: [&str; 2] = ["season", "episode"];

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Outcome of normalizing one batch.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub records: Vec<NormalizedRecord>,
    /// Rows dropped because they could not be parsed (only under `RowErrorPolicy::Skip`)
    pub skipped: Vec<MalformedRowError>,
    /// Trailers, teasers and other supplemental videos
    pub promotional: usize,
}

pub fn normalize(rows: &[RawRecord], policy: RowErrorPolicy) -> Result<Normalized, MalformedRowError> {
    let mut normalized = Normalized::default();

    for (index, row) in rows.iter().enumerate() {
        if row.is_promotional() {
            normalized.promotional += 1;
            continue;
        }

        match normalize_row(index, row) {
            Ok(record) => normalized.records.push(record),
            Err(err) => match policy {
                RowErrorPolicy::Abort => return Err(err),
                RowErrorPolicy::Skip => {
                    debug!(row = index, reason = %err.reason, "Skipping malformed row");
                    normalized.skipped.push(err);
                }
            },
        }
    }

    Ok(normalized)
}

/// Normalize a single non-promotional row.
pub fn normalize_row(index: usize, row: &RawRecord) -> Result<NormalizedRecord, MalformedRowError> {
    let started_at = parse_start_time(&row.start_time).ok_or_else(|| MalformedRowError {
        row: index,
        reason: format!("invalid start time '{}'", row.start_time),
    })?;

    let watch_hours = parse_duration_hours(&row.duration).ok_or_else(|| MalformedRowError {
        row: index,
        reason: format!("invalid duration '{}'", row.duration),
    })?;

    Ok(NormalizedRecord {
        profile_name: row.profile_name.clone(),
        started_at,
        date: started_at.date(),
        year: started_at.year(),
        month: started_at.month(),
        watch_hours,
        clean_title: clean_title(&row.title),
        device_type: row.device_type.clone(),
        country: row.country.clone(),
    })
}

/// Strip season/episode information from an export title.
///
/// `"Show: Season 1: Pilot"` becomes `"Show"`, while a plain subtitle such as
/// `"Movie: Part Two: Extended"` keeps its first two segments.
pub fn clean_title(title: &str) -> String {
    let segments: Vec<&str> = title.split(':').collect();
    if segments.len() <= 1 {
        return title.trim().to_string();
    }

    let marks_episode = segments[1]
        .split_whitespace()
        .any(|word| EPISODE_MARKERS.iter().any(|marker| word.eq_ignore_ascii_case(marker)));
    if marks_episode {
        segments[0].trim().to_string()
    } else {
        format!("{}:{}", segments[0].trim_end(), segments[1]).trim().to_string()
    }
}

pub fn parse_start_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();

    for format in TIMESTAMP_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed);
        }
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_utc());
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// `HH:MM:SS` to fractional hours. Hours may exceed a day.
pub fn parse_duration_hours(value: &str) -> Option<f64> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours = parts[0].parse::<u32>().ok()?;
    let minutes = parts[1].parse::<u32>().ok()?;
    let seconds = parts[2].parse::<u32>().ok()?;

    Some(hours as f64 + minutes as f64 / 60.0 + seconds as f64 / 3600.0)
}
