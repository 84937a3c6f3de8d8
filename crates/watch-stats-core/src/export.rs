//! Reader for the streaming service's "ViewingActivity.csv" export.

use csv::ReaderBuilder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;
use watch_stats_models::RawRecord;

use crate::error::{CoordinatorError, Result};

/// Header row of a viewing activity export, in order.
pub const EXPECTED_COLUMNS: [&str; 10] = [
    "Profile Name",
    "Start Time",
    "Duration",
    "Attributes",
    "Title",
    "Supplemental Video Type",
    "Device Type",
    "Bookmark",
    "Latest Bookmark",
    "Country",
];

/// An upload: the header row it arrived with plus its parsed rows.
#[derive(Debug, Clone)]
pub struct ViewingExport {
    pub headers: Vec<String>,
    pub records: Vec<RawRecord>,
}

impl ViewingExport {
    pub fn new(headers: Vec<String>, records: Vec<RawRecord>) -> Self {
        Self { headers, records }
    }

    /// Build an export from rows that are already typed, with the canonical header row.
    pub fn from_records(records: Vec<RawRecord>) -> Self {
        Self {
            headers: EXPECTED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            records,
        }
    }

    pub fn validate_columns(&self) -> Result<()> {
        validate_columns(&self.headers)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The header row must match the expected columns exactly, order included.
pub fn validate_columns(headers: &[String]) -> Result<()> {
    let matches = headers.len() == EXPECTED_COLUMNS.len()
        && headers.iter().zip(EXPECTED_COLUMNS.iter()).all(|(found, expected)| found == expected);

    if matches {
        Ok(())
    } else {
        Err(CoordinatorError::SchemaMismatch {
            expected: EXPECTED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            found: headers.to_vec(),
        })
    }
}

pub fn read_export_file<P: AsRef<Path>>(path: P) -> Result<ViewingExport> {
    let file = File::open(path).map_err(csv::Error::from)?;
    read_export(file)
}

/// Parse a viewing activity CSV. Rejects the whole file if the header row is wrong.
pub fn read_export<R: Read>(reader: R) -> Result<ViewingExport> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    debug!("Available CSV columns: {:?}", headers);
    validate_columns(&headers)?;

    // Positions are fixed once the header row has been validated
    let field = |record: &csv::StringRecord, column: usize| record.get(column).unwrap_or("").to_string();

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;

        let supplemental = field(&record, 5);
        records.push(RawRecord {
            profile_name: field(&record, 0),
            start_time: field(&record, 1),
            duration: field(&record, 2),
            title: field(&record, 4),
            supplemental_video_type: if supplemental.trim().is_empty() { None } else { Some(supplemental) },
            device_type: field(&record, 6),
            country: field(&record, 9),
        });

        if records.len() <= 3 {
            debug!(
                row = records.len(),
                profile = %field(&record, 0),
                title = %field(&record, 4),
                "Parsed viewing activity row"
            );
        }
    }

    tracing::info!("Parsed {} viewing activity rows", records.len());
    Ok(ViewingExport { headers, records })
}
