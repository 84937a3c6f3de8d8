//! Normalize -> resolve -> aggregate for a single unit of work.

use std::sync::Arc;
use tracing::{debug, warn};
use watch_stats_config::RowErrorPolicy;
use watch_stats_models::{AnalyticsPayload, RawRecord, WorkUnit};

use crate::aggregator::aggregate;
use crate::error::{CoordinatorError, Result};
use crate::normalizer::normalize;
use crate::resolver::Catalog;

#[derive(Debug, Clone)]
pub struct UnitPipeline {
    catalog: Arc<Catalog>,
    policy: RowErrorPolicy,
    top_titles: usize,
}

impl UnitPipeline {
    pub fn new(catalog: Arc<Catalog>, policy: RowErrorPolicy, top_titles: usize) -> Self {
        Self { catalog, policy, top_titles }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Compute the analytics for `unit` from the full raw batch of an upload.
    ///
    /// CPU-bound; the coordinator runs it on the blocking pool.
    pub fn compute(&self, rows: &[RawRecord], unit: &WorkUnit) -> Result<AnalyticsPayload> {
        let profile_rows: Vec<RawRecord> = rows
            .iter()
            .filter(|row| row.profile_name == unit.profile_name)
            .cloned()
            .collect();

        let normalized = normalize(&profile_rows, self.policy)?;
        if !normalized.skipped.is_empty() {
            warn!(
                profile = %unit.profile_name,
                year = unit.year,
                "Skipped {} malformed rows",
                normalized.skipped.len()
            );
        }

        let records: Vec<_> = normalized
            .records
            .into_iter()
            .filter(|record| record.year == unit.year)
            .collect();

        if records.is_empty() {
            return Err(CoordinatorError::NoDataForPartition(unit.clone()));
        }

        let enriched = self.catalog.enrich(records);
        debug!(profile = %unit.profile_name, year = unit.year, "Aggregating {} records", enriched.len());
        Ok(aggregate(&enriched, self.top_titles))
    }
}
