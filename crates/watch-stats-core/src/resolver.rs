//! Title enrichment against a reference catalog.
//!
//! Titles are compared as token sets: a catalog entry matches a record when
//! every token of the catalog title appears in the record's title. Among the
//! matches, the longest catalog title wins. Each record is compared against
//! every entry, so resolution is O(records x catalog); per-batch memoization
//! of distinct titles keeps episodic shows from paying that cost per row.

use anyhow::{anyhow, Result};
use csv::ReaderBuilder;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};
use watch_stats_models::{CatalogEntry, EnrichedRecord, NormalizedRecord, UNKNOWN};

const EXTRA_PUNCTUATION: [char; 8] = ['\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2013}', '\u{2014}', '\u{2026}', '\u{00B7}'];

/// Canonical title, media type and rating for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub canonical_title: String,
    pub media_type: String,
    pub rating: String,
}

impl Resolution {
    pub fn unknown() -> Self {
        Self {
            canonical_title: UNKNOWN.to_string(),
            media_type: UNKNOWN.to_string(),
            rating: UNKNOWN.to_string(),
        }
    }

    fn from_entry(entry: &CatalogEntry) -> Self {
        Self {
            canonical_title: entry.title.clone(),
            media_type: entry.media_type.clone(),
            rating: entry.rating.clone(),
        }
    }
}

struct IndexedEntry {
    entry: CatalogEntry,
    tokens: HashSet<String>,
    title_len: usize,
}

/// Read-only reference catalog with token sets computed up front.
#[derive(Default)]
pub struct Catalog {
    entries: Vec<IndexedEntry>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").field("entries", &self.entries.len()).finish()
    }
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| IndexedEntry {
                tokens: tokenize(&entry.title),
                title_len: entry.title.trim().chars().count(),
                entry,
            })
            .collect();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a reference dataset with `title`, `type` and `rating` columns.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| anyhow!("Failed to open catalog {:?}: {}", path, e))?;
        let catalog = Self::from_reader(file)?;
        info!("Loaded {} catalog entries from {:?}", catalog.len(), path);
        Ok(catalog)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new().flexible(true).from_reader(reader);

        let headers = reader.headers()?.clone();
        let header_map: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_string(), i))
            .collect();
        let available_columns: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        debug!("Available catalog columns: {:?}", available_columns);

        let required = ["title", "type", "rating"];
        for col in &required {
            if !header_map.contains_key(*col) {
                return Err(anyhow!("Missing required column: {}. Available columns: {:?}", col, available_columns));
            }
        }

        let mut entries = Vec::new();
        for result in reader.records() {
            let record = result?;
            let field = |name: &str| record.get(header_map[name]).unwrap_or("").trim().to_string();

            let title = field("title");
            if title.is_empty() {
                continue;
            }
            entries.push(CatalogEntry::new(title, or_unknown(field("type")), or_unknown(field("rating"))));
        }

        Ok(Self::new(entries))
    }

    /// Best catalog match for a title, or three `Unknown`s.
    pub fn resolve(&self, title: &str) -> Resolution {
        let tokens = tokenize(title);
        let mut best: Option<&IndexedEntry> = None;

        for candidate in &self.entries {
            if candidate.tokens.is_empty() || !candidate.tokens.is_subset(&tokens) {
                continue;
            }
            // strict comparison keeps the earlier entry on ties
            if best.map_or(true, |current| candidate.title_len > current.title_len) {
                best = Some(candidate);
            }
        }

        best.map(|indexed| Resolution::from_entry(&indexed.entry))
            .unwrap_or_else(Resolution::unknown)
    }

    /// Enrich a batch, resolving each distinct clean title once.
    pub fn enrich(&self, records: Vec<NormalizedRecord>) -> Vec<EnrichedRecord> {
        let mut memo: HashMap<String, Resolution> = HashMap::new();
        let mut enriched = Vec::with_capacity(records.len());

        for record in records {
            let resolution = memo
                .entry(record.clean_title.clone())
                .or_insert_with(|| self.resolve(&record.clean_title))
                .clone();
            enriched.push(EnrichedRecord {
                record,
                canonical_title: resolution.canonical_title,
                media_type: resolution.media_type,
                rating: resolution.rating,
            });
        }

        debug!("Resolved {} records ({} distinct titles)", enriched.len(), memo.len());
        enriched
    }
}

fn or_unknown(value: String) -> String {
    if value.is_empty() {
        UNKNOWN.to_string()
    } else {
        value
    }
}

/// Lowercase, drop punctuation, split on whitespace.
pub fn tokenize(title: &str) -> HashSet<String> {
    let cleaned: String = title
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation() && !EXTRA_PUNCTUATION.contains(c))
        .collect();
    cleaned.split_whitespace().map(|t| t.to_string()).collect()
}
