//! Static enrichment lookup tables.
//!
//! Both tables are built once, before any row processing begins, by fully
//! scanning a small reference file, and are read-only afterwards. A missing
//! or unreadable reference file yields an empty table: enrichment is
//! best-effort and never fails a run.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use snafu::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{CsvSnafu, ReadSnafu, SourceError};
use crate::source::archive;

/// Missing-value marker used by the airports reference data.
const MISSING_MARKER: &str = r"\N";

/// Normalize a lookup key: trimmed and upper-cased, so case/whitespace
/// variance in source data never causes a miss.
fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Geo-coordinates by airport IATA code, from a positional (headerless)
/// reference CSV: column 4 = code, columns 6/7 = latitude/longitude.
#[derive(Debug, Default)]
pub struct AirportLookup {
    airports: HashMap<String, (f64, f64)>,
}

impl AirportLookup {
    /// Build the table from a reference file (gzip or plain CSV).
    ///
    /// An absent path or nonexistent file produces an empty table.
    pub fn load(path: Option<&Path>) -> Self {
        let mut table = Self::default();
        let Some(path) = path else {
            return table;
        };
        if !path.is_file() {
            debug!(
                "Airports file {} not found; geo enrichment disabled",
                path.display()
            );
            return table;
        }

        info!("Loading airports from {}", path.display());
        match table.load_file(path) {
            Ok(count) => info!("Loaded {} airports into lookup table", count),
            Err(e) => warn!("Failed to load airports file: {e}"),
        }
        table
    }

    fn load_file(&mut self, path: &Path) -> Result<usize, SourceError> {
        let lines = archive::open_lines(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(lines);

        let mut count = 0;
        for record in reader.records() {
            // Reference data: malformed rows are skipped without accounting.
            let Ok(record) = record else { continue };
            if record.len() < 8 {
                continue;
            }

            let code = record.get(4).map(str::trim).unwrap_or("");
            if code.is_empty() || code == MISSING_MARKER {
                continue;
            }

            let lat = record.get(6).map(str::trim).unwrap_or("");
            let lon = record.get(7).map(str::trim).unwrap_or("");
            let (Ok(lat), Ok(lon)) = (lat.parse::<f64>(), lon.parse::<f64>()) else {
                continue;
            };

            self.airports.insert(normalize_code(code), (lat, lon));
            count += 1;
        }
        Ok(count)
    }

    /// Composite `"lat,lon"` string for a code, if known.
    pub fn coordinates(&self, code: &str) -> Option<String> {
        let key = normalize_code(code);
        if key.is_empty() {
            return None;
        }
        self.airports
            .get(&key)
            .map(|(lat, lon)| format!("{lat},{lon}"))
    }

    pub fn len(&self) -> usize {
        self.airports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.airports.is_empty()
    }
}

/// Human-readable cancellation reasons by short code, from a header-bearing
/// reference CSV with `Code` and `Description` columns.
#[derive(Debug, Default)]
pub struct CancellationLookup {
    reasons: HashMap<String, String>,
}

impl CancellationLookup {
    /// Build the table from a reference file. An absent path or nonexistent
    /// file produces an empty table.
    pub fn load(path: Option<&Path>) -> Self {
        let mut table = Self::default();
        let Some(path) = path else {
            return table;
        };
        if !path.is_file() {
            debug!(
                "Cancellations file {} not found; reason enrichment disabled",
                path.display()
            );
            return table;
        }

        info!("Loading cancellations from {}", path.display());
        match table.load_file(path) {
            Ok(count) => info!("Loaded {} cancellation reasons into lookup table", count),
            Err(e) => warn!("Failed to load cancellations file: {e}"),
        }
        table
    }

    fn load_file(&mut self, path: &Path) -> Result<usize, SourceError> {
        let display = path.display().to_string();
        let mut lines = archive::open_lines(path)?;

        // The reference export carries a UTF-8 BOM; strip it so the first
        // header name matches.
        let head = lines.fill_buf().context(ReadSnafu { path: &display })?;
        if head.starts_with(b"\xef\xbb\xbf") {
            lines.consume(3);
        }

        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(lines);
        let headers = reader
            .headers()
            .context(CsvSnafu { path: &display })?
            .clone();
        let code_column = headers.iter().position(|h| h == "Code");
        let description_column = headers.iter().position(|h| h == "Description");
        let (Some(code_column), Some(description_column)) = (code_column, description_column)
        else {
            warn!(
                "Cancellations file {} is missing Code/Description columns",
                path.display()
            );
            return Ok(0);
        };

        let mut count = 0;
        for record in reader.records() {
            let Ok(record) = record else { continue };
            let code = record.get(code_column).map(str::trim).unwrap_or("");
            let description = record
                .get(description_column)
                .map(str::trim)
                .unwrap_or("");
            if code.is_empty() || description.is_empty() {
                continue;
            }

            self.reasons
                .insert(normalize_code(code), description.to_string());
            count += 1;
        }
        Ok(count)
    }

    /// Reason text for a code, if known.
    pub fn reason(&self, code: &str) -> Option<&str> {
        let key = normalize_code(code);
        if key.is_empty() {
            return None;
        }
        self.reasons.get(&key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.reasons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }
}
