//! Destination partition routing.
//!
//! The partition name is derived from the input filename's embedded
//! year/month when present; a single file is assumed homogeneous at that
//! granularity, so the filename wins over any per-record date. Otherwise
//! the record's own timestamp supplies the year.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Trailing `-YYYY-MM` on a stripped file stem.
static FILE_YEAR_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?(\d{4})-(\d{2})$").expect("Invalid regex pattern"));

/// Trailing `-YYYY` on a stripped file stem.
static FILE_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?(\d{4})$").expect("Invalid regex pattern"));

/// Leading `YYYY-MM-DD` of a record timestamp.
static TIMESTAMP_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})").expect("Invalid regex pattern"));

/// Year/month encoded in an input filename, either or both possibly absent.
#[derive(Debug, Clone, Default)]
pub struct FilePeriod {
    pub year: Option<String>,
    pub month: Option<String>,
}

/// Extract the period from a filename, after stripping recognized
/// extensions.
pub fn file_period(path: &Path) -> FilePeriod {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return FilePeriod::default();
    };
    let stem = strip_extensions(name);

    if let Some(caps) = FILE_YEAR_MONTH.captures(&stem) {
        return FilePeriod {
            year: Some(caps[1].to_string()),
            month: Some(caps[2].to_string()),
        };
    }
    if let Some(caps) = FILE_YEAR.captures(&stem) {
        return FilePeriod {
            year: Some(caps[1].to_string()),
            month: None,
        };
    }
    FilePeriod::default()
}

/// Repeatedly remove recognized suffixes; multi-extension names like
/// `flights-2024-07.csv.gz` are common.
pub fn strip_extensions(name: &str) -> String {
    const SUFFIXES: &[&str] = &[".gz", ".csv", ".zip"];

    let mut stem = name.to_string();
    loop {
        let lower = stem.to_lowercase();
        let Some(suffix) = SUFFIXES.iter().find(|s| lower.ends_with(**s)) else {
            break;
        };
        stem.truncate(stem.len() - suffix.len());
    }
    stem
}

/// Derive the partition name for one document.
///
/// Returns `None` when no year can be determined by any method; the caller
/// skips (and accounts for) the row.
///
/// When the filename supplies only a year, the record's month is
/// deliberately not consulted: partitioning stays at year granularity to
/// avoid accidental high cardinality.
pub fn route(prefix: &str, timestamp: Option<&str>, period: &FilePeriod) -> Option<String> {
    if let (Some(year), Some(month)) = (&period.year, &period.month) {
        return Some(format!("{prefix}-{year}-{month}"));
    }
    if let Some(year) = &period.year {
        return Some(format!("{prefix}-{year}"));
    }

    let caps = TIMESTAMP_DATE.captures(timestamp?)?;
    Some(format!("{prefix}-{}", &caps[1]))
}
