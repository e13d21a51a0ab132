//! Year-partitioned archive extraction.
//!
//! Merges a set of monthly archives into one plain CSV per year. Input
//! files are grouped by the year embedded in their filename; each year is
//! handled by an independent blocking worker writing its own output file,
//! so no shared mutable state crosses a task boundary. The parent awaits
//! all workers and reports each outcome independently.

use regex::Regex;
use snafu::prelude::*;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{error, info, warn};

use crate::error::{
    ExtractFailedSnafu, ImportError, OpenSnafu, ReadSnafu, SourceError, SourceSnafu,
    TaskJoinSnafu, WriteOutputSnafu,
};
use crate::pipeline::partition;
use crate::pipeline::progress::format_number;
use crate::source::archive;

/// Reporting-archive naming: `..._YYYY_M.zip` / `..._YYYY_M.csv`. Anchored
/// to the month digit so a stray year mid-name does not match.
static ARCHIVE_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)_(\d{4})_\d+\.(zip|csv)$").expect("Invalid regex pattern"));

/// Outcome of one year's extraction worker.
#[derive(Debug)]
pub struct YearExtract {
    pub year: String,
    pub files: usize,
    pub rows: u64,
    pub output: PathBuf,
}

/// Year embedded in an archive filename, trying the reporting-archive
/// underscore pattern first and the partition router's trailing-year rule
/// second.
pub fn embedded_year(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    if let Some(caps) = ARCHIVE_YEAR.captures(name) {
        return Some(caps[1].to_string());
    }
    partition::file_period(path).year
}

/// Group files by year and extract each group to `<out_dir>/flights-<year>.csv`.
///
/// Workers run concurrently but write disjoint outputs; the join-all
/// barrier below is the only coordination. Any worker failure makes the
/// call fail after every worker has finished and been reported.
pub async fn extract_by_year(
    files: &[PathBuf],
    out_dir: &Path,
) -> Result<Vec<YearExtract>, ImportError> {
    std::fs::create_dir_all(out_dir)
        .context(OpenSnafu {
            path: out_dir.display().to_string(),
        })
        .context(SourceSnafu)?;

    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for path in files {
        match embedded_year(path) {
            Some(year) => groups.entry(year).or_default().push(path.clone()),
            None => warn!("Skipping {} (no year in filename)", path.display()),
        }
    }
    info!(
        "Extracting {} year group(s) to {}",
        groups.len(),
        out_dir.display()
    );

    let mut years = Vec::new();
    let mut handles = Vec::new();
    for (year, mut group) in groups {
        group.sort();
        let output = out_dir.join(format!("flights-{year}.csv"));
        let worker_year = year.clone();
        years.push(year);
        handles.push(tokio::task::spawn_blocking(move || {
            extract_year(&worker_year, &group, &output)
        }));
    }

    let joined = futures::future::join_all(handles).await;

    let mut results = Vec::new();
    let mut failed: usize = 0;
    for (year, outcome) in years.into_iter().zip(joined) {
        match outcome.context(TaskJoinSnafu)? {
            Ok(report) => {
                info!(
                    "Year {}: {} row(s) from {} file(s) -> {}",
                    report.year,
                    format_number(report.rows),
                    report.files,
                    report.output.display()
                );
                results.push(report);
            }
            Err(e) => {
                failed += 1;
                error!("Year {year} extraction failed: {e}");
            }
        }
    }

    ensure!(failed == 0, ExtractFailedSnafu { failed });
    Ok(results)
}

/// Merge one year's archives into a single CSV, keeping only the first
/// file's header line.
fn extract_year(year: &str, files: &[PathBuf], output: &Path) -> Result<YearExtract, SourceError> {
    let out_display = output.display().to_string();
    let mut writer = BufWriter::new(File::create(output).context(OpenSnafu {
        path: &out_display,
    })?);

    let mut rows = 0u64;
    let mut wrote_header = false;
    for path in files {
        let display = path.display().to_string();
        let reader = archive::open_lines(path)?;
        for (line_number, line) in reader.lines().enumerate() {
            let line = line.context(ReadSnafu { path: &display })?;
            if line_number == 0 {
                if wrote_header {
                    continue;
                }
                wrote_header = true;
            } else {
                rows += 1;
            }
            writeln!(writer, "{line}").context(WriteOutputSnafu {
                path: &out_display,
            })?;
        }
    }
    writer.flush().context(WriteOutputSnafu { path: &out_display })?;

    Ok(YearExtract {
        year: year.to_string(),
        files: files.len(),
        rows,
        output: output.to_path_buf(),
    })
}
