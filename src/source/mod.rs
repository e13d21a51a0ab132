//! Input file selection and CSV record streaming.
//!
//! A [`RecordStream`] yields one [`RawRow`] per decoded CSV line, with
//! values addressable by header name. Decoding of gzip/zip containers is
//! delegated to the [`archive`] module.

pub mod archive;

use snafu::prelude::*;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::error::{
    BadGlobPatternSnafu, CsvSnafu, EmptyDataDirSnafu, ListDirSnafu, NoGlobMatchSnafu,
    NoSelectionSnafu, NotFoundSnafu, SourceError,
};

/// Case-sensitive header-name → column index map, built once per file.
#[derive(Debug)]
pub struct HeaderIndex {
    index: HashMap<String, usize>,
}

impl HeaderIndex {
    fn new(headers: &csv::StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(position, name)| (name.to_string(), position))
            .collect();
        Self { index }
    }

    /// Column position for a header name, if the file has that column.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

/// One decoded row, addressable by header name. Borrowed from the stream;
/// consumed before the next row is read.
#[derive(Debug)]
pub struct RawRow<'a> {
    headers: &'a HeaderIndex,
    record: &'a csv::StringRecord,
}

impl<'a> RawRow<'a> {
    /// Raw string value for a column, if both the column and the value exist.
    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.headers
            .position(name)
            .and_then(|position| self.record.get(position))
    }
}

/// Sequential CSV record stream over a (possibly compressed) input file.
pub struct RecordStream {
    path: String,
    reader: csv::Reader<Box<dyn BufRead + Send>>,
    headers: HeaderIndex,
    record: csv::StringRecord,
}

impl RecordStream {
    /// Open a file and read its header row.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let display = path.display().to_string();
        let lines = archive::open_lines(path)?;

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(lines);
        let headers = HeaderIndex::new(reader.headers().context(CsvSnafu { path: &display })?);

        Ok(Self {
            path: display,
            reader,
            headers,
            record: csv::StringRecord::new(),
        })
    }

    /// Read the next row. Returns `false` at end of input.
    pub fn advance(&mut self) -> Result<bool, SourceError> {
        self.reader
            .read_record(&mut self.record)
            .context(CsvSnafu { path: &self.path })
    }

    /// The row read by the last successful [`advance`](Self::advance).
    pub fn row(&self) -> RawRow<'_> {
        RawRow {
            headers: &self.headers,
            record: &self.record,
        }
    }
}

/// Resolve the set of input files from the mutually-exclusive CLI selectors.
///
/// - `file`: that file, as given or relative to the data directory.
/// - `pattern`: glob matches, tried as given and then under the data
///   directory; sorted.
/// - `all`: every `*.zip` then `*.csv` under the data directory, each
///   group sorted.
pub fn files_to_process(
    data_dir: &Path,
    file: Option<&Path>,
    all: bool,
    pattern: Option<&str>,
) -> Result<Vec<PathBuf>, SourceError> {
    if let Some(file) = file {
        return Ok(vec![resolve_file(file, data_dir)?]);
    }

    if let Some(pattern) = pattern {
        let mut matches = glob_files(pattern)?;
        if matches.is_empty() {
            let expanded = data_dir.join(pattern);
            matches = glob_files(&expanded.to_string_lossy())?;
        }
        matches.retain(|path| path.is_file());
        matches.sort();
        ensure!(!matches.is_empty(), NoGlobMatchSnafu { pattern });
        return Ok(matches);
    }

    if all {
        let mut zips = list_with_extension(data_dir, "zip")?;
        let mut csvs = list_with_extension(data_dir, "csv")?;
        zips.sort();
        csvs.sort();
        zips.append(&mut csvs);
        ensure!(
            !zips.is_empty(),
            EmptyDataDirSnafu {
                path: data_dir.display().to_string(),
            }
        );
        return Ok(zips);
    }

    NoSelectionSnafu.fail()
}

fn resolve_file(path: &Path, data_dir: &Path) -> Result<PathBuf, SourceError> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    let candidate = data_dir.join(path);
    if candidate.exists() {
        return Ok(candidate);
    }
    NotFoundSnafu {
        path: path.display().to_string(),
    }
    .fail()
}

fn glob_files(pattern: &str) -> Result<Vec<PathBuf>, SourceError> {
    let paths = glob::glob(pattern).context(BadGlobPatternSnafu { pattern })?;
    Ok(paths.filter_map(Result::ok).collect())
}

fn list_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, SourceError> {
    let entries = std::fs::read_dir(dir).context(ListDirSnafu {
        path: dir.display().to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.context(ListDirSnafu {
            path: dir.display().to_string(),
        })?;
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}
