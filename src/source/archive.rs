//! Archive-aware line streaming.
//!
//! Opens a single input file as a sequential stream of decoded text,
//! regardless of whether the bytes on disk are plain text, gzip-compressed,
//! or a zip archive wrapping one delimited-text entry.

use flate2::read::GzDecoder;
use snafu::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::Path;

use crate::error::{NoCsvEntrySnafu, OpenSnafu, ReadSnafu, SourceError, ZipArchiveSnafu};

/// Open a file as a buffered stream of decoded text.
///
/// - `.zip`: the first entry whose name ends in `.csv` (case-insensitive)
///   is decompressed into memory; a missing entry is a fatal error.
/// - `.gz`: decompressed transparently while streaming.
/// - anything else: read as-is.
///
/// File handles are dropped when the returned reader is dropped.
pub fn open_lines(path: &Path) -> Result<Box<dyn BufRead + Send>, SourceError> {
    let display = path.display().to_string();
    let lower = display.to_lowercase();

    let file = File::open(path).context(OpenSnafu { path: &display })?;

    if lower.ends_with(".zip") {
        let mut archive = zip::ZipArchive::new(file).context(ZipArchiveSnafu { path: &display })?;

        let entry_name = archive
            .file_names()
            .find(|name| name.to_lowercase().ends_with(".csv"))
            .map(str::to_owned)
            .context(NoCsvEntrySnafu { path: &display })?;

        let mut entry = archive
            .by_name(&entry_name)
            .context(ZipArchiveSnafu { path: &display })?;
        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .context(ReadSnafu { path: &display })?;

        Ok(Box::new(Cursor::new(buf)))
    } else if lower.ends_with(".gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Count lines in a file through the same decoding logic as [`open_lines`].
///
/// Counts newline bytes; a final line without a trailing newline still
/// counts. Used only by the progress pre-count, so callers treat failures
/// as diagnostic rather than fatal.
pub fn count_lines(path: &Path) -> Result<u64, SourceError> {
    let display = path.display().to_string();
    let mut reader = open_lines(path)?;

    let mut total = 0u64;
    let mut last = b'\n';
    loop {
        let buf = reader.fill_buf().context(ReadSnafu { path: &display })?;
        if buf.is_empty() {
            break;
        }
        total += buf.iter().filter(|&&b| b == b'\n').count() as u64;
        last = buf[buf.len() - 1];
        let consumed = buf.len();
        reader.consume(consumed);
    }
    if last != b'\n' {
        total += 1;
    }
    Ok(total)
}
