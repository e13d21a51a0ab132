//! Progress accounting.
//!
//! A fast pre-count of input rows drives a running `loaded of total (pct%)`
//! status line, overwritten in place after every successful flush. The
//! pre-count is diagnostic: files that cannot be counted degrade the total
//! instead of blocking the load.

use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

use crate::source::archive;

/// Count data rows across the input files, subtracting one header line per
/// file. Count failures are logged and contribute zero.
pub fn count_rows(files: &[PathBuf]) -> u64 {
    let mut total = 0u64;
    for path in files {
        if !path.is_file() {
            continue;
        }
        match archive::count_lines(path) {
            Ok(lines) => total += lines.saturating_sub(1),
            Err(e) => warn!("Failed to count lines in {}: {e}", path.display()),
        }
    }
    total
}

/// Format a count with thousands separators.
pub fn format_number(number: u64) -> String {
    let digits = number.to_string();
    let mut formatted = String::with_capacity(digits.len() + digits.len() / 3);
    for (position, digit) in digits.chars().enumerate() {
        if position > 0 && (digits.len() - position) % 3 == 0 {
            formatted.push(',');
        }
        formatted.push(digit);
    }
    formatted
}

/// Running loaded-records counter with an in-place status line.
#[derive(Debug)]
pub struct Progress {
    loaded: u64,
    total: u64,
}

impl Progress {
    /// `total` of zero means the pre-count is unknown; the status line then
    /// shows the loaded count alone.
    pub fn new(total: u64) -> Self {
        Self { loaded: 0, total }
    }

    /// Records successfully flushed so far.
    pub fn loaded(&self) -> u64 {
        self.loaded
    }

    /// Record a successful flush and redraw the status line.
    pub fn add_loaded(&mut self, docs: usize) {
        self.loaded += docs as u64;
        self.draw();
    }

    fn draw(&self) {
        let mut out = std::io::stdout();
        let line = if self.total > 0 {
            let percentage = self.loaded as f64 * 100.0 / self.total as f64;
            format!(
                "\r{} of {} records loaded ({:.1}%)",
                format_number(self.loaded),
                format_number(self.total),
                percentage
            )
        } else {
            format!("\r{} records loaded", format_number(self.loaded))
        };
        let _ = out.write_all(line.as_bytes());
        let _ = out.flush();
    }

    /// Terminate the status line once the run is over.
    pub fn finish(&self) {
        if self.loaded > 0 {
            println!();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(7_012_345), "7,012,345");
    }

    #[test]
    fn test_count_rows_subtracts_headers() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        std::fs::write(&a, "h\n1\n2\n3\n").unwrap();
        std::fs::write(&b, "h\n1\n").unwrap();

        assert_eq!(count_rows(&[a, b]), 4);
    }

    #[test]
    fn test_count_rows_degrades_on_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.csv");
        std::fs::write(&good, "h\n1\n2\n").unwrap();
        let missing = dir.path().join("missing.csv");

        // The missing file contributes zero instead of failing the count.
        assert_eq!(count_rows(&[good, missing]), 2);
    }

    #[test]
    fn test_progress_tracks_loaded() {
        let mut progress = Progress::new(5);
        progress.add_loaded(2);
        progress.add_loaded(3);
        assert_eq!(progress.loaded(), 5);
    }
}
