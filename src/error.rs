//! Error types for contrail using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;

// ============ Config Errors ============

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[snafu(display("Failed to read configuration file {path}"))]
    ReadFile {
        source: std::io::Error,
        path: String,
    },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// The config has no endpoint.
    #[snafu(display("The store config must include an 'endpoint'"))]
    MissingEndpoint,

    /// The endpoint is not a valid URL.
    #[snafu(display("Invalid store endpoint: {endpoint}"))]
    InvalidEndpoint {
        source: url::ParseError,
        endpoint: String,
    },

    /// Failed to read the mapping file.
    #[snafu(display("Failed to read mapping file {path}"))]
    ReadMapping {
        source: std::io::Error,
        path: String,
    },

    /// Failed to parse the mapping file.
    #[snafu(display("Failed to parse mapping JSON"))]
    MappingParse { source: serde_json::Error },

    /// The mapping file is not a JSON object.
    #[snafu(display("Mapping file must define a JSON object"))]
    MappingNotObject,
}

// ============ Source Errors ============

/// Errors that can occur while opening and reading input files.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// Failed to open an input file.
    #[snafu(display("Failed to open {path}"))]
    Open {
        source: std::io::Error,
        path: String,
    },

    /// Failed to read a zip archive.
    #[snafu(display("Failed to read zip archive {path}"))]
    ZipArchive {
        source: zip::result::ZipError,
        path: String,
    },

    /// The zip archive holds no delimited-text entry.
    #[snafu(display("No CSV entry found in archive {path}"))]
    NoCsvEntry { path: String },

    /// IO error while reading decoded data.
    #[snafu(display("Failed to read {path}"))]
    Read {
        source: std::io::Error,
        path: String,
    },

    /// IO error while writing an extraction output file.
    #[snafu(display("Failed to write {path}"))]
    WriteOutput {
        source: std::io::Error,
        path: String,
    },

    /// CSV parsing failed.
    #[snafu(display("Failed to parse CSV from {path}"))]
    Csv { source: csv::Error, path: String },

    /// Failed to list a directory.
    #[snafu(display("Failed to list directory {path}"))]
    ListDir {
        source: std::io::Error,
        path: String,
    },

    /// A glob pattern did not compile.
    #[snafu(display("Invalid glob pattern: {pattern}"))]
    BadGlobPattern {
        source: glob::PatternError,
        pattern: String,
    },

    /// A glob pattern matched nothing.
    #[snafu(display("No files found matching pattern: {pattern}"))]
    NoGlobMatch { pattern: String },

    /// The data directory holds no importable files.
    #[snafu(display("No .zip or .csv files found in {path}"))]
    EmptyDataDir { path: String },

    /// An explicitly named input file does not exist.
    #[snafu(display("File not found: {path}"))]
    NotFound { path: String },

    /// No input selection flag was given.
    #[snafu(display("Provide one of --file PATH, --all, or --glob PATTERN"))]
    NoSelection,
}

impl SourceError {
    /// Check if the underlying reader is broken and cannot yield further
    /// rows, as opposed to a single malformed row that can be skipped.
    pub fn is_fatal_read(&self) -> bool {
        match self {
            SourceError::Csv { source, .. } => {
                matches!(source.kind(), csv::ErrorKind::Io(_))
            }
            SourceError::Read { .. } => true,
            _ => false,
        }
    }
}

// ============ Store Errors ============

/// Errors reported by the external search store or its HTTP transport.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// HTTP transport failure (refused connection, timeout, DNS).
    #[snafu(display(
        "Request to the store failed: {source}. Check that the endpoint is reachable and the network allows the connection"
    ))]
    Request { source: reqwest::Error },

    /// Failed to read the configured CA certificate.
    #[snafu(display("Failed to read CA certificate {path}"))]
    CaRead {
        source: std::io::Error,
        path: String,
    },

    /// The configured CA certificate is not valid PEM.
    #[snafu(display("Invalid CA certificate {path}"))]
    CaParse {
        source: reqwest::Error,
        path: String,
    },

    /// Failed to build the HTTP client.
    #[snafu(display("Failed to build HTTP client"))]
    ClientBuild { source: reqwest::Error },

    /// The endpoint URL did not parse.
    #[snafu(display("Invalid store endpoint: {endpoint}"))]
    Endpoint {
        source: url::ParseError,
        endpoint: String,
    },

    /// A configured header name or value is not valid for HTTP.
    #[snafu(display("Invalid header in store configuration: {name}"))]
    BadHeader { name: String },

    /// The store answered with an unexpected status code.
    #[snafu(display("{operation} failed ({status}): {body}"))]
    UnexpectedStatus {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The store's response body could not be decoded.
    #[snafu(display("Failed to parse {operation} response"))]
    ResponseParse {
        operation: &'static str,
        source: reqwest::Error,
    },

    /// A document or action header failed to serialize.
    #[snafu(display("Failed to serialize bulk request line"))]
    Serialize { source: serde_json::Error },

    /// A bulk response reported per-item errors.
    #[snafu(display("Bulk indexing reported errors; aborting the run"))]
    BulkItems { count: usize },
}

impl StoreError {
    /// Check if this error represents a connectivity/configuration failure
    /// (refused connection, timeout) rather than a data problem.
    pub fn is_connectivity(&self) -> bool {
        match self {
            StoreError::Request { source } => source.is_connect() || source.is_timeout(),
            _ => false,
        }
    }
}

// ============ Import Error (top-level) ============

/// Top-level errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ImportError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Input file error.
    #[snafu(display("Source error"))]
    Source { source: SourceError },

    /// Store error.
    #[snafu(display("Store error"))]
    Store { source: StoreError },

    /// An extraction worker panicked.
    #[snafu(display("Extraction worker panicked"))]
    TaskJoin { source: tokio::task::JoinError },

    /// One or more extraction workers failed.
    #[snafu(display("{failed} extraction worker(s) failed"))]
    ExtractFailed { failed: usize },
}
