//! contrail: a bulk loader for airline on-time performance data.
//!
//! Reads monthly flight-performance extracts (plain, gzip-compressed, or
//! zip-wrapped CSV), transforms each row into a normalized document
//! enriched from static lookup tables, and bulk-writes the result into
//! time-partitioned indices of an Elasticsearch-compatible search store.

pub mod config;
pub mod error;
pub mod extract;
pub mod lookup;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod store;
pub mod transform;
