//! NexusDB Performance Benchmarks
//!
//! This crate contains benchmarks for the in-memory engine:
//! - SQL parsing, with and without the parse cache
//! - Indexed versus sequential filtering
//! - Joins, grouping and sorting over generated tables
//!
//! Run benchmarks with:
//! ```bash
//! cargo bench -p nexus-bench
//! ```

pub mod utils;
