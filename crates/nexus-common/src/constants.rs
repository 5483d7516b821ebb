//! System-wide constants for NexusDB.

// =============================================================================
// Parser Constants
// =============================================================================

/// Default number of parsed statement batches kept in the parse cache.
pub const DEFAULT_PARSE_CACHE_CAPACITY: usize = 1000;

// =============================================================================
// Catalog Constants
// =============================================================================

/// Name of the schema every table lives in.
pub const DEFAULT_SCHEMA: &str = "public";

// =============================================================================
// Value Constants
// =============================================================================

/// Tolerance used when comparing floating point values for equality.
pub const FLOAT_EQUALITY_DELTA: f64 = 0.0001;

/// Prefix given to unnamed expressions in a select list (`column0`, ...).
pub const UNNAMED_COLUMN_PREFIX: &str = "column";
