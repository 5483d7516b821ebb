//! Configuration for NexusDB.
//!
//! This module provides the configuration structure for the engine.

mod database;

pub use database::DatabaseConfig;
