//! # nexus-common
//!
//! Common types, errors, and configuration for the NexusDB in-memory engine.
//!
//! This crate provides the foundational pieces shared by every NexusDB
//! component:
//!
//! - **Errors**: Unified error handling with [`NexusError`] and [`ErrorCode`]
//! - **Config**: Engine configuration ([`DatabaseConfig`])
//! - **Constants**: System-wide defaults and limits
//!
//! ## Example
//!
//! ```rust
//! use nexus_common::{NexusError, NexusResult};
//!
//! fn lookup(name: &str) -> NexusResult<()> {
//!     Err(NexusError::TableNotFound { table: name.to_string() })
//! }
//!
//! assert!(lookup("users").is_err());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;

// Re-export commonly used items at the crate root
pub use config::DatabaseConfig;
pub use constants::*;
pub use error::{ErrorCode, ErrorKind, NexusError, NexusResult};
