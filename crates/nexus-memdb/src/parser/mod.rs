//! SQL front-end.
//!
//! Statements are parsed by the `sqlparser` crate (PostgreSQL dialect) and
//! lowered into the closed AST of this module. [`SqlParser`] memoizes whole
//! batches in a bounded LRU cache keyed by a SipHash of the query text.
//!
//! # Usage
//!
//! ```
//! use nexus_memdb::parser::{SqlParser, Statement};
//!
//! let parser = SqlParser::new(16);
//! let statements = parser.parse("SELECT 1").unwrap();
//! assert!(matches!(statements[0], Statement::Select(_)));
//!
//! // Same text again is served from the cache.
//! parser.parse("SELECT 1").unwrap();
//! assert_eq!(parser.parse_count(), 1);
//! ```

use std::fmt;
use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nexus_cache::lru::SyncLruCache;
use nexus_cache::stats::CacheStatsSnapshot;
use nexus_common::{NexusError, NexusResult};
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::trace;

mod expr;
mod statement;
mod types;

pub use expr::*;
pub use statement::*;
pub use types::*;

/// Fixed keys so a query text always hashes the same way.
const TEXT_HASH_KEYS: (u64, u64) = (0x6e65_7875_735f_7371, 0x6c5f_7061_7273_6572);

/// A cached parse: the text is kept to rule out hash collisions.
#[derive(Clone)]
struct CachedParse {
    sql: Arc<str>,
    statements: Arc<Vec<Statement>>,
}

/// Parser with a bounded cache of parsed statement batches.
pub struct SqlParser {
    cache: Option<SyncLruCache<u64, CachedParse>>,
    parse_count: AtomicU64,
}

impl SqlParser {
    /// Creates a parser caching up to `capacity` distinct texts.
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: (capacity > 0).then(|| SyncLruCache::new(capacity)),
            parse_count: AtomicU64::new(0),
        }
    }

    /// Parses one or more `;`-separated statements.
    ///
    /// Only successful parses are cached.
    pub fn parse(&self, sql: &str) -> NexusResult<Arc<Vec<Statement>>> {
        let key = text_hash(sql);

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key) {
                if &*hit.sql == sql {
                    trace!(hash = key, "parse cache hit");
                    return Ok(hit.statements);
                }
            }
            trace!(hash = key, "parse cache miss");
        }

        let statements = Arc::new(self.parse_uncached(sql)?);

        if let Some(cache) = &self.cache {
            cache.insert(
                key,
                CachedParse {
                    sql: Arc::from(sql),
                    statements: statements.clone(),
                },
            );
        }
        Ok(statements)
    }

    /// Parses a standalone expression (never cached).
    pub fn parse_expr(&self, sql: &str) -> NexusResult<Expr> {
        self.parse_count.fetch_add(1, Ordering::Relaxed);
        parse_expr(sql)
    }

    /// Number of times the underlying grammar was invoked.
    pub fn parse_count(&self) -> u64 {
        self.parse_count.load(Ordering::Relaxed)
    }

    /// Parse cache counters (all zero when caching is disabled).
    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache
            .as_ref()
            .map(SyncLruCache::stats)
            .unwrap_or_default()
    }

    fn parse_uncached(&self, sql: &str) -> NexusResult<Vec<Statement>> {
        self.parse_count.fetch_add(1, Ordering::Relaxed);

        let dialect = PostgreSqlDialect {};
        let ast = Parser::parse_sql(&dialect, sql)?;
        if ast.is_empty() {
            return Err(unexpected_end());
        }

        ast.into_iter().map(Statement::from_sql_ast).collect()
    }
}

impl fmt::Debug for SqlParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlParser")
            .field("cached", &self.cache.as_ref().map_or(0, SyncLruCache::len))
            .field("parse_count", &self.parse_count())
            .finish()
    }
}

/// Parses a single SQL expression, as used by programmatic index and
/// column definitions.
pub fn parse_expr(sql: &str) -> NexusResult<Expr> {
    if sql.trim().is_empty() {
        return Err(unexpected_end());
    }
    let dialect = PostgreSqlDialect {};
    let mut parser = Parser::new(&dialect).try_with_sql(sql)?;
    let expr = parser.parse_expr()?;
    Expr::from_sql_ast(expr)
}

fn unexpected_end() -> NexusError {
    NexusError::Syntax {
        message: "Unexpected end of input".to_string(),
    }
}

/// Content hash of a query text.
fn text_hash(sql: &str) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(TEXT_HASH_KEYS.0, TEXT_HASH_KEYS.1);
    hasher.write(sql.as_bytes());
    hasher.finish()
}

/// A column reference (table.column or just column).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Optional table or alias name.
    pub table: Option<String>,
    /// Column name.
    pub column: String,
}

impl ColumnRef {
    /// Creates a new column reference.
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            table: None,
            column: column.into(),
        }
    }

    /// Creates a column reference with a table qualifier.
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref table) = self.table {
            write!(f, "{}.{}", table, self.column)
        } else {
            write!(f, "{}", self.column)
        }
    }
}

/// A table reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    /// Optional schema name.
    pub schema: Option<String>,
    /// Table name.
    pub table: String,
    /// Optional alias.
    pub alias: Option<String>,
}

impl TableRef {
    /// Creates a new table reference.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            schema: None,
            table: table.into(),
            alias: None,
        }
    }

    /// Adds an alias to the table reference.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Returns the effective name (alias or table name).
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    /// Splits a possibly schema-qualified object name.
    pub fn from_object_name(name: &sqlparser::ast::ObjectName) -> Self {
        let mut parts: Vec<String> = name.0.iter().map(|i| i.value.clone()).collect();
        let table = parts.pop().unwrap_or_default();
        Self {
            schema: parts.pop(),
            table,
            alias: None,
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref schema) = self.schema {
            write!(f, "{}.{}", schema, self.table)?;
        } else {
            write!(f, "{}", self.table)?;
        }
        if let Some(ref alias) = self.alias {
            write!(f, " AS {}", alias)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_hit_does_not_reparse() {
        let parser = SqlParser::new(8);
        let first = parser.parse("SELECT * FROM users WHERE age > 18").unwrap();
        assert_eq!(parser.parse_count(), 1);

        let second = parser.parse("SELECT * FROM users WHERE age > 18").unwrap();
        assert_eq!(parser.parse_count(), 1);
        assert_eq!(first, second);
        assert!(Arc::ptr_eq(&first, &second));

        let stats = parser.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_cache_disabled() {
        let parser = SqlParser::new(0);
        parser.parse("SELECT 1").unwrap();
        parser.parse("SELECT 1").unwrap();
        assert_eq!(parser.parse_count(), 2);
        assert_eq!(parser.cache_stats(), CacheStatsSnapshot::default());
    }

    #[test]
    fn test_cache_eviction() {
        let parser = SqlParser::new(1);
        parser.parse("SELECT 1").unwrap();
        parser.parse("SELECT 2").unwrap();
        parser.parse("SELECT 1").unwrap();
        assert_eq!(parser.parse_count(), 3);
    }

    #[test]
    fn test_failed_parse_not_cached() {
        let parser = SqlParser::new(4);
        assert!(parser.parse("SELEC 1").is_err());
        assert!(parser.parse("SELEC 1").is_err());
        assert_eq!(parser.parse_count(), 2);
    }

    #[test]
    fn test_empty_input() {
        let parser = SqlParser::new(4);
        let err = parser.parse("   ").unwrap_err();
        assert_eq!(err.kind(), nexus_common::ErrorKind::Query);
        assert!(err.to_string().contains("Unexpected end of input"));
        assert!(parse_expr("").is_err());
    }

    #[test]
    fn test_multiple_statements() {
        let parser = SqlParser::new(4);
        let statements = parser.parse("BEGIN; SELECT 1; COMMIT").unwrap();
        assert_eq!(statements.len(), 3);
    }

    #[test]
    fn test_table_ref() {
        let table = TableRef::new("users").with_alias("u");
        assert_eq!(table.to_string(), "users AS u");
        assert_eq!(table.effective_name(), "u");
    }
}
