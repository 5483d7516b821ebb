//! Public entry point.

use std::fmt;

use nexus_cache::CacheStatsSnapshot;
use nexus_common::{DatabaseConfig, NexusError, NexusResult};
use parking_lot::RwLock;

use crate::executor::{EngineState, Executor};
use crate::parser::SqlParser;
use crate::row::ResultRow;
use crate::storage::{IndexColumn, IndexInfo, IndexSpec, TableId, TableInfo, TableSchema};

/// Options for [`Database::create_index`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Index name; derived from the table and columns when absent.
    pub name: Option<String>,
    /// Reject duplicate keys.
    pub unique: bool,
    /// Make this the primary key.
    pub primary: bool,
}

/// Engine-wide counters.
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    /// SQL texts actually parsed (cache misses).
    pub parse_count: u64,
    /// Parse cache counters.
    pub parse_cache: CacheStatsSnapshot,
    /// Full table scans across all tables.
    pub seq_scans: u64,
    /// Index lookups across all tables.
    pub index_lookups: u64,
}

/// An in-memory SQL database.
///
/// All statements run against one shared state; a batch holds the write
/// lock for its whole duration, so batches from different threads never
/// interleave.
///
/// ```
/// use nexus_memdb::{Database, Value};
///
/// let db = Database::new();
/// db.execute_none("CREATE TABLE t (id serial PRIMARY KEY, name text)").unwrap();
/// db.execute_none("INSERT INTO t (name) VALUES ('a'), ('b')").unwrap();
/// let rows = db.execute_many("SELECT id FROM t WHERE name = 'b'").unwrap();
/// assert_eq!(rows[0]["id"], Value::Int(2));
/// ```
pub struct Database {
    config: DatabaseConfig,
    parser: SqlParser,
    state: RwLock<EngineState>,
}

impl Database {
    /// Creates a database with the default configuration.
    pub fn new() -> Self {
        Self::build(DatabaseConfig::default())
    }

    /// Creates a database with a validated configuration.
    pub fn with_config(config: DatabaseConfig) -> NexusResult<Self> {
        config
            .validate()
            .map_err(|message| NexusError::InvalidArgument { message })?;
        Ok(Self::build(config))
    }

    fn build(config: DatabaseConfig) -> Self {
        Self {
            parser: SqlParser::new(config.parse_cache_capacity),
            config,
            state: RwLock::new(EngineState::default()),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Runs every statement of `sql`, discarding results.
    pub fn execute_none(&self, sql: &str) -> NexusResult<()> {
        self.execute_many(sql).map(|_| ())
    }

    /// Runs every statement of `sql` and returns the rows of the last one.
    /// Execution stops at the first failing statement; earlier statements
    /// of the batch stay applied.
    pub fn execute_many(&self, sql: &str) -> NexusResult<Vec<ResultRow>> {
        let statements = self.parser.parse(sql)?;
        let mut state = self.state.write();
        let mut executor = Executor::new(&mut state, &self.config);
        let mut last = Vec::new();
        for stmt in statements.iter() {
            last = executor.execute(stmt)?;
        }
        Ok(last)
    }

    /// Creates a table from a programmatic definition.
    pub fn declare_table(&self, schema: TableSchema) -> NexusResult<TableInfo> {
        let mut state = self.state.write();
        let EngineState { catalog, txn } = &mut *state;
        let id = catalog.create_table(&schema, txn)?;
        catalog
            .table_by_id(id)
            .map(|table| catalog.info(table, txn))
            .ok_or_else(|| NexusError::internal(format!("table {} vanished after creation", id)))
    }

    /// Creates an index on columns of a table.
    pub fn create_index(&self, table: &str, columns: &[&str], options: IndexOptions) -> NexusResult<IndexInfo> {
        let mut state = self.state.write();
        let EngineState { catalog, txn } = &mut *state;
        let table = catalog.table_mut(table)?;
        let columns = columns
            .iter()
            .map(|c| Ok(IndexColumn::asc(table.column(c)?.expression().clone())))
            .collect::<NexusResult<Vec<_>>>()?;
        let index = table.create_index(
            txn,
            IndexSpec {
                name: options.name,
                columns,
                unique: options.unique || options.primary,
                primary: options.primary,
            },
        )?;
        Ok(index.info())
    }

    /// Names of all tables, in creation order.
    pub fn list_tables(&self) -> Vec<String> {
        let state = self.state.read();
        state
            .catalog
            .tables()
            .into_iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Describes a table.
    pub fn table_info(&self, name: &str) -> NexusResult<TableInfo> {
        let state = self.state.read();
        let table = state.catalog.table(name)?;
        Ok(state.catalog.info(table, &state.txn))
    }

    /// Describes a table by identity.
    pub fn table_by_id(&self, id: TableId) -> Option<TableInfo> {
        let state = self.state.read();
        state
            .catalog
            .table_by_id(id)
            .map(|table| state.catalog.info(table, &state.txn))
    }

    /// Number of rows currently stored in a table.
    pub fn row_count_estimate(&self, name: &str) -> NexusResult<usize> {
        let state = self.state.read();
        Ok(state.catalog.table(name)?.row_count(&state.txn))
    }

    /// Protects a table from (or releases it for) mutation.
    pub fn set_read_only(&self, name: &str, read_only: bool) -> NexusResult<()> {
        self.state.write().catalog.table_mut(name)?.set_read_only(read_only);
        Ok(())
    }

    /// Renames a table.
    pub fn rename_table(&self, from: &str, to: &str) -> NexusResult<()> {
        self.state.write().catalog.rename(from, to)
    }

    /// Engine-wide counters.
    pub fn stats(&self) -> DatabaseStats {
        let state = self.state.read();
        let (seq_scans, index_lookups) = state
            .catalog
            .tables()
            .iter()
            .map(|t| t.stats())
            .fold((0, 0), |(s, i), stats| (s + stats.seq_scans, i + stats.index_lookups));
        DatabaseStats {
            parse_count: self.parser.parse_count(),
            parse_cache: self.parser.cache_stats(),
            seq_scans,
            index_lookups,
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("tables", &self.list_tables())
            .finish_non_exhaustive()
    }
}
