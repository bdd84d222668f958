//! Table handles.
//!
//! A [`DynamicModel`] binds a table name, its primary key field and a SQL
//! dialect to a [`ConnectionSource`]. Every operation opens its own
//! connection through the source and releases it when done; streaming reads
//! hand the connection's lifetime over to the returned cursor.

use std::fmt;

use dynmodel_core::{
    Connection, ConnectionSource, Dialect, Entity, Error, FromRecord, Record, RecordValidator,
    Result, SqliteDialect, TypeError, Value,
};

use crate::hooks::{BatchHooks, DefaultHooks};
use crate::multimap::{
    DEFAULT_MAX_LINKED, DEFAULT_SPLITTER_PREFIX, LinkShapes, LinkedObjects, MultiMapOptions,
    MultiMapper, SplitMode, TypedMultiMapper,
};
use crate::query::{Page, Records, Select, Typed, page_offset};

/// Cursor type produced by a source's connections.
pub type CursorOf<S> = <<S as ConnectionSource>::Conn as Connection>::Cursor;

/// Table handle configuration.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Table name, optionally schema-qualified
    pub table: String,
    /// Primary key field
    pub primary_key: String,
    /// Sequence feeding primary key values, for dialects that fetch them
    /// before inserting
    pub sequence: Option<String>,
    /// Splitter prefix used by multi-mapping queries
    pub splitter_prefix: String,
    /// Linked-object slots used by dynamic multi-mapping queries
    pub max_linked: usize,
    /// Rules checked before inserts and updates
    pub validator: Option<RecordValidator>,
}

impl ModelConfig {
    /// Configuration for `table` keyed by `primary_key`.
    pub fn new(table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
            sequence: None,
            splitter_prefix: DEFAULT_SPLITTER_PREFIX.to_string(),
            max_linked: DEFAULT_MAX_LINKED,
            validator: None,
        }
    }

    /// Take primary key values from `sequence`.
    pub fn sequence(mut self, sequence: impl Into<String>) -> Self {
        self.sequence = Some(sequence.into());
        self
    }

    /// Set the splitter prefix for multi-mapping queries.
    pub fn splitter_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.splitter_prefix = prefix.into();
        self
    }

    /// Set the linked-object slot count for multi-mapping queries.
    pub fn max_linked(mut self, max_linked: usize) -> Self {
        self.max_linked = max_linked;
        self
    }

    /// Attach a validator.
    pub fn validator(mut self, validator: RecordValidator) -> Self {
        self.validator = Some(validator);
        self
    }
}

/// A dynamic handle over one database table.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use dynmodel::{DynamicModel, ModelConfig};
/// use dynmodel_core::{record, Value};
/// use dynmodel_sqlite::SqliteConnection;
///
/// let conn = Arc::new(SqliteConnection::open_memory().unwrap());
/// conn.execute_raw("CREATE TABLE Products (Id INTEGER PRIMARY KEY, Name TEXT, Qty INTEGER)")
///     .unwrap();
///
/// let products = DynamicModel::new(Arc::clone(&conn), ModelConfig::new("Products", "Id"));
/// let inserted = products
///     .insert_batch(&[record! { "Name" => "x", "Qty" => 1 }, record! { "Name" => "y", "Qty" => 2 }])
///     .unwrap();
/// assert_eq!(inserted, 2);
/// assert_eq!(products.count("Qty > ?1", &[Value::Int(1)]).unwrap(), 1);
/// ```
pub struct DynamicModel<S> {
    source: S,
    config: ModelConfig,
    dialect: Box<dyn Dialect>,
    hooks: Box<dyn BatchHooks + Send + Sync>,
}

impl<S> fmt::Debug for DynamicModel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicModel")
            .field("config", &self.config)
            .field("dialect", &self.dialect.name())
            .finish_non_exhaustive()
    }
}

impl<S: ConnectionSource> DynamicModel<S> {
    /// Create a handle using the SQLite dialect and default hooks.
    pub fn new(source: S, config: ModelConfig) -> Self {
        Self {
            source,
            config,
            dialect: Box::new(SqliteDialect),
            hooks: Box::new(DefaultHooks),
        }
    }

    /// Use another dialect.
    pub fn with_dialect(mut self, dialect: impl Dialect + 'static) -> Self {
        self.dialect = Box::new(dialect);
        self
    }

    /// Install lifecycle hooks.
    pub fn with_hooks(mut self, hooks: impl BatchHooks + Send + Sync + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn table(&self) -> &str {
        &self.config.table
    }

    pub fn primary_key(&self) -> &str {
        &self.config.primary_key
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub(crate) fn hooks(&self) -> &dyn BatchHooks {
        self.hooks.as_ref()
    }

    /// Run a query and stream its rows as records.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Records<CursorOf<S>>> {
        let conn = self.source.open()?;
        let cursor = conn.query(sql, params)?;
        Ok(Records::new(cursor))
    }

    /// Run a query and stream its rows as `T`.
    pub fn query_as<T: FromRecord>(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Typed<Records<CursorOf<S>>, T>> {
        Ok(self.query(sql, params)?.into_typed())
    }

    fn select_sql(&self, select: &Select) -> String {
        self.dialect.select_statement(
            &self.config.table,
            &select.columns,
            &select.where_clause,
            &select.order_by,
            select.limit,
        )
    }

    /// All rows matching `select`.
    pub fn all(&self, select: &Select) -> Result<Vec<Record>> {
        self.query(&self.select_sql(select), &select.params)?
            .collect()
    }

    /// All rows matching `select`, as `T`.
    pub fn all_as<T: FromRecord>(&self, select: &Select) -> Result<Vec<T>> {
        self.query_as(&self.select_sql(select), &select.params)?
            .collect()
    }

    /// First row matching `where_clause`, if any.
    pub fn single(&self, where_clause: &str, params: &[Value]) -> Result<Option<Record>> {
        self.single_as(where_clause, params)
    }

    /// First row matching `where_clause`, as `T`.
    pub fn single_as<T: FromRecord>(
        &self,
        where_clause: &str,
        params: &[Value],
    ) -> Result<Option<T>> {
        let select = Select::new()
            .filter(where_clause, params.to_vec())
            .limit(1);
        self.query_as(&self.select_sql(&select), &select.params)?
            .next()
            .transpose()
    }

    /// Row whose primary key equals `key`.
    pub fn get_by_primary_key<T: FromRecord>(&self, key: impl Into<Value>) -> Result<Option<T>> {
        let where_clause = format!(
            "{} = {}",
            self.dialect.quote_identifier(&self.config.primary_key),
            self.dialect.placeholder(0)
        );
        self.single_as(&where_clause, &[key.into()])
    }

    /// Number of rows matching `where_clause` (all rows when blank).
    pub fn count(&self, where_clause: &str, params: &[Value]) -> Result<u64> {
        let conn = self.source.open()?;
        self.count_on(&conn, where_clause, params)
    }

    fn count_on(&self, conn: &S::Conn, where_clause: &str, params: &[Value]) -> Result<u64> {
        let sql = self.dialect.count_statement(&self.config.table, where_clause);
        let value = conn.scalar(&sql, params)?;
        value
            .as_i64()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| {
                Error::Type(TypeError {
                    expected: "row count",
                    actual: value.type_name().to_string(),
                    column: None,
                    rust_type: None,
                })
            })
    }

    /// One page of the rows matching `select`.
    ///
    /// Pages are numbered from 1. Without an explicit ordering rows are
    /// ordered by primary key. `select.limit` is ignored.
    pub fn paged(&self, select: &Select, current_page: u64, page_size: u64) -> Result<Page<Record>> {
        let offset = page_offset(current_page, page_size)?;
        let order_by = if select.order_by.trim().is_empty() {
            self.dialect.quote_identifier(&self.config.primary_key)
        } else {
            select.order_by.clone()
        };

        let conn = self.source.open()?;
        let total = self.count_on(&conn, &select.where_clause, &select.params)?;
        let sql = self.dialect.paged_statement(
            &self.config.table,
            &select.columns,
            &select.where_clause,
            &order_by,
            page_size,
            offset,
        );
        let items = Records::new(conn.query(&sql, &select.params)?).collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            table = %self.config.table,
            page = current_page,
            total = total,
            rows = items.len(),
            "Fetched page"
        );
        Ok(Page::new(total, page_size, items))
    }

    /// One page of the rows matching `select`, as `T`.
    pub fn paged_as<T: FromRecord>(
        &self,
        select: &Select,
        current_page: u64,
        page_size: u64,
    ) -> Result<Page<T>> {
        self.paged(select, current_page, page_size)?
            .try_map(|record| T::from_record(&record))
    }

    fn link_options(&self, mode: SplitMode) -> MultiMapOptions {
        MultiMapOptions::new()
            .mode(mode)
            .splitter_prefix(self.config.splitter_prefix.clone())
            .max_linked(self.config.max_linked)
    }

    /// Run a multi-object query, streaming main records.
    ///
    /// `callback` receives each row's linked records before the main record
    /// is yielded.
    pub fn query_and_link<F>(
        &self,
        sql: &str,
        params: &[Value],
        mode: SplitMode,
        callback: F,
    ) -> Result<MultiMapper<CursorOf<S>, F>>
    where
        F: FnMut(&mut Record, LinkedObjects) -> Result<()>,
    {
        let conn = self.source.open()?;
        let cursor = conn.query(sql, params)?;
        MultiMapper::new(cursor, &self.link_options(mode), callback)
    }

    /// Typed [`query_and_link`](Self::query_and_link).
    ///
    /// The main shape is `T`; `L` is a tuple of linked shapes.
    pub fn query_and_link_as<T, L, F>(
        &self,
        sql: &str,
        params: &[Value],
        mode: SplitMode,
        callback: F,
    ) -> Result<TypedMultiMapper<CursorOf<S>, T, L, F>>
    where
        T: Entity,
        L: LinkShapes,
        F: FnMut(&mut T, L::Objects) -> Result<()>,
    {
        let conn = self.source.open()?;
        let cursor = conn.query(sql, params)?;
        TypedMultiMapper::new(cursor, &self.link_options(mode), callback)
    }
}
