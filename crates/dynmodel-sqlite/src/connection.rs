//! SQLite connection implementation.
//!
//! Safe wrappers around SQLite's C API implementing the `Connection`,
//! `Cursor`, `Transaction` and `ConnectionSource` traits from
//! dynmodel-core.
//!
//! The database handle lives behind an `Arc<Mutex<_>>` shared by the
//! connection and every cursor it hands out, so a cursor keeps the database
//! open after the connection handle is dropped. The handle is closed when the
//! last owner goes away.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::borrow_as_ptr)]

use crate::ffi;
use crate::types;
use dynmodel_core::{
    Connection, ConnectionSource, Cursor, Error, Result, Transaction, Value,
    error::{
        ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind, TransactionError,
        TransactionErrorKind,
    },
};
use std::ffi::{CStr, CString, c_char, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Configuration for opening SQLite connections.
///
/// A config is also a [`ConnectionSource`]: every `open` creates a fresh
/// connection to the same database.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Open in multi-thread mode.
    pub no_mutex: bool,
    /// Open in serialized mode.
    pub full_mutex: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.no_mutex {
            flags |= ffi::SQLITE_OPEN_NOMUTEX;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Create a new config for an in-memory database.
    ///
    /// Each connection opened from this config gets its own private database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

impl ConnectionSource for SqliteConfig {
    type Conn = SqliteConnection;

    fn open(&self) -> Result<SqliteConnection> {
        SqliteConnection::open(self)
    }
}

/// Inner state of the SQLite connection, protected by a mutex for thread safety.
struct SqliteInner {
    db: *mut ffi::sqlite3,
    in_transaction: bool,
}

// SAFETY: the raw handle is only touched while holding the surrounding Mutex.
unsafe impl Send for SqliteInner {}

impl Drop for SqliteInner {
    fn drop(&mut self) {
        if !self.db.is_null() {
            // SAFETY: db is valid and no statement outlives its owning Arc
            unsafe {
                ffi::sqlite3_close_v2(self.db);
            }
        }
    }
}

type Shared = Arc<Mutex<SqliteInner>>;

fn lock(inner: &Shared) -> MutexGuard<'_, SqliteInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A connection to a SQLite database.
///
/// This is a thread-safe wrapper around a SQLite database handle.
pub struct SqliteConnection {
    inner: Shared,
    path: String,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "Invalid path: contains null byte".to_string(),
                source: None,
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is valid, errmsg returns a valid C string
                unsafe {
                    let msg = error_message(db);
                    ffi::sqlite3_close_v2(db);
                    msg
                }
            };

            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database: {}", msg),
                source: None,
            }));
        }

        if config.busy_timeout_ms > 0 {
            let ms = c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX);
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, ms);
            }
        }

        tracing::debug!(path = %config.path, "Opened SQLite connection");

        Ok(Self {
            inner: Arc::new(Mutex::new(SqliteInner {
                db,
                in_transaction: false,
            })),
            path: config.path.clone(),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Execute SQL directly without binding (for DDL, etc.)
    ///
    /// The text may contain several `;`-separated statements.
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let inner = lock(&self.inner);
        exec_raw(inner.db, sql)
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> i64 {
        let inner = lock(&self.inner);
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(inner.db) }
    }

    /// Whether a transaction is currently open.
    pub fn in_transaction(&self) -> bool {
        lock(&self.inner).in_transaction
    }

    /// Prepare, bind and run every statement in `sql`, returning the total
    /// number of rows changed.
    fn execute_sync(&self, sql: &str, params: &[Value]) -> Result<u64> {
        tracing::trace!(sql = %sql, params = params.len(), "Executing SQLite statement");

        let inner = lock(&self.inner);
        let (changes, binds) = run_statements(inner.db, sql, params)?;
        tracing::trace!(changes = changes, binds = binds, "SQLite statements finished");
        Ok(changes)
    }

    /// Prepare and bind a query, returning a streaming cursor over its rows.
    fn query_cursor(&self, sql: &str, params: &[Value]) -> Result<SqliteCursor> {
        tracing::trace!(sql = %sql, params = params.len(), "Opening SQLite cursor");

        let inner = lock(&self.inner);
        let statement = prepare_stmt(inner.db, sql)?;
        bind_params(inner.db, statement.0, sql, params, 0)?;

        // SAFETY: stmt is valid
        let col_count = unsafe { ffi::sqlite3_column_count(statement.0) };
        let columns = (0..col_count)
            // SAFETY: stmt is valid and i < col_count
            .map(|i| unsafe { types::column_name(statement.0, i) }.unwrap_or_else(|| format!("col{}", i)))
            .collect();
        drop(inner);

        Ok(SqliteCursor {
            stmt: statement.release(),
            inner: Arc::clone(&self.inner),
            columns,
            sql: sql.to_string(),
        })
    }

    fn begin_sync(&self) -> Result<()> {
        let mut inner = lock(&self.inner);
        if inner.in_transaction {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::AlreadyActive,
                message: "Already in a transaction".to_string(),
            }));
        }
        exec_raw(inner.db, "BEGIN IMMEDIATE")?;
        inner.in_transaction = true;
        tracing::trace!(path = %self.path, "BEGIN");
        Ok(())
    }

    fn finish_sync(&self, verb: &'static str) -> Result<()> {
        let mut inner = lock(&self.inner);
        if !inner.in_transaction {
            return Err(Error::Transaction(TransactionError {
                kind: TransactionErrorKind::NotActive,
                message: "Not in a transaction".to_string(),
            }));
        }
        exec_raw(inner.db, verb)?;
        inner.in_transaction = false;
        tracing::trace!(path = %self.path, "{}", verb);
        Ok(())
    }

    fn commit_sync(&self) -> Result<()> {
        self.finish_sync("COMMIT")
    }

    fn rollback_sync(&self) -> Result<()> {
        self.finish_sync("ROLLBACK")
    }
}

impl Connection for SqliteConnection {
    type Cursor = SqliteCursor;
    type Tx<'conn>
        = SqliteTransaction<'conn>
    where
        Self: 'conn;

    fn query(&self, sql: &str, params: &[Value]) -> Result<SqliteCursor> {
        self.query_cursor(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.execute_sync(sql, params)
    }

    fn begin(&self) -> Result<SqliteTransaction<'_>> {
        self.begin_sync()?;
        Ok(SqliteTransaction::new(self))
    }
}

/// A prepared statement finalized on drop.
struct Statement(*mut ffi::sqlite3_stmt);

impl Statement {
    fn release(self) -> *mut ffi::sqlite3_stmt {
        let stmt = self.0;
        std::mem::forget(self);
        stmt
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        // SAFETY: the statement is valid and finalized exactly once
        unsafe {
            ffi::sqlite3_finalize(self.0);
        }
    }
}

/// A forward-only cursor over the rows of one SQLite query.
///
/// The cursor shares ownership of the database handle, so it stays usable
/// after the connection that created it is dropped. The statement is
/// finalized as soon as it reports completion or an error, or when the cursor
/// is dropped.
pub struct SqliteCursor {
    stmt: *mut ffi::sqlite3_stmt,
    inner: Shared,
    columns: Vec<String>,
    sql: String,
}

// SAFETY: stmt is only used while holding the lock on `inner`.
unsafe impl Send for SqliteCursor {}

impl std::fmt::Debug for SqliteCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCursor")
            .field("sql", &self.sql)
            .field("columns", &self.columns)
            .field("finished", &self.stmt.is_null())
            .finish()
    }
}

impl SqliteCursor {
    /// True once the statement has been finalized.
    pub fn is_finished(&self) -> bool {
        self.stmt.is_null()
    }

    fn finalize(&mut self) {
        if !self.stmt.is_null() {
            let _inner = lock(&self.inner);
            // SAFETY: stmt is valid and nulled right after
            unsafe {
                ffi::sqlite3_finalize(self.stmt);
            }
            self.stmt = ptr::null_mut();
        }
    }
}

impl Cursor for SqliteCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        if self.stmt.is_null() {
            return Ok(None);
        }

        let inner = lock(&self.inner);
        // SAFETY: stmt is valid while non-null
        let rc = unsafe { ffi::sqlite3_step(self.stmt) };
        match rc {
            ffi::SQLITE_ROW => {
                let count = self.columns.len() as c_int;
                // SAFETY: stmt just returned SQLITE_ROW
                let values = (0..count)
                    .map(|i| unsafe { types::read_column(self.stmt, i) })
                    .collect();
                Ok(Some(values))
            }
            ffi::SQLITE_DONE => {
                drop(inner);
                self.finalize();
                Ok(None)
            }
            _ => {
                let err = statement_error(inner.db, &self.sql);
                drop(inner);
                self.finalize();
                Err(err)
            }
        }
    }
}

impl Drop for SqliteCursor {
    fn drop(&mut self) {
        self.finalize();
    }
}

/// A SQLite transaction.
///
/// Rolled back on drop unless committed.
#[derive(Debug)]
pub struct SqliteTransaction<'conn> {
    conn: &'conn SqliteConnection,
    finished: bool,
}

impl<'conn> SqliteTransaction<'conn> {
    fn new(conn: &'conn SqliteConnection) -> Self {
        Self {
            conn,
            finished: false,
        }
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(path = %self.conn.path, "Rolling back uncommitted transaction");
            if let Err(e) = self.conn.rollback_sync() {
                tracing::warn!(error = %e, "Rollback on drop failed");
            }
        }
    }
}

impl Transaction for SqliteTransaction<'_> {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.conn.execute_sync(sql, params)
    }

    fn scalar(&self, sql: &str, params: &[Value]) -> Result<Value> {
        self.conn.scalar(sql, params)
    }

    fn commit(mut self) -> Result<()> {
        self.conn.commit_sync()?;
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.rollback_sync()
    }
}

// Helper functions

fn to_cstring(sql: &str) -> Result<CString> {
    CString::new(sql).map_err(|_| {
        Error::Query(QueryError {
            kind: QueryErrorKind::Syntax,
            sql: Some(sql.to_string()),
            message: "SQL contains null byte".to_string(),
            source: None,
        })
    })
}

fn exec_raw(db: *mut ffi::sqlite3, sql: &str) -> Result<()> {
    let c_sql = to_cstring(sql)?;
    let mut errmsg: *mut c_char = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };

    if rc != ffi::SQLITE_OK {
        let msg = if errmsg.is_null() {
            ffi::error_string(rc).to_string()
        } else {
            // SAFETY: errmsg is a valid C string owned by SQLite
            unsafe {
                let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                ffi::sqlite3_free(errmsg.cast());
                msg
            }
        };

        return Err(Error::Query(QueryError {
            kind: error_code_to_kind(rc),
            sql: Some(sql.to_string()),
            message: msg,
            source: None,
        }));
    }

    Ok(())
}

fn prepare_stmt(db: *mut ffi::sqlite3, sql: &str) -> Result<Statement> {
    let c_sql = to_cstring(sql)?;
    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe {
        ffi::sqlite3_prepare_v2(
            db,
            c_sql.as_ptr(),
            c_sql.as_bytes().len() as c_int,
            &mut stmt,
            ptr::null_mut(),
        )
    };

    if rc != ffi::SQLITE_OK {
        return Err(statement_error(db, sql));
    }
    if stmt.is_null() {
        return Err(Error::Query(QueryError {
            kind: QueryErrorKind::Syntax,
            sql: Some(sql.to_string()),
            message: "SQL contains no statement".to_string(),
            source: None,
        }));
    }

    Ok(Statement(stmt))
}

/// Run every statement in `sql`, returning rows changed and values bound.
///
/// One parameter list serves all statements, which number their
/// placeholders globally (`?1 .. ?N`) in ascending order. A statement whose
/// highest placeholder goes past what earlier statements bound binds only
/// the new range; a statement that stays within it rebinds from `?1`.
fn run_statements(db: *mut ffi::sqlite3, sql: &str, params: &[Value]) -> Result<(u64, usize)> {
    let c_sql = to_cstring(sql)?;
    let bytes = c_sql.as_bytes();
    let mut offset = 0usize;
    let mut bound_upto = 0usize;
    let mut changes = 0u64;
    let mut binds = 0usize;

    while offset < bytes.len() {
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();
        // SAFETY: offset is within the NUL-terminated buffer
        let rc = unsafe {
            let start = c_sql.as_ptr().add(offset);
            ffi::sqlite3_prepare_v2(db, start, (bytes.len() - offset) as c_int, &mut stmt, &mut tail)
        };
        if rc != ffi::SQLITE_OK {
            return Err(statement_error(db, sql));
        }
        if stmt.is_null() {
            // only whitespace or comments remain
            break;
        }
        let statement = Statement(stmt);
        // SAFETY: tail points into c_sql, at or after the start pointer
        offset = unsafe { tail.offset_from(c_sql.as_ptr()) } as usize;

        let highest = parameter_count(statement.0);
        let from = if highest > bound_upto { bound_upto } else { 0 };
        binds += bind_params(db, statement.0, sql, params, from)?;
        bound_upto = bound_upto.max(highest);

        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(statement.0) };
        match rc {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => {
                // SAFETY: db is valid
                let changed = unsafe { ffi::sqlite3_changes(db) };
                changes += u64::try_from(changed).unwrap_or(0);
            }
            _ => return Err(statement_error(db, sql)),
        }
    }

    Ok((changes, binds))
}

fn parameter_count(stmt: *mut ffi::sqlite3_stmt) -> usize {
    // SAFETY: stmt is valid
    let count = unsafe { ffi::sqlite3_bind_parameter_count(stmt) };
    usize::try_from(count).unwrap_or(0)
}

/// Bind `params[from..]` up to the statement's highest placeholder.
///
/// Returns the number of values bound.
fn bind_params(
    db: *mut ffi::sqlite3,
    stmt: *mut ffi::sqlite3_stmt,
    sql: &str,
    params: &[Value],
    from: usize,
) -> Result<usize> {
    let expected = parameter_count(stmt);
    if expected > params.len() {
        return Err(Error::Query(QueryError {
            kind: QueryErrorKind::Bind,
            sql: Some(sql.to_string()),
            message: format!(
                "statement uses {} parameters but {} were supplied",
                expected,
                params.len()
            ),
            source: None,
        }));
    }

    for (i, param) in params.iter().enumerate().take(expected).skip(from) {
        // SAFETY: stmt is valid, index is 1-based and within the parameter count
        let rc = unsafe { types::bind_value(stmt, (i + 1) as c_int, param) };
        if rc != ffi::SQLITE_OK {
            return Err(Error::Query(QueryError {
                kind: QueryErrorKind::Bind,
                sql: Some(sql.to_string()),
                message: format!("Failed to bind parameter {}: {}", i + 1, error_message(db)),
                source: None,
            }));
        }
    }
    Ok(expected.saturating_sub(from))
}

fn error_message(db: *mut ffi::sqlite3) -> String {
    // SAFETY: db is valid, errmsg returns a valid C string
    unsafe {
        let ptr = ffi::sqlite3_errmsg(db);
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

fn statement_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let code = unsafe { ffi::sqlite3_errcode(db) };

    Error::Query(QueryError {
        kind: error_code_to_kind(code),
        sql: Some(sql.to_string()),
        message: error_message(db),
        source: None,
    })
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        _ => QueryErrorKind::Database,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> SqliteConnection {
        let conn = SqliteConnection::open_memory().unwrap();
        conn.execute_raw("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, qty INTEGER)")
            .unwrap();
        conn
    }

    #[test]
    fn test_open_flags() {
        let flags = OpenFlags::default().to_sqlite_flags();
        assert_eq!(
            flags,
            ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE
        );
        let ro = OpenFlags::read_only().to_sqlite_flags();
        assert_eq!(ro, ffi::SQLITE_OPEN_READONLY);
    }

    #[test]
    fn test_execute_counts_changes_across_statements() {
        let conn = setup();
        let changed = conn
            .execute(
                "INSERT INTO t (name, qty) VALUES (?1, ?2); INSERT INTO t (name, qty) VALUES (?3, ?4);",
                &[
                    Value::Text("a".into()),
                    Value::Int(1),
                    Value::Text("b".into()),
                    Value::Int(2),
                ],
            )
            .unwrap();
        assert_eq!(changed, 2);
        assert_eq!(
            conn.scalar("SELECT SUM(qty) FROM t", &[]).unwrap(),
            Value::Int(3)
        );
    }

    #[test]
    fn test_batch_binds_each_parameter_once() {
        let conn = setup();
        let rows = 500;
        let mut sql = Vec::with_capacity(rows);
        let mut params = Vec::with_capacity(rows * 2);
        for i in 0..rows {
            sql.push(format!(
                "INSERT INTO t (name, qty) VALUES (?{}, ?{});",
                2 * i + 1,
                2 * i + 2
            ));
            params.push(Value::Text(format!("n{i}")));
            params.push(Value::Int(i as i32));
        }

        let inner = lock(&conn.inner);
        let (changes, binds) = run_statements(inner.db, &sql.join(" "), &params).unwrap();
        drop(inner);

        assert_eq!(changes, rows as u64);
        assert_eq!(binds, params.len());
        assert_eq!(
            conn.scalar("SELECT qty FROM t WHERE name = 'n499'", &[]).unwrap(),
            Value::Int(499)
        );
    }

    #[test]
    fn test_statements_may_reuse_placeholders() {
        let conn = setup();
        let changed = conn
            .execute(
                "INSERT INTO t (name) VALUES (?1); INSERT INTO t (name) VALUES (?1);",
                &[Value::Text("twice".into())],
            )
            .unwrap();
        assert_eq!(changed, 2);
        assert_eq!(
            conn.scalar("SELECT COUNT(*) FROM t WHERE name = 'twice'", &[]).unwrap(),
            Value::Int(2)
        );
    }

    #[test]
    fn test_missing_parameters_rejected() {
        let conn = setup();
        let err = conn
            .execute("INSERT INTO t (name) VALUES (?1)", &[])
            .unwrap_err();
        match err {
            Error::Query(q) => assert_eq!(q.kind, QueryErrorKind::Bind),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cursor_streams_and_finishes() {
        let conn = setup();
        conn.execute_raw("INSERT INTO t (name, qty) VALUES ('x', NULL), ('y', 5000000000)")
            .unwrap();
        let mut cursor = conn
            .query("SELECT id, name, qty FROM t ORDER BY id", &[])
            .unwrap();
        assert_eq!(cursor.columns(), &["id", "name", "qty"]);

        let first = cursor.next_row().unwrap().unwrap();
        assert_eq!(first[1], Value::Text("x".into()));
        assert_eq!(first[2], Value::Null);
        let second = cursor.next_row().unwrap().unwrap();
        assert_eq!(second[2], Value::BigInt(5_000_000_000));
        assert!(!cursor.is_finished());
        assert!(cursor.next_row().unwrap().is_none());
        assert!(cursor.is_finished());
        assert!(cursor.next_row().unwrap().is_none());
    }

    #[test]
    fn test_cursor_outlives_connection() {
        let conn = setup();
        conn.execute_raw("INSERT INTO t (name) VALUES ('kept')").unwrap();
        let mut cursor = conn.query("SELECT name FROM t", &[]).unwrap();
        drop(conn);
        let row = cursor.next_row().unwrap().unwrap();
        assert_eq!(row, vec![Value::Text("kept".into())]);
    }

    #[test]
    fn test_prepare_error_carries_sql() {
        let conn = setup();
        let err = conn.query("SELECT * FROM missing", &[]).unwrap_err();
        assert_eq!(err.sql(), Some("SELECT * FROM missing"));
    }

    #[test]
    fn test_transaction_rollback_on_drop() {
        let conn = setup();
        {
            let tx = conn.begin().unwrap();
            tx.execute("INSERT INTO t (name) VALUES (?1)", &[Value::Text("gone".into())])
                .unwrap();
            assert!(conn.in_transaction());
        }
        assert!(!conn.in_transaction());
        assert_eq!(conn.scalar("SELECT COUNT(*) FROM t", &[]).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_transaction_commit() {
        let conn = setup();
        let tx = conn.begin().unwrap();
        tx.execute("INSERT INTO t (name) VALUES (?1)", &[Value::Text("kept".into())])
            .unwrap();
        assert_eq!(
            tx.scalar("SELECT COUNT(*) FROM t", &[]).unwrap(),
            Value::Int(1)
        );
        tx.commit().unwrap();
        assert_eq!(conn.scalar("SELECT COUNT(*) FROM t", &[]).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_nested_begin_rejected() {
        let conn = setup();
        let _tx = conn.begin().unwrap();
        let err = conn.begin().unwrap_err();
        assert!(matches!(
            err,
            Error::Transaction(TransactionError {
                kind: TransactionErrorKind::AlreadyActive,
                ..
            })
        ));
    }
}
