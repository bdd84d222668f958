//! Database connection traits.
//!
//! This module defines the abstractions every driver implements:
//!
//! - [`ConnectionSource`] - Opens an owned connection per operation
//! - [`Connection`] - Executes statements and starts transactions
//! - [`Cursor`] - Forward-only, owned stream of result rows
//! - [`Transaction`] - Statements executed until commit; rolled back on drop
//! - [`Command`] - SQL text plus its positional parameters
//!
//! All operations are synchronous and blocking.

use crate::error::Result;
use crate::value::Value;
use std::sync::Arc;

/// A parameterized SQL command.
///
/// Placeholder `i` in `sql` binds `params[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    /// The SQL text
    pub sql: String,
    /// Positional parameters, in placeholder order
    pub params: Vec<Value>,
}

impl Command {
    /// Create a command with no parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Create a command with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Append a parameter, returning the index it binds to.
    pub fn push_param(&mut self, value: impl Into<Value>) -> usize {
        self.params.push(value.into());
        self.params.len() - 1
    }

    /// Number of bound parameters.
    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}

/// A forward-only stream of result rows.
///
/// A cursor owns whatever driver resources it needs, so it may outlive the
/// connection handle that produced it. Dropping it releases them.
pub trait Cursor {
    /// Column names of the result set, in order.
    fn columns(&self) -> &[String];

    /// Read the next row, or `None` once the result set is exhausted.
    fn next_row(&mut self) -> Result<Option<Vec<Value>>>;
}

impl<C: Cursor + ?Sized> Cursor for Box<C> {
    fn columns(&self) -> &[String] {
        (**self).columns()
    }

    fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        (**self).next_row()
    }
}

/// A database connection capable of executing statements.
pub trait Connection {
    /// Cursor type returned by [`query`](Connection::query).
    type Cursor: Cursor;

    /// Transaction type returned by [`begin`](Connection::begin).
    type Tx<'conn>: Transaction
    where
        Self: 'conn;

    /// Execute a query and return a cursor over its rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Self::Cursor>;

    /// Execute a statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute a query and return the first column of its first row.
    ///
    /// Returns `Value::Null` when the query produces no rows.
    fn scalar(&self, sql: &str, params: &[Value]) -> Result<Value> {
        let mut cursor = self.query(sql, params)?;
        Ok(first_value(cursor.next_row()?))
    }

    /// Begin a transaction.
    fn begin(&self) -> Result<Self::Tx<'_>>;
}

/// Statements executed inside an open transaction.
///
/// Dropping a transaction without calling [`commit`](Transaction::commit)
/// rolls it back. The trait is dyn-compatible so statement-building code can
/// take `&dyn Transaction`.
pub trait Transaction {
    /// Execute a statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute a query and return the first column of its first row.
    fn scalar(&self, sql: &str, params: &[Value]) -> Result<Value>;

    /// Execute a prepared [`Command`].
    fn run(&self, command: &Command) -> Result<u64> {
        self.execute(&command.sql, &command.params)
    }

    /// Commit the transaction.
    fn commit(self) -> Result<()>
    where
        Self: Sized;

    /// Roll back the transaction.
    fn rollback(self) -> Result<()>
    where
        Self: Sized;
}

/// Opens connections on demand.
///
/// Every operation of a table handle opens its own connection through its
/// source and releases it when done.
pub trait ConnectionSource {
    /// Connection type produced by this source.
    type Conn: Connection;

    /// Open a connection.
    fn open(&self) -> Result<Self::Conn>;
}

/// Helper for drivers: first column of an optional row.
pub fn first_value(row: Option<Vec<Value>>) -> Value {
    row.and_then(|values| values.into_iter().next())
        .unwrap_or(Value::Null)
}

impl<C: Connection> Connection for Arc<C> {
    type Cursor = C::Cursor;
    type Tx<'conn>
        = C::Tx<'conn>
    where
        Self: 'conn;

    fn query(&self, sql: &str, params: &[Value]) -> Result<Self::Cursor> {
        (**self).query(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).execute(sql, params)
    }

    fn scalar(&self, sql: &str, params: &[Value]) -> Result<Value> {
        (**self).scalar(sql, params)
    }

    fn begin(&self) -> Result<Self::Tx<'_>> {
        (**self).begin()
    }
}

/// A shared, already-open connection acts as its own source.
impl<C: Connection> ConnectionSource for Arc<C> {
    type Conn = Arc<C>;

    fn open(&self) -> Result<Self::Conn> {
        Ok(Arc::clone(self))
    }
}
