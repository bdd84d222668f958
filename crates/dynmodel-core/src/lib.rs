//! Core types and traits for dynmodel.
//!
//! This crate provides the foundations the table handle is built on:
//!
//! - `Value` and `Record` for untyped row data
//! - `Connection`, `Cursor`, `Transaction` and `ConnectionSource` driver traits
//! - `Dialect` statement templates for SQLite, PostgreSQL and MySQL
//! - `ToRecord` / `FromRecord` / `Entity` typed mapping
//! - `RecordValidator` declarative validation

pub mod connection;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod identifiers;
pub mod record;
pub mod validate;
pub mod value;

pub use connection::{Command, Connection, ConnectionSource, Cursor, Transaction, first_value};
pub use dialect::{Dialect, MySqlDialect, PostgresDialect, SqliteDialect};
pub use entity::{Entity, FieldTable, FromRecord, Setter, ToRecord, to_records};
pub use error::{
    CallbackError, ConfigError, ConnectionError, ConnectionErrorKind, Error, FieldValidationError,
    QueryError, QueryErrorKind, Result, TransactionError, TransactionErrorKind, TypeError,
    ValidationError, ValidationErrorKind,
};
pub use identifiers::{quote_ident, quote_ident_mysql, quote_qualified};
pub use record::{FromValue, Record};
pub use validate::{RecordValidator, matches_pattern};
pub use value::Value;
