//! SQLite driver for dynmodel.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! Implements the connection traits from dynmodel-core on top of the
//! bundled libsqlite3.
//!
//! # Example
//!
//! ```rust
//! use dynmodel_core::{Connection, Cursor, Value};
//! use dynmodel_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_memory().unwrap();
//! conn.execute_raw("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)").unwrap();
//! conn.execute("INSERT INTO users (name) VALUES (?1)", &[Value::from("Alice")]).unwrap();
//!
//! let mut cursor = conn.query("SELECT id, name FROM users", &[]).unwrap();
//! let row = cursor.next_row().unwrap().unwrap();
//! assert_eq!(row[1], Value::from("Alice"));
//! ```
//!
//! # Type Mapping
//!
//! | Value | SQLite storage |
//! |-------|----------------|
//! | `Bool`, `TinyInt` .. `BigInt` | INTEGER |
//! | `Float`, `Double` | REAL |
//! | `Text`, `Decimal` | TEXT |
//! | `Bytes` | BLOB |
//! | `Date`, `Time`, `Timestamp` | TEXT (ISO-8601) |
//! | `Json` | TEXT |
//! | `Null` | NULL |
//!
//! Reads map INTEGER to `Int` when it fits in 32 bits and `BigInt`
//! otherwise, REAL to `Double`.
//!
//! # Thread Safety
//!
//! `SqliteConnection` is `Send + Sync`, using internal mutex synchronization
//! to protect the underlying SQLite handle.

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection, SqliteCursor, SqliteTransaction};

/// Get the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}
