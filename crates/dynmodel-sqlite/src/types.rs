//! Type encoding and decoding between Rust and SQLite.
//!
//! SQLite has five storage classes (INTEGER, REAL, TEXT, BLOB, NULL). Values
//! without a native class are bound as text: decimals verbatim, temporal
//! values as ISO-8601, JSON as its serialized form.

#![allow(clippy::cast_possible_truncation)]

use crate::ffi;
use dynmodel_core::Value;
use dynmodel_core::value::{format_date, format_time, format_timestamp};
use std::ffi::{CStr, c_int};

/// Bind UTF-8 text to a statement parameter.
///
/// # Safety
/// `stmt` must be a valid prepared statement and `index` a 1-based parameter index.
unsafe fn bind_text(stmt: *mut ffi::sqlite3_stmt, index: c_int, text: &str) -> c_int {
    let bytes = text.as_bytes();
    // SAFETY: SQLITE_TRANSIENT makes SQLite copy the buffer before returning
    unsafe {
        ffi::sqlite3_bind_text(
            stmt,
            index,
            bytes.as_ptr().cast(),
            bytes.len() as c_int,
            ffi::SQLITE_TRANSIENT(),
        )
    }
}

/// Bind a Value to a prepared statement parameter.
///
/// # Safety
/// - `stmt` must be a valid, non-null prepared statement handle
/// - `index` must be a valid 1-based parameter index
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    // SAFETY: forwarded from the caller's contract
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),
            Value::Bool(b) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*b)),
            Value::TinyInt(v) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*v)),
            Value::SmallInt(v) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*v)),
            Value::Int(v) => ffi::sqlite3_bind_int(stmt, index, *v),
            Value::BigInt(v) => ffi::sqlite3_bind_int64(stmt, index, *v),
            Value::Float(v) => ffi::sqlite3_bind_double(stmt, index, f64::from(*v)),
            Value::Double(v) => ffi::sqlite3_bind_double(stmt, index, *v),
            Value::Decimal(s) | Value::Text(s) => bind_text(stmt, index, s),
            Value::Bytes(b) => ffi::sqlite3_bind_blob(
                stmt,
                index,
                b.as_ptr().cast(),
                b.len() as c_int,
                ffi::SQLITE_TRANSIENT(),
            ),
            Value::Date(days) => bind_text(stmt, index, &format_date(*days)),
            Value::Time(micros) => bind_text(stmt, index, &format_time(*micros)),
            Value::Timestamp(micros) => bind_text(stmt, index, &format_timestamp(*micros)),
            Value::Json(json) => bind_text(stmt, index, &json.to_string()),
        }
    }
}

/// Read a column value from a result row.
///
/// SQL NULL always surfaces as `Value::Null`.
///
/// # Safety
/// - `stmt` must be a valid prepared statement that has just returned SQLITE_ROW
/// - `index` must be a valid 0-based column index
pub unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Value {
    // SAFETY: forwarded from the caller's contract
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_INTEGER => {
                let v = ffi::sqlite3_column_int64(stmt, index);
                // Choose the smallest representation
                match i32::try_from(v) {
                    Ok(small) => Value::Int(small),
                    Err(_) => Value::BigInt(v),
                }
            }
            ffi::SQLITE_FLOAT => Value::Double(ffi::sqlite3_column_double(stmt, index)),
            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() {
                    Value::Null
                } else {
                    let slice = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
                    Value::Text(String::from_utf8_lossy(slice).into_owned())
                }
            }
            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() || len == 0 {
                    Value::Bytes(Vec::new())
                } else {
                    let slice = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
                    Value::Bytes(slice.to_vec())
                }
            }
            _ => Value::Null,
        }
    }
}

/// Get the column name from a result.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: forwarded from the caller's contract
    unsafe {
        let ptr = ffi::sqlite3_column_name(stmt, index);
        if ptr.is_null() {
            None
        } else {
            CStr::from_ptr(ptr).to_str().ok().map(String::from)
        }
    }
}
