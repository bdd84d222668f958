//! Streaming reads and select building for table handles.

use std::iter::FusedIterator;
use std::marker::PhantomData;

use dynmodel_core::{Cursor, Error, FromRecord, Record, Result, Value};
use serde::Serialize;

/// Owns a cursor until it is exhausted, fails, or is dropped.
///
/// Shared by every streaming reader in this crate so that release happens in
/// exactly one place.
pub(crate) struct RowFeed<C> {
    cursor: Option<C>,
    rows: u64,
}

impl<C: Cursor> RowFeed<C> {
    pub(crate) fn new(cursor: C) -> Self {
        Self {
            cursor: Some(cursor),
            rows: 0,
        }
    }

    /// Read the next row. `None` once the cursor has been released.
    pub(crate) fn next_values(&mut self) -> Option<Result<Vec<Value>>> {
        let cursor = self.cursor.as_mut()?;
        match cursor.next_row() {
            Ok(Some(values)) => {
                self.rows += 1;
                Some(Ok(values))
            }
            Ok(None) => {
                self.release("exhausted");
                None
            }
            Err(e) => {
                self.release("error");
                Some(Err(e))
            }
        }
    }

    /// Rows read so far.
    pub(crate) fn rows(&self) -> u64 {
        self.rows
    }

    pub(crate) fn release(&mut self, reason: &'static str) {
        if self.cursor.take().is_some() {
            tracing::trace!(rows = self.rows, reason = reason, "Released cursor");
        }
    }
}

impl<C> Drop for RowFeed<C> {
    fn drop(&mut self) {
        if self.cursor.take().is_some() {
            tracing::trace!(rows = self.rows, "Cursor dropped before exhaustion");
        }
    }
}

/// A lazily read stream of records.
///
/// Each item is a fresh [`Record`] keyed by the result set's column names.
/// The stream is single-pass; it stops for good after the first error.
pub struct Records<C> {
    feed: RowFeed<C>,
    columns: Vec<String>,
}

impl<C: Cursor> Records<C> {
    /// Wrap an open cursor.
    pub fn new(cursor: C) -> Self {
        let columns = cursor.columns().to_vec();
        Self {
            feed: RowFeed::new(cursor),
            columns,
        }
    }

    /// Column names of the underlying result set.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Convert each record into `T` as it is read.
    pub fn into_typed<T: FromRecord>(self) -> Typed<Self, T> {
        Typed::new(self)
    }
}

impl<C: Cursor> Iterator for Records<C> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let values = match self.feed.next_values()? {
            Ok(values) => values,
            Err(e) => return Some(Err(e)),
        };
        Some(Ok(Record::from_columns(&self.columns, values)))
    }
}

impl<C: Cursor> FusedIterator for Records<C> {}

/// Adapter turning a record stream into typed values.
pub struct Typed<I, T> {
    inner: I,
    failed: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<I, T> Typed<I, T> {
    /// Wrap a record iterator.
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            failed: false,
            _marker: PhantomData,
        }
    }
}

impl<I, T> Iterator for Typed<I, T>
where
    I: Iterator<Item = Result<Record>>,
    T: FromRecord,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self
            .inner
            .next()?
            .and_then(|record| T::from_record(&record));
        self.failed = item.is_err();
        Some(item)
    }
}

impl<I, T> FusedIterator for Typed<I, T>
where
    I: Iterator<Item = Result<Record>>,
    T: FromRecord,
{
}

/// Parts of a `SELECT` against a table handle's table.
///
/// `where_clause` and `order_by` may be given with or without their leading
/// keyword. `params` bind the placeholders used in `where_clause`.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub columns: String,
    pub where_clause: String,
    pub order_by: String,
    pub limit: Option<u64>,
    pub params: Vec<Value>,
}

impl Default for Select {
    fn default() -> Self {
        Self {
            columns: "*".to_string(),
            where_clause: String::new(),
            order_by: String::new(),
            limit: None,
            params: Vec::new(),
        }
    }
}

impl Select {
    /// `SELECT *` with no filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Column list, verbatim.
    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    /// Filter with its parameters.
    pub fn filter(mut self, where_clause: impl Into<String>, params: Vec<Value>) -> Self {
        self.where_clause = where_clause.into();
        self.params = params;
        self
    }

    /// Ordering, verbatim.
    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = order_by.into();
        self
    }

    /// Row limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One page of a paged select.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// Rows matching the filter across all pages
    pub total_records: u64,
    /// `ceil(total_records / page_size)`
    pub total_pages: u64,
    /// Rows of the requested page
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub(crate) fn new(total_records: u64, page_size: u64, items: Vec<T>) -> Self {
        Self {
            total_records,
            total_pages: total_records.div_ceil(page_size),
            items,
        }
    }

    /// Convert every item, stopping at the first failure.
    pub fn try_map<U>(self, f: impl FnMut(T) -> Result<U>) -> Result<Page<U>> {
        let items = self.items.into_iter().map(f).collect::<Result<Vec<U>>>()?;
        Ok(Page {
            total_records: self.total_records,
            total_pages: self.total_pages,
            items,
        })
    }
}

/// Validate paging arguments and return the row offset of `current_page`.
pub(crate) fn page_offset(current_page: u64, page_size: u64) -> Result<u64> {
    if page_size == 0 {
        return Err(Error::config("page size must be at least 1"));
    }
    if current_page == 0 {
        return Err(Error::config("pages are numbered from 1"));
    }
    (current_page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| Error::config(format!("page {current_page} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Scripted {
        columns: Vec<String>,
        rows: std::vec::IntoIter<Result<Vec<Value>>>,
        dropped: Rc<Cell<bool>>,
    }

    impl Scripted {
        fn new(columns: &[&str], rows: Vec<Result<Vec<Value>>>) -> (Self, Rc<Cell<bool>>) {
            let dropped = Rc::new(Cell::new(false));
            let cursor = Self {
                columns: columns.iter().map(|c| (*c).to_string()).collect(),
                rows: rows.into_iter(),
                dropped: Rc::clone(&dropped),
            };
            (cursor, dropped)
        }
    }

    impl Drop for Scripted {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    impl Cursor for Scripted {
        fn columns(&self) -> &[String] {
            &self.columns
        }

        fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
            self.rows.next().transpose()
        }
    }

    #[test]
    fn records_release_cursor_on_exhaustion() {
        let (cursor, dropped) = Scripted::new(
            &["Id", "Name"],
            vec![
                Ok(vec![Value::Int(1), Value::from("a")]),
                Ok(vec![Value::Int(2), Value::Null]),
            ],
        );
        let mut records = Records::new(cursor);
        assert_eq!(records.columns(), ["Id", "Name"]);

        let first = records.next().unwrap().unwrap();
        assert_eq!(first.get("name"), Some(&Value::from("a")));
        let second = records.next().unwrap().unwrap();
        assert_eq!(second.get("Name"), Some(&Value::Null));
        assert!(!dropped.get());

        assert!(records.next().is_none());
        assert!(dropped.get());
        assert!(records.next().is_none());
    }

    #[test]
    fn records_stop_after_error() {
        let (cursor, dropped) = Scripted::new(
            &["Id"],
            vec![
                Err(Error::Custom("disk on fire".into())),
                Ok(vec![Value::Int(1)]),
            ],
        );
        let mut records = Records::new(cursor);
        assert!(records.next().unwrap().is_err());
        assert!(dropped.get());
        assert!(records.next().is_none());
    }

    #[test]
    fn abandoning_the_stream_releases_the_cursor() {
        let (cursor, dropped) = Scripted::new(&["Id"], vec![Ok(vec![Value::Int(1)])]);
        let records = Records::new(cursor);
        drop(records);
        assert!(dropped.get());
    }

    #[test]
    fn typed_adapter_fuses_on_conversion_error() {
        let items = vec![
            Ok(dynmodel_core::record! { "n" => 1 }),
            Err(Error::Custom("bad".into())),
            Ok(dynmodel_core::record! { "n" => 2 }),
        ];
        let mut typed: Typed<_, Record> = Typed::new(items.into_iter());
        assert!(typed.next().unwrap().is_ok());
        assert!(typed.next().unwrap().is_err());
        assert!(typed.next().is_none());
    }

    #[test]
    fn select_builder_defaults_to_star() {
        let select = Select::new()
            .filter("Qty > ?1", vec![Value::Int(3)])
            .order_by("Name")
            .limit(10);
        assert_eq!(select.columns, "*");
        assert_eq!(select.params, vec![Value::Int(3)]);
        assert_eq!(select.limit, Some(10));
    }

    #[test]
    fn paging_math() {
        assert_eq!(page_offset(1, 20).unwrap(), 0);
        assert_eq!(page_offset(3, 20).unwrap(), 40);
        assert!(page_offset(0, 20).unwrap_err().is_config_error());
        assert!(page_offset(1, 0).unwrap_err().is_config_error());

        let page = Page::new(41, 20, vec![1, 2]);
        assert_eq!(page.total_pages, 3);
        let empty: Page<u8> = Page::new(0, 20, Vec::new());
        assert_eq!(empty.total_pages, 0);

        let doubled = page.try_map(|n| Ok(n * 2)).unwrap();
        assert_eq!(doubled.items, vec![2, 4]);
    }
}
