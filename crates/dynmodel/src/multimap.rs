//! Multi-object row decoding.
//!
//! A single result row can carry several objects side by side, for example
//! `SELECT p.*, NULL AS ___, s.* FROM Products p JOIN Suppliers s ...`.
//! The decoder splits each row at boundary columns into one *main* object
//! and up to `max_linked` *linked* objects, hands the linked objects to a
//! callback, then yields the main object.
//!
//! # Boundaries
//!
//! - [`SplitMode::Splitter`]: a column whose name starts with the splitter
//!   prefix (`___` by default, case-sensitive) opens the next linked object.
//!   Its value is dropped.
//! - [`SplitMode::Identifier`]: a column named `id` (any case) opens the next
//!   linked object and its value goes into that object.
//!
//! Column 0 always belongs to the main object, whatever its name. Boundaries
//! depend only on column names, so the layout is computed once per cursor as
//! a [`RowPlan`] and overflow is reported before the first row is read.
//!
//! # Example
//!
//! ```rust
//! use dynmodel::{MultiMapOptions, MultiMapper};
//! use dynmodel_core::{Connection, Value};
//! use dynmodel_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_memory().unwrap();
//! let cursor = conn
//!     .query("SELECT 1 AS Id, 'Chai' AS Name, NULL AS ___, 'Exotic' AS Company", &[])
//!     .unwrap();
//!
//! let mut companies = Vec::new();
//! let mapper = MultiMapper::new(cursor, &MultiMapOptions::default(), |_main, mut linked| {
//!     companies.push(linked.take(0));
//!     Ok(())
//! })
//! .unwrap();
//! let products: Vec<_> = mapper.collect::<Result<_, _>>().unwrap();
//!
//! assert_eq!(products[0].get("Name"), Some(&Value::from("Chai")));
//! assert_eq!(companies[0].as_ref().unwrap().get("Company"), Some(&Value::from("Exotic")));
//! ```

use std::iter::FusedIterator;
use std::marker::PhantomData;

use dynmodel_core::{CallbackError, Cursor, Entity, Error, Record, Result, Value};

use crate::query::RowFeed;

/// Default prefix of splitter column names.
pub const DEFAULT_SPLITTER_PREFIX: &str = "___";

/// Default number of linked-object slots per row.
pub const DEFAULT_MAX_LINKED: usize = 19;

/// How object boundaries are detected within a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitMode {
    /// Marker columns named with the splitter prefix
    #[default]
    Splitter,
    /// Columns named `id`
    Identifier,
}

/// Decoder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiMapOptions {
    pub mode: SplitMode,
    pub splitter_prefix: String,
    pub max_linked: usize,
}

impl Default for MultiMapOptions {
    fn default() -> Self {
        Self {
            mode: SplitMode::Splitter,
            splitter_prefix: DEFAULT_SPLITTER_PREFIX.to_string(),
            max_linked: DEFAULT_MAX_LINKED,
        }
    }
}

impl MultiMapOptions {
    /// Splitter mode with default prefix and slot count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the boundary mode.
    pub fn mode(mut self, mode: SplitMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the splitter prefix.
    pub fn splitter_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.splitter_prefix = prefix.into();
        self
    }

    /// Set the number of linked-object slots.
    pub fn max_linked(mut self, max_linked: usize) -> Self {
        self.max_linked = max_linked;
        self
    }
}

/// Where one column of a row goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnTarget {
    /// Splitter marker; the value is dropped
    Discard,
    /// The main object
    Main,
    /// Linked object at this slot
    Linked(usize),
}

/// Column layout of a result set, computed once per cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowPlan {
    columns: Vec<String>,
    targets: Vec<ColumnTarget>,
    linked: usize,
    slots: usize,
}

impl RowPlan {
    /// Compute the layout for `columns`.
    ///
    /// Fails with a configuration error when the columns open more linked
    /// objects than `options.max_linked`, or when splitter mode is used with
    /// an empty prefix.
    pub fn new(columns: &[String], options: &MultiMapOptions) -> Result<Self> {
        if options.mode == SplitMode::Splitter && options.splitter_prefix.is_empty() {
            return Err(Error::config("splitter prefix must not be empty"));
        }

        let mut targets = Vec::with_capacity(columns.len());
        let mut linked = 0usize;
        let mut current = ColumnTarget::Main;

        for (i, name) in columns.iter().enumerate() {
            let boundary = match options.mode {
                SplitMode::Splitter => name.starts_with(&options.splitter_prefix),
                SplitMode::Identifier => name.eq_ignore_ascii_case("id"),
            };

            if i == 0 {
                // a leading marker still opens the main object
                let marker = boundary && options.mode == SplitMode::Splitter;
                targets.push(if marker {
                    ColumnTarget::Discard
                } else {
                    ColumnTarget::Main
                });
                continue;
            }
            if !boundary {
                targets.push(current);
                continue;
            }

            if linked == options.max_linked {
                return Err(Error::config(format!(
                    "column '{}' opens linked object {} but at most {} are allowed",
                    name,
                    linked + 1,
                    options.max_linked
                )));
            }
            current = ColumnTarget::Linked(linked);
            linked += 1;
            targets.push(match options.mode {
                SplitMode::Splitter => ColumnTarget::Discard,
                SplitMode::Identifier => current,
            });
        }

        tracing::debug!(
            columns = columns.len(),
            linked = linked,
            mode = ?options.mode,
            "Computed row plan"
        );

        Ok(Self {
            columns: columns.to_vec(),
            targets,
            linked,
            slots: options.max_linked,
        })
    }

    /// Column names, in result-set order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Target of every column, parallel to [`columns`](Self::columns).
    pub fn targets(&self) -> &[ColumnTarget] {
        &self.targets
    }

    /// Number of linked objects each row opens.
    pub fn linked_count(&self) -> usize {
        self.linked
    }

    /// Split one row into its main record and linked records.
    pub fn split(&self, values: Vec<Value>) -> (Record, LinkedObjects) {
        let mut main = Record::with_capacity(self.columns.len());
        let mut linked = LinkedObjects::with_opened(self.slots, self.linked);

        for ((name, target), value) in self.columns.iter().zip(&self.targets).zip(values) {
            match *target {
                ColumnTarget::Discard => {}
                ColumnTarget::Main => {
                    main.insert(name.as_str(), value);
                }
                ColumnTarget::Linked(slot) => {
                    if let Some(Some(record)) = linked.slots.get_mut(slot) {
                        record.insert(name.as_str(), value);
                    }
                }
            }
        }

        (main, linked)
    }
}

/// Linked objects of one row, by slot.
///
/// There is one slot per allowed linked object. Slots the row never opened
/// are `None`; an opened slot holds a record even if no column reached it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkedObjects {
    slots: Vec<Option<Record>>,
}

impl LinkedObjects {
    fn with_opened(slots: usize, opened: usize) -> Self {
        Self {
            slots: (0..slots)
                .map(|i| (i < opened).then(Record::new))
                .collect(),
        }
    }

    /// Record at `slot`, if opened.
    pub fn get(&self, slot: usize) -> Option<&Record> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Take the record at `slot`, leaving `None`.
    pub fn take(&mut self, slot: usize) -> Option<Record> {
        self.slots.get_mut(slot).and_then(Option::take)
    }

    /// Total slot count.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when there are no slots at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of opened slots.
    pub fn opened(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Opened records in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.slots.iter().flatten()
    }

    /// All slots.
    pub fn into_slots(self) -> Vec<Option<Record>> {
        self.slots
    }
}

impl IntoIterator for LinkedObjects {
    type Item = Record;
    type IntoIter = std::iter::Flatten<std::vec::IntoIter<Option<Record>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_iter().flatten()
    }
}

fn callback_failed(row: u64, source: Error) -> Error {
    Error::Callback(CallbackError {
        row,
        source: Box::new(source),
    })
}

/// Streaming decoder producing dynamic records.
///
/// Yields one main [`Record`] per row after `callback` has received the row's
/// linked objects. The cursor is released on exhaustion, on the first error,
/// or when the mapper is dropped; after an error the iterator is finished.
pub struct MultiMapper<C, F> {
    feed: RowFeed<C>,
    plan: RowPlan,
    callback: F,
}

impl<C, F> MultiMapper<C, F>
where
    C: Cursor,
    F: FnMut(&mut Record, LinkedObjects) -> Result<()>,
{
    /// Plan the cursor's columns and wrap it.
    ///
    /// The cursor is dropped, and so released, if planning fails.
    pub fn new(cursor: C, options: &MultiMapOptions, callback: F) -> Result<Self> {
        let plan = RowPlan::new(cursor.columns(), options)?;
        Ok(Self {
            feed: RowFeed::new(cursor),
            plan,
            callback,
        })
    }

    /// The row layout in use.
    pub fn plan(&self) -> &RowPlan {
        &self.plan
    }
}

impl<C, F> Iterator for MultiMapper<C, F>
where
    C: Cursor,
    F: FnMut(&mut Record, LinkedObjects) -> Result<()>,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let values = match self.feed.next_values()? {
            Ok(values) => values,
            Err(e) => return Some(Err(e)),
        };
        let row = self.feed.rows() - 1;
        let (mut main, linked) = self.plan.split(values);

        if let Err(source) = (self.callback)(&mut main, linked) {
            self.feed.release("callback failed");
            return Some(Err(callback_failed(row, source)));
        }
        Some(Ok(main))
    }
}

impl<C, F> FusedIterator for MultiMapper<C, F>
where
    C: Cursor,
    F: FnMut(&mut Record, LinkedObjects) -> Result<()>,
{
}

/// A compile-time list of linked entity shapes.
///
/// Implemented for tuples of [`Entity`] types up to eight long, so a typed
/// query links at most eight objects per row. Rows with more linked objects
/// go through [`MultiMapper`], whose slot count is set by
/// [`MultiMapOptions::max_linked`]. Slot `i` of a row is decoded into the
/// tuple's `i`-th type, and the callback receives `(Option<A>, Option<B>, ...)`.
pub trait LinkShapes {
    /// One `Option` per shape.
    type Objects: Default;

    /// Number of shapes, and so the number of linked slots.
    const SLOTS: usize;

    /// Start a fresh object in `slot`.
    fn open(objects: &mut Self::Objects, slot: usize);

    /// Assign one column to the object in `slot`.
    ///
    /// Columns with no matching field are ignored.
    fn assign(objects: &mut Self::Objects, slot: usize, column: &str, value: Value) -> Result<()>;
}

macro_rules! impl_link_shapes {
    ($count:expr; $($idx:tt => $ty:ident),*) => {
        impl<$($ty: Entity),*> LinkShapes for ($($ty,)*) {
            type Objects = ($(Option<$ty>,)*);

            const SLOTS: usize = $count;

            #[allow(unused_variables)]
            fn open(objects: &mut Self::Objects, slot: usize) {
                match slot {
                    $($idx => {
                        objects.$idx = Some(<$ty>::default());
                    })*
                    _ => {}
                }
            }

            #[allow(unused_variables)]
            fn assign(
                objects: &mut Self::Objects,
                slot: usize,
                column: &str,
                value: Value,
            ) -> Result<()> {
                match slot {
                    $($idx => {
                        if let Some(target) = objects.$idx.as_mut() {
                            $ty::field_table().assign(target, column, value)?;
                        }
                    })*
                    _ => {}
                }
                Ok(())
            }
        }
    };
}

impl_link_shapes!(0;);
impl_link_shapes!(1; 0 => A);
impl_link_shapes!(2; 0 => A, 1 => B);
impl_link_shapes!(3; 0 => A, 1 => B, 2 => C);
impl_link_shapes!(4; 0 => A, 1 => B, 2 => C, 3 => D);
impl_link_shapes!(5; 0 => A, 1 => B, 2 => C, 3 => D, 4 => E);
impl_link_shapes!(6; 0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => G);
impl_link_shapes!(7; 0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => G, 6 => H);
impl_link_shapes!(8; 0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => G, 6 => H, 7 => I);

/// Streaming decoder producing typed objects.
///
/// `T` is the main shape and `L` the tuple of linked shapes. The number of
/// linked slots is the arity of `L`.
pub struct TypedMultiMapper<C, T, L, F> {
    feed: RowFeed<C>,
    plan: RowPlan,
    callback: F,
    _shapes: PhantomData<fn() -> (T, L)>,
}

impl<C, T, L, F> TypedMultiMapper<C, T, L, F>
where
    C: Cursor,
    T: Entity,
    L: LinkShapes,
    F: FnMut(&mut T, L::Objects) -> Result<()>,
{
    /// Plan the cursor's columns and wrap it.
    ///
    /// `options.max_linked` is replaced by the arity of `L`.
    pub fn new(cursor: C, options: &MultiMapOptions, callback: F) -> Result<Self> {
        let options = options.clone().max_linked(L::SLOTS);
        let plan = RowPlan::new(cursor.columns(), &options)?;
        Ok(Self {
            feed: RowFeed::new(cursor),
            plan,
            callback,
            _shapes: PhantomData,
        })
    }

    /// The row layout in use.
    pub fn plan(&self) -> &RowPlan {
        &self.plan
    }

    fn decode(&self, values: Vec<Value>) -> Result<(T, L::Objects)> {
        let table = T::field_table();
        let mut main = T::default();
        let mut linked = L::Objects::default();
        for slot in 0..self.plan.linked {
            L::open(&mut linked, slot);
        }

        for ((name, target), value) in self.plan.columns.iter().zip(&self.plan.targets).zip(values) {
            match *target {
                ColumnTarget::Discard => {}
                ColumnTarget::Main => {
                    table.assign(&mut main, name, value)?;
                }
                ColumnTarget::Linked(slot) => L::assign(&mut linked, slot, name, value)?,
            }
        }
        Ok((main, linked))
    }
}

impl<C, T, L, F> Iterator for TypedMultiMapper<C, T, L, F>
where
    C: Cursor,
    T: Entity,
    L: LinkShapes,
    F: FnMut(&mut T, L::Objects) -> Result<()>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let values = match self.feed.next_values()? {
            Ok(values) => values,
            Err(e) => return Some(Err(e)),
        };
        let row = self.feed.rows() - 1;

        let (mut main, linked) = match self.decode(values) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.feed.release("mapping failed");
                return Some(Err(e));
            }
        };
        if let Err(source) = (self.callback)(&mut main, linked) {
            self.feed.release("callback failed");
            return Some(Err(callback_failed(row, source)));
        }
        Some(Ok(main))
    }
}

impl<C, T, L, F> FusedIterator for TypedMultiMapper<C, T, L, F>
where
    C: Cursor,
    T: Entity,
    L: LinkShapes,
    F: FnMut(&mut T, L::Objects) -> Result<()>,
{
}
