//! dynmodel - multi-mapping queries and batch writes for dynamic table handles.
//!
//! A [`DynamicModel`] is a handle over one table: its name, its primary key
//! field and a SQL dialect, bound to a [`ConnectionSource`]. On top of the
//! usual reads it offers:
//!
//! - **Multi-mapping**: decode one flat result row into a main object plus
//!   linked objects, split at marker columns (`NULL AS ___`) or at `id`
//!   columns. See [`multimap`].
//! - **Batch writes**: insert, update or delete many records with a single
//!   command inside a single transaction, running lifecycle hooks once per
//!   batch. See [`batch`] and [`BatchHooks`].
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use dynmodel::prelude::*;
//! use dynmodel_sqlite::SqliteConnection;
//!
//! #[derive(Debug, Default, Clone, PartialEq)]
//! struct Product {
//!     id: i64,
//!     name: String,
//!     supplier_id: i64,
//! }
//!
//! #[derive(Debug, Default, Clone, PartialEq)]
//! struct Supplier {
//!     id: i64,
//!     company: String,
//! }
//!
//! dynmodel::entity!(Product { id => "Id", name => "Name", supplier_id => "SupplierId" });
//! dynmodel::entity!(Supplier { id => "Id", company => "Company" });
//!
//! let conn = Arc::new(SqliteConnection::open_memory().unwrap());
//! conn.execute_raw(
//!     "CREATE TABLE Suppliers (Id INTEGER PRIMARY KEY, Company TEXT);
//!      CREATE TABLE Products (Id INTEGER PRIMARY KEY, Name TEXT, SupplierId INTEGER);",
//! )
//! .unwrap();
//!
//! let suppliers = DynamicModel::new(Arc::clone(&conn), ModelConfig::new("Suppliers", "Id"));
//! let products = DynamicModel::new(Arc::clone(&conn), ModelConfig::new("Products", "Id"));
//!
//! suppliers.insert_batch(&[record! { "Company" => "Exotic Liquids" }]).unwrap();
//! products
//!     .insert_batch(&[
//!         record! { "Name" => "Chai", "SupplierId" => 1 },
//!         record! { "Name" => "Chang", "SupplierId" => 1 },
//!     ])
//!     .unwrap();
//!
//! let mut companies = Vec::new();
//! let linked: Vec<Product> = products
//!     .query_and_link_as::<Product, (Supplier,), _>(
//!         "SELECT p.*, NULL AS ___, s.* FROM Products p JOIN Suppliers s ON s.Id = p.SupplierId",
//!         &[],
//!         SplitMode::Splitter,
//!         |_product: &mut Product, (supplier,): (Option<Supplier>,)| {
//!             companies.extend(supplier.map(|s| s.company));
//!             Ok(())
//!         },
//!     )
//!     .unwrap()
//!     .collect::<Result<_>>()
//!     .unwrap();
//!
//! assert_eq!(linked.len(), 2);
//! assert_eq!(companies, vec!["Exotic Liquids", "Exotic Liquids"]);
//! ```

pub mod batch;
pub mod hooks;
pub mod model;
pub mod multimap;
pub mod query;

pub use batch::{build_delete, build_insert, build_update, insert_columns, insert_command};
pub use hooks::{BatchContext, BatchHooks, BatchKind, DefaultHooks};
pub use model::{CursorOf, DynamicModel, ModelConfig};
pub use multimap::{
    ColumnTarget, DEFAULT_MAX_LINKED, DEFAULT_SPLITTER_PREFIX, LinkShapes, LinkedObjects,
    MultiMapOptions, MultiMapper, RowPlan, SplitMode, TypedMultiMapper,
};
pub use query::{Page, Records, Select, Typed};

pub use dynmodel_core::{
    CallbackError, Command, ConfigError, Connection, ConnectionSource, Cursor, Dialect, Entity,
    Error, FieldTable, FromRecord, FromValue, MySqlDialect, PostgresDialect, Record,
    RecordValidator, Result, Setter, SqliteDialect, ToRecord, Transaction, ValidationError, Value,
    record, to_records,
};

/// Implement [`Entity`] and [`ToRecord`] for a plain struct.
///
/// Each listed field maps to a column of the same name, or to the column
/// named after `=>`. Field types must convert from a [`Value`] through
/// [`FromValue`] and into one through `From`. The struct must implement
/// `Default` and every listed field must be `Clone`.
///
/// ```rust
/// #[derive(Debug, Default)]
/// struct Category {
///     id: i64,
///     name: String,
///     description: Option<String>,
/// }
///
/// dynmodel::entity!(Category { id => "CategoryID", name => "CategoryName", description });
///
/// use dynmodel::{FromRecord, ToRecord};
/// let category = Category { id: 1, name: "Beverages".into(), description: None };
/// let record = category.to_record();
/// assert_eq!(record.keys().collect::<Vec<_>>(), ["CategoryID", "CategoryName", "description"]);
/// assert_eq!(Category::from_record(&record).unwrap().name, "Beverages");
/// ```
#[macro_export]
macro_rules! entity {
    (@column $field:ident) => {
        stringify!($field)
    };
    (@column $field:ident $column:literal) => {
        $column
    };
    ($name:ident { $($field:ident $(=> $column:literal)?),+ $(,)? }) => {
        impl $crate::Entity for $name {
            fn field_table() -> &'static $crate::FieldTable<Self> {
                static TABLE: ::std::sync::OnceLock<$crate::FieldTable<$name>> =
                    ::std::sync::OnceLock::new();
                TABLE.get_or_init(|| {
                    let fields: &[(&'static str, $crate::Setter<$name>)] = &[
                        $((
                            $crate::entity!(@column $field $($column)?),
                            (|target: &mut $name, value: $crate::Value| -> $crate::Result<()> {
                                target.$field = $crate::FromValue::from_value(&value)?;
                                Ok(())
                            }) as $crate::Setter<$name>,
                        )),+
                    ];
                    $crate::FieldTable::new(fields)
                })
            }
        }

        impl $crate::ToRecord for $name {
            fn to_record(&self) -> $crate::Record {
                let mut record = $crate::Record::new();
                $(
                    record.insert(
                        $crate::entity!(@column $field $($column)?),
                        $crate::Value::from(self.$field.clone()),
                    );
                )+
                record
            }
        }
    };
}

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        BatchContext, BatchHooks, BatchKind, Connection, ConnectionSource, DynamicModel, Entity,
        Error, FromRecord, LinkedObjects, ModelConfig, MultiMapOptions, Page, Record,
        RecordValidator, Result, Select, SplitMode, ToRecord, Value, record,
    };
}
