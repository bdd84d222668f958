//! Typed mapping between Rust structs and [`Record`]s.
//!
//! [`ToRecord`] turns a caller object into a batch item. [`Entity`] types
//! expose a [`FieldTable`]: a per-type, build-once map from column name to a
//! setter, used to fill a default-constructed value column by column. The
//! `entity!` macro in `dynmodel` derives both for plain structs.

use std::collections::HashMap;
use std::fmt;

use crate::Result;
use crate::error::Error;
use crate::record::Record;
use crate::value::Value;

/// Conversion of a caller object into a record.
pub trait ToRecord {
    /// Snapshot the object's fields.
    fn to_record(&self) -> Record;
}

impl ToRecord for Record {
    fn to_record(&self) -> Record {
        self.clone()
    }
}

impl<T: ToRecord + ?Sized> ToRecord for &T {
    fn to_record(&self) -> Record {
        (**self).to_record()
    }
}

impl<T: ToRecord + ?Sized> ToRecord for Box<T> {
    fn to_record(&self) -> Record {
        (**self).to_record()
    }
}

impl<K, V> ToRecord for [(K, V)]
where
    K: AsRef<str>,
    V: Clone + Into<Value>,
{
    fn to_record(&self) -> Record {
        self.iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.clone().into()))
            .collect()
    }
}

/// Convert a slice of objects into records, preserving order.
pub fn to_records<T: ToRecord>(items: &[T]) -> Vec<Record> {
    items.iter().map(ToRecord::to_record).collect()
}

/// Construction of a typed value from a record.
pub trait FromRecord: Sized {
    /// Build `Self` from the record's fields.
    fn from_record(record: &Record) -> Result<Self>;
}

impl FromRecord for Record {
    fn from_record(record: &Record) -> Result<Self> {
        Ok(record.clone())
    }
}

/// Setter for one field of `T`.
pub type Setter<T> = fn(&mut T, Value) -> Result<()>;

/// Column → setter table for one entity type.
pub struct FieldTable<T> {
    columns: Vec<&'static str>,
    setters: HashMap<String, Setter<T>>,
}

impl<T> FieldTable<T> {
    /// Build a table from `(column, setter)` pairs.
    ///
    /// Column matching is ASCII case-insensitive.
    pub fn new(fields: &[(&'static str, Setter<T>)]) -> Self {
        let mut setters = HashMap::with_capacity(fields.len());
        let mut columns = Vec::with_capacity(fields.len());
        for (column, setter) in fields {
            columns.push(*column);
            setters.insert(column.to_ascii_lowercase(), *setter);
        }
        Self { columns, setters }
    }

    /// Column names in declaration order.
    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    /// Whether `column` maps to a field.
    pub fn contains(&self, column: &str) -> bool {
        self.setters.contains_key(&column.to_ascii_lowercase())
    }

    /// Assign `value` to the field mapped by `column`.
    ///
    /// Returns `Ok(false)` when no field matches. A NULL that the field cannot
    /// hold leaves the field as it was, so unmatched outer-join columns keep
    /// their defaults. Other conversion failures carry the column name.
    pub fn assign(&self, target: &mut T, column: &str, value: Value) -> Result<bool> {
        let Some(setter) = self.setters.get(&column.to_ascii_lowercase()) else {
            return Ok(false);
        };
        let is_null = value.is_null();
        setter(target, value)
            .or_else(|e| match e {
                Error::Type(_) if is_null => Ok(()),
                e => Err(e),
            })
            .map_err(|e| match e {
                Error::Type(mut te) => {
                    te.column = Some(column.to_string());
                    te.rust_type = Some(std::any::type_name::<T>());
                    Error::Type(te)
                }
                e => e,
            })?;
        Ok(true)
    }
}

impl<T> fmt::Debug for FieldTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldTable")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

/// A struct with a static field table.
///
/// Entities start from `Default` and are filled one column at a time, which
/// is what multi-mapping needs when a row only covers part of a shape.
pub trait Entity: Default + 'static {
    /// The type's field table, built once.
    fn field_table() -> &'static FieldTable<Self>;
}

impl<T: Entity> FromRecord for T {
    fn from_record(record: &Record) -> Result<Self> {
        let table = T::field_table();
        let mut target = T::default();
        for (column, value) in record.iter() {
            table.assign(&mut target, column, value.clone())?;
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::record::FromValue;
    use std::sync::OnceLock;

    #[derive(Debug, Default, PartialEq)]
    struct Supplier {
        id: i64,
        name: String,
        city: Option<String>,
    }

    impl Entity for Supplier {
        fn field_table() -> &'static FieldTable<Self> {
            static TABLE: OnceLock<FieldTable<Supplier>> = OnceLock::new();
            TABLE.get_or_init(|| {
                let fields: [(&'static str, Setter<Supplier>); 3] = [
                    ("SupplierID", |s: &mut Supplier, v: Value| {
                        s.id = FromValue::from_value(&v)?;
                        Ok(())
                    }),
                    ("CompanyName", |s: &mut Supplier, v: Value| {
                        s.name = FromValue::from_value(&v)?;
                        Ok(())
                    }),
                    ("City", |s: &mut Supplier, v: Value| {
                        s.city = FromValue::from_value(&v)?;
                        Ok(())
                    }),
                ];
                FieldTable::new(&fields)
            })
        }
    }

    #[test]
    fn from_record_ignores_unknown_columns() {
        let rec = record! {
            "supplierid" => 3_i64,
            "COMPANYNAME" => "Exotic Liquids",
            "Phone" => "(171) 555-2222",
            "City" => Value::Null,
        };
        let supplier = Supplier::from_record(&rec).unwrap();
        assert_eq!(
            supplier,
            Supplier {
                id: 3,
                name: "Exotic Liquids".to_string(),
                city: None,
            }
        );
    }

    #[test]
    fn assign_reports_column_on_type_error() {
        let mut s = Supplier::default();
        let table = Supplier::field_table();
        assert!(!table.assign(&mut s, "Nope", Value::Int(1)).unwrap());
        let err = table
            .assign(&mut s, "supplierID", Value::Text("x".into()))
            .unwrap_err();
        match err {
            Error::Type(te) => assert_eq!(te.column.as_deref(), Some("supplierID")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(table.columns(), &["SupplierID", "CompanyName", "City"]);
        assert!(table.contains("city"));
    }

    #[test]
    fn null_leaves_non_optional_fields_at_default() {
        let rec = record! {
            "SupplierID" => Value::Null,
            "CompanyName" => Value::Null,
            "City" => Value::Null,
        };
        assert_eq!(Supplier::from_record(&rec).unwrap(), Supplier::default());

        let mut s = Supplier {
            id: 7,
            ..Supplier::default()
        };
        assert!(Supplier::field_table().assign(&mut s, "SupplierID", Value::Null).unwrap());
        assert_eq!(s.id, 7);
    }

    #[test]
    fn pairs_convert_to_records() {
        let pairs = [("Name", "x"), ("Code", "y")];
        let rec = pairs[..].to_record();
        assert_eq!(rec.keys().collect::<Vec<_>>(), vec!["Name", "Code"]);

        let records = to_records(&[record! { "a" => 1 }, record! { "a" => 2 }]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("A"), Some(&Value::Int(2)));
    }
}
