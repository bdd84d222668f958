//! Dynamic record representation.
//!
//! A [`Record`] is the untyped shape every decoded row and every batch item
//! passes through: an ordered list of `(field, value)` pairs with ASCII
//! case-insensitive key lookup.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// An ordered field-name → value mapping.
///
/// Iteration yields fields in first-insertion order. Inserting a key that is
/// already present (in any letter case) replaces its value in place and keeps
/// the spelling it was first inserted with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty record with room for `capacity` fields.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Build a record from parallel column names and values.
    pub fn from_columns(names: &[String], values: Vec<Value>) -> Self {
        let mut record = Self::with_capacity(values.len());
        for (name, value) in names.iter().zip(values) {
            record.insert(name.as_str(), value);
        }
        record
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(key))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Insert or replace a field, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.position(&key) {
            Some(i) => Some(std::mem::replace(&mut self.fields[i].1, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    /// Get a field's value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.position(key).map(|i| &self.fields[i].1)
    }

    /// Get a mutable reference to a field's value.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.position(key).map(|i| &mut self.fields[i].1)
    }

    /// Check whether a field exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// The stored spelling of `key`, if present.
    pub fn key_spelling(&self, key: &str) -> Option<&str> {
        self.position(key).map(|i| self.fields[i].0.as_str())
    }

    /// Remove a field, preserving the order of the rest.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.position(key).map(|i| self.fields.remove(i).1)
    }

    /// Get a typed value by field name.
    pub fn get_as<T: FromValue>(&self, key: &str) -> Result<T> {
        let value = self.get(key).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("field '{}' not found", key),
                column: Some(key.to_string()),
                rust_type: None,
            })
        })?;
        T::from_value(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(key.to_string());
                Error::Type(te)
            }
            e => e,
        })
    }

    /// Field names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Values in field order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, value)| value)
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Render as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, &value.to_json())?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for Record {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// Build a [`Record`] from `key => value` pairs.
#[macro_export]
macro_rules! record {
    () => { $crate::Record::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $( record.insert($key, $value); )+
        record
    }};
}

/// Trait for converting from a `Value` to a typed value.
pub trait FromValue: Sized {
    /// Convert from a Value, returning an error if the conversion fails.
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
        rust_type: None,
    })
}

fn out_of_range(expected: &'static str, v: i64) -> Error {
    Error::Type(TypeError {
        expected,
        actual: format!("value {} out of range", v),
        column: None,
        rust_type: None,
    })
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_i64().ok_or_else(|| mismatch("i64", value))
    }
}

macro_rules! from_value_narrow {
    ($($ty:ty),+) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self> {
                    let v = value.as_i64().ok_or_else(|| mismatch(stringify!($ty), value))?;
                    <$ty>::try_from(v).map_err(|_| out_of_range(stringify!($ty), v))
                }
            }
        )+
    };
}

from_value_narrow!(i8, i16, i32, u8, u16, u32, u64, usize);

#[allow(clippy::cast_possible_truncation)]
impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(*v),
            other => other
                .as_f64()
                .map(|v| v as f32)
                .ok_or_else(|| mismatch("f32", other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| mismatch("f64", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) | Value::Decimal(s) => Ok(s.clone()),
            _ => Err(mismatch("String", value)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.as_bytes().to_vec()),
            _ => Err(mismatch("Vec<u8>", value)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            Value::Text(s) => serde_json::from_str(s).map_err(|_| mismatch("json", value)),
            _ => Err(mismatch("json", value)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_ascii_case() {
        let mut rec = Record::new();
        rec.insert("Name", "widget");
        assert_eq!(rec.get("name"), Some(&Value::Text("widget".into())));
        assert!(rec.contains_key("NAME"));
        assert_eq!(rec.key_spelling("nAmE"), Some("Name"));
    }

    #[test]
    fn replacement_keeps_position_and_spelling() {
        let mut rec = record! { "Id" => 1, "Name" => "a", "Qty" => 2 };
        let old = rec.insert("NAME", "b");
        assert_eq!(old, Some(Value::Text("a".into())));
        let keys: Vec<_> = rec.keys().collect();
        assert_eq!(keys, vec!["Id", "Name", "Qty"]);
        assert_eq!(rec.get("name"), Some(&Value::Text("b".into())));
    }

    #[test]
    fn remove_preserves_order() {
        let mut rec = record! { "a" => 1, "b" => 2, "c" => 3 };
        assert_eq!(rec.remove("B"), Some(Value::Int(2)));
        assert_eq!(rec.keys().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(rec.remove("b"), None);
    }

    #[test]
    fn get_as_reports_column() {
        let rec = record! { "Qty" => "many" };
        let err = rec.get_as::<i64>("qty").unwrap_err();
        match err {
            Error::Type(te) => assert_eq!(te.column.as_deref(), Some("qty")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(rec.get_as::<i64>("missing").is_err());
    }

    #[test]
    fn typed_reads() {
        let rec = record! {
            "Id" => 7_i64,
            "Name" => "x",
            "Note" => Value::Null,
            "Price" => 1.5_f64,
        };
        assert_eq!(rec.get_as::<i32>("id").unwrap(), 7);
        assert_eq!(rec.get_as::<String>("name").unwrap(), "x");
        assert_eq!(rec.get_as::<Option<String>>("note").unwrap(), None);
        assert!((rec.get_as::<f64>("price").unwrap() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn narrow_integer_out_of_range() {
        let rec = record! { "n" => 300 };
        assert!(rec.get_as::<u8>("n").is_err());
        assert_eq!(rec.get_as::<u16>("n").unwrap(), 300);
    }

    #[test]
    fn serializes_as_ordered_object() {
        let rec = record! { "b" => 1, "a" => Value::Null };
        let text = serde_json::to_string(&rec).unwrap();
        assert_eq!(text, r#"{"b":1,"a":null}"#);
        assert_eq!(rec.to_json()["b"], serde_json::json!(1));
    }
}
