//! Declarative record validation.
//!
//! A [`RecordValidator`] holds per-field rules and checks [`Record`]s against
//! them, collecting every failure instead of stopping at the first one.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use regex::Regex;

use crate::Value;
use crate::error::ValidationError;
use crate::record::Record;

/// Thread-safe regex cache for compiled patterns.
struct RegexCache {
    cache: RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &str) -> Result<Regex, regex::Error> {
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(pattern)?;
        {
            let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
            cache.insert(pattern.to_string(), regex.clone());
        }
        Ok(regex)
    }
}

fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::new)
}

/// Check if a string matches a regex pattern.
///
/// Compiled patterns are cached. An invalid pattern never matches and logs a
/// warning.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match regex_cache().get_or_compile(pattern) {
        Ok(regex) => regex.is_match(value),
        Err(e) => {
            tracing::warn!(
                pattern = pattern,
                error = %e,
                "Invalid regex pattern in validation, treating as non-match"
            );
            false
        }
    }
}

type CustomCheck = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

#[derive(Clone)]
enum Check {
    Required,
    MinLength(usize),
    MaxLength(usize),
    Pattern(String),
    Custom(CustomCheck),
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Required => write!(f, "Required"),
            Check::MinLength(n) => write!(f, "MinLength({n})"),
            Check::MaxLength(n) => write!(f, "MaxLength({n})"),
            Check::Pattern(p) => write!(f, "Pattern({p:?})"),
            Check::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

#[derive(Debug, Clone)]
struct FieldRule {
    field: String,
    check: Check,
}

/// Per-field validation rules for records.
///
/// ```
/// use dynmodel_core::{Record, RecordValidator, Value};
///
/// let validator = RecordValidator::new()
///     .required("Name")
///     .max_length("Name", 40)
///     .pattern("Code", r"^[A-Z]{3}$");
///
/// let mut ok = Record::new();
/// ok.insert("Name", "Chai");
/// ok.insert("Code", "CHA");
/// assert!(validator.validate(&ok).is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordValidator {
    rules: Vec<FieldRule>,
}

impl RecordValidator {
    /// Create a validator with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    fn rule(mut self, field: impl Into<String>, check: Check) -> Self {
        self.rules.push(FieldRule {
            field: field.into(),
            check,
        });
        self
    }

    /// The field must be present, non-null and, for text, non-empty.
    pub fn required(self, field: impl Into<String>) -> Self {
        self.rule(field, Check::Required)
    }

    /// Text fields must have at least `min` characters.
    pub fn min_length(self, field: impl Into<String>, min: usize) -> Self {
        self.rule(field, Check::MinLength(min))
    }

    /// Text fields must have at most `max` characters.
    pub fn max_length(self, field: impl Into<String>, max: usize) -> Self {
        self.rule(field, Check::MaxLength(max))
    }

    /// Text fields must match `pattern`.
    pub fn pattern(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.rule(field, Check::Pattern(pattern.into()))
    }

    /// Run `check` on the field's value; `Some(message)` is a failure.
    ///
    /// Absent and null values are not passed to custom checks.
    pub fn custom<F>(self, field: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        self.rule(field, Check::Custom(Arc::new(check)))
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no rules are configured.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Check one record, returning every failure (empty when valid).
    pub fn validate(&self, record: &Record) -> ValidationError {
        let mut errors = ValidationError::new();
        for rule in &self.rules {
            let value = record.get(&rule.field).filter(|v| !v.is_null());
            match (&rule.check, value) {
                (Check::Required, None) => errors.add_required(&rule.field),
                (Check::Required, Some(Value::Text(s))) if s.is_empty() => {
                    errors.add_required(&rule.field);
                }
                (_, None) | (Check::Required, Some(_)) => {}
                (Check::MinLength(min), Some(Value::Text(s))) => {
                    let len = s.chars().count();
                    if len < *min {
                        errors.add_min_length(&rule.field, *min, len);
                    }
                }
                (Check::MaxLength(max), Some(Value::Text(s))) => {
                    let len = s.chars().count();
                    if len > *max {
                        errors.add_max_length(&rule.field, *max, len);
                    }
                }
                (Check::Pattern(pattern), Some(Value::Text(s))) => {
                    if !matches_pattern(s, pattern) {
                        errors.add_pattern(&rule.field, pattern);
                    }
                }
                (Check::MinLength(_) | Check::MaxLength(_) | Check::Pattern(_), Some(_)) => {}
                (Check::Custom(check), Some(v)) => {
                    if let Some(message) = check(v) {
                        errors.add_custom(&rule.field, message);
                    }
                }
            }
        }
        errors
    }

    /// Check a whole batch, aggregating failures tagged by record position.
    pub fn validate_batch(&self, records: &[Record]) -> Result<(), ValidationError> {
        let mut all = ValidationError::new();
        for (index, record) in records.iter().enumerate() {
            let errors = self.validate(record);
            if !errors.is_empty() {
                all.merge_record(index, errors);
            }
        }
        all.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationErrorKind;
    use crate::record;

    #[test]
    fn test_matches_pattern_cached() {
        assert!(matches_pattern("ABC", r"^[A-Z]+$"));
        assert!(matches_pattern("XYZ", r"^[A-Z]+$"));
        assert!(!matches_pattern("abc", r"^[A-Z]+$"));
    }

    #[test]
    fn test_invalid_pattern_never_matches() {
        assert!(!matches_pattern("anything", r"(unclosed"));
    }

    #[test]
    fn test_required() {
        let v = RecordValidator::new().required("Name");
        assert!(v.validate(&record! { "name" => "x" }).is_empty());
        assert_eq!(v.validate(&record! { "Qty" => 1 }).len(), 1);
        assert_eq!(v.validate(&record! { "Name" => Value::Null }).len(), 1);
        let errs = v.validate(&record! { "Name" => "" });
        assert_eq!(errs.errors[0].kind, ValidationErrorKind::Required);
    }

    #[test]
    fn test_lengths_count_chars() {
        let v = RecordValidator::new().min_length("Name", 2).max_length("Name", 3);
        assert!(v.validate(&record! { "Name" => "naï" }).is_empty());
        assert_eq!(
            v.validate(&record! { "Name" => "a" }).errors[0].kind,
            ValidationErrorKind::MinLength
        );
        assert_eq!(
            v.validate(&record! { "Name" => "abcd" }).errors[0].kind,
            ValidationErrorKind::MaxLength
        );
        assert!(v.validate(&record! { "Other" => 1 }).is_empty());
    }

    #[test]
    fn test_custom_skips_null() {
        let v = RecordValidator::new().custom("Qty", |value| match value.as_i64() {
            Some(n) if n >= 0 => None,
            _ => Some("must be a non-negative integer".to_string()),
        });
        assert!(v.validate(&record! { "Qty" => 3 }).is_empty());
        assert!(v.validate(&record! { "Qty" => Value::Null }).is_empty());
        assert_eq!(v.validate(&record! { "Qty" => -1 }).len(), 1);
    }

    #[test]
    fn test_batch_aggregates_with_index() {
        let v = RecordValidator::new().required("Name").pattern("Code", "^[A-Z]{3}$");
        let batch = vec![
            record! { "Name" => "ok", "Code" => "ABC" },
            record! { "Code" => "abc" },
            record! { "Name" => "fine" },
        ];
        let err = v.validate_batch(&batch).unwrap_err();
        assert_eq!(err.len(), 2);
        assert!(err.errors.iter().all(|e| e.record == Some(1)));
        assert!(err.to_string().starts_with("[1] Name: is required"));

        assert!(v.validate_batch(&batch[..1]).is_ok());
    }
}
