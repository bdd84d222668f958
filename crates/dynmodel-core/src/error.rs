//! Error types for dynmodel operations.

use std::fmt;

/// The primary error type for all dynmodel operations.
#[derive(Debug)]
pub enum Error {
    /// Connection-related errors (open, lost connection)
    Connection(ConnectionError),
    /// Statement execution errors
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Transaction errors
    Transaction(TransactionError),
    /// Configuration errors, raised before any I/O
    Config(ConfigError),
    /// Validation errors
    Validation(ValidationError),
    /// The linking callback of a multi-mapping query failed
    Callback(CallbackError),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Permission denied
    Permission,
    /// Database busy or locked
    Busy,
    /// Parameter binding failed
    Bind,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
    pub rust_type: Option<&'static str>,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// A transaction is already open on this connection
    AlreadyActive,
    /// No transaction is open on this connection
    NotActive,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ConfigError {
    /// Create a configuration error with a message and no source.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

/// A failure raised by the caller's linking callback.
#[derive(Debug)]
pub struct CallbackError {
    /// Zero-based index of the row being linked when the callback failed
    pub row: u64,
    /// The error the callback returned
    pub source: Box<Error>,
}

/// Validation error for field-level and batch-level validation.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Every failure found, in discovery order
    pub errors: Vec<FieldValidationError>,
}

/// A single validation error for a field.
#[derive(Debug, Clone)]
pub struct FieldValidationError {
    /// Position of the offending record within its batch, if any
    pub record: Option<usize>,
    /// The field name that failed validation
    pub field: String,
    /// The kind of validation that failed
    pub kind: ValidationErrorKind,
    /// Human-readable error message
    pub message: String,
}

/// The type of validation constraint that was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Required field is missing/null
    Required,
    /// String is shorter than minimum length
    MinLength,
    /// String is longer than maximum length
    MaxLength,
    /// Value doesn't match regex pattern
    Pattern,
    /// Custom validation failed
    Custom,
}

impl ValidationError {
    /// Create a new empty validation error container.
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Check if there are any validation errors.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of collected failures.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Add a field validation error.
    pub fn add(
        &mut self,
        field: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) {
        self.errors.push(FieldValidationError {
            record: None,
            field: field.into(),
            kind,
            message: message.into(),
        });
    }

    /// Add a required field error.
    pub fn add_required(&mut self, field: impl Into<String>) {
        self.add(field, ValidationErrorKind::Required, "is required");
    }

    /// Add a min length error.
    pub fn add_min_length(&mut self, field: impl Into<String>, min: usize, actual: usize) {
        self.add(
            field,
            ValidationErrorKind::MinLength,
            format!("must be at least {min} characters, got {actual}"),
        );
    }

    /// Add a max length error.
    pub fn add_max_length(&mut self, field: impl Into<String>, max: usize, actual: usize) {
        self.add(
            field,
            ValidationErrorKind::MaxLength,
            format!("must be at most {max} characters, got {actual}"),
        );
    }

    /// Add a pattern match error.
    pub fn add_pattern(&mut self, field: impl Into<String>, pattern: &str) {
        self.add(
            field,
            ValidationErrorKind::Pattern,
            format!("must match pattern '{pattern}'"),
        );
    }

    /// Add a custom validation error.
    pub fn add_custom(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.add(field, ValidationErrorKind::Custom, message);
    }

    /// Move every failure of `other` into `self`, tagging them with the
    /// position of the record they belong to.
    pub fn merge_record(&mut self, record: usize, other: ValidationError) {
        self.errors
            .extend(other.errors.into_iter().map(|mut err| {
                err.record = Some(record);
                err
            }));
    }

    /// Convert to Result, returning Ok(()) if no errors, Err(self) otherwise.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl Default for ValidationError {
    fn default() -> Self {
        Self::new()
    }
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError::new(message))
    }

    /// Is this a configuration error raised before any I/O?
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Validation(e) => write!(f, "Validation error: {}", e),
            Error::Callback(e) => write!(f, "Link callback failed on row {}: {}", e.row, e.source),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Callback(e) => Some(e.source.as_ref()),
            Error::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for FieldValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.record {
            Some(index) => write!(f, "[{}] {}: {}", index, self.field, self.message),
            None => write!(f, "{}: {}", self.field, self.message),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            write!(f, "validation passed")
        } else {
            let messages: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
            write!(f, "{}", messages.join("; "))
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        Error::Validation(err)
    }
}

/// Result type alias for dynmodel operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_helpers() {
        let err = Error::config("no fields to insert");
        assert!(err.is_config_error());
        assert_eq!(err.to_string(), "Configuration error: no fields to insert");
    }

    #[test]
    fn query_error_exposes_sql() {
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::Syntax,
            sql: Some("SELEC 1".to_string()),
            message: "near \"SELEC\": syntax error".to_string(),
            source: None,
        });
        assert_eq!(err.sql(), Some("SELEC 1"));
        assert!(err.to_string().starts_with("Query error:"));
    }

    #[test]
    fn validation_message_lists_every_failure() {
        let mut first = ValidationError::new();
        first.add_required("Name");
        let mut second = ValidationError::new();
        second.add_max_length("Code", 3, 5);

        let mut all = ValidationError::new();
        all.merge_record(0, first);
        all.merge_record(4, second);

        assert_eq!(all.len(), 2);
        assert_eq!(
            all.to_string(),
            "[0] Name: is required; [4] Code: must be at most 3 characters, got 5"
        );
        assert!(all.clone().into_result().is_err());
        assert!(ValidationError::new().into_result().is_ok());
    }

    #[test]
    fn callback_error_keeps_source() {
        let err = Error::Callback(CallbackError {
            row: 3,
            source: Box::new(Error::Custom("boom".to_string())),
        });
        assert_eq!(err.to_string(), "Link callback failed on row 3: boom");
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "boom");
    }
}
