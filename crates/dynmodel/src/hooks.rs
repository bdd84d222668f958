//! Batch lifecycle hooks.
//!
//! Batch operations call each hook once per batch, not once per record. All
//! methods have default implementations, so implementors override only the
//! events they care about.

use dynmodel_core::{Record, RecordValidator, ValidationError};

/// Which batch operation is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    /// `insert_batch` or a single insert
    Insert,
    /// `update_batch`
    Update,
    /// `delete_batch`
    Delete,
}

impl BatchKind {
    /// Lowercase name for logging.
    pub const fn as_str(self) -> &'static str {
        match self {
            BatchKind::Insert => "insert",
            BatchKind::Update => "update",
            BatchKind::Delete => "delete",
        }
    }
}

/// Everything a hook can see about the batch in flight.
#[derive(Debug)]
pub struct BatchContext<'a> {
    /// The operation
    pub kind: BatchKind,
    /// Target table
    pub table: &'a str,
    /// Primary key field
    pub primary_key: &'a str,
    /// The batch items, in caller order
    pub records: Vec<Record>,
    /// Rows reported affected; set before the after-hooks run
    pub affected: Option<u64>,
    /// Validator attached to the table handle, if any
    pub validator: Option<&'a RecordValidator>,
}

impl<'a> BatchContext<'a> {
    /// Create a context for a batch that has not run yet.
    pub fn new(
        kind: BatchKind,
        table: &'a str,
        primary_key: &'a str,
        records: Vec<Record>,
        validator: Option<&'a RecordValidator>,
    ) -> Self {
        Self {
            kind,
            table,
            primary_key,
            records,
            affected: None,
            validator,
        }
    }

    /// Number of records in the batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True for an empty batch.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Lifecycle hooks invoked around batch operations.
///
/// Order for inserts and updates: `validate`, `before_save`, execution,
/// `inserted` / `updated`. Deletes skip validation and use
/// `before_delete` / `deleted`. The after-hooks run only once the
/// transaction has committed.
pub trait BatchHooks {
    /// Check the batch before anything runs.
    ///
    /// The default runs the table handle's validator over every record.
    fn validate(&self, ctx: &BatchContext<'_>) -> Result<(), ValidationError> {
        match ctx.validator {
            Some(validator) => validator.validate_batch(&ctx.records),
            None => Ok(()),
        }
    }

    /// Called before an insert or update; returning `false` cancels the batch.
    ///
    /// Records may be adjusted in place.
    fn before_save(&self, ctx: &mut BatchContext<'_>) -> bool {
        let _ = ctx;
        true
    }

    /// Called before a delete; returning `false` cancels the batch.
    fn before_delete(&self, ctx: &mut BatchContext<'_>) -> bool {
        let _ = ctx;
        true
    }

    /// Called after an insert batch committed.
    fn inserted(&self, ctx: &BatchContext<'_>) {
        let _ = ctx;
    }

    /// Called after an update batch committed.
    fn updated(&self, ctx: &BatchContext<'_>) {
        let _ = ctx;
    }

    /// Called after a delete batch committed.
    fn deleted(&self, ctx: &BatchContext<'_>) {
        let _ = ctx;
    }
}

/// Hooks that keep every default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl BatchHooks for DefaultHooks {}

#[cfg(test)]
mod tests {
    use super::*;
    use dynmodel_core::record;

    #[test]
    fn default_validate_uses_attached_validator() {
        let validator = RecordValidator::new().required("Name");
        let ctx = BatchContext::new(
            BatchKind::Insert,
            "Products",
            "Id",
            vec![record! { "Name" => "ok" }, record! { "Qty" => 1 }],
            Some(&validator),
        );
        let err = DefaultHooks.validate(&ctx).unwrap_err();
        assert_eq!(err.errors[0].record, Some(1));

        let unchecked = BatchContext::new(BatchKind::Insert, "Products", "Id", Vec::new(), None);
        assert!(DefaultHooks.validate(&unchecked).is_ok());
        assert!(unchecked.is_empty());
    }

    #[test]
    fn default_before_hooks_proceed() {
        let mut ctx = BatchContext::new(BatchKind::Delete, "t", "Id", Vec::new(), None);
        assert!(DefaultHooks.before_save(&mut ctx));
        assert!(DefaultHooks.before_delete(&mut ctx));
        assert_eq!(BatchKind::Delete.as_str(), "delete");
    }
}
