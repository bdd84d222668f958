//! Batch inserts, updates and deletes.
//!
//! Each batch becomes a single parameterized command executed once inside a
//! single transaction:
//!
//! - insert: one `INSERT ... VALUES (...);` per record
//! - update: one `UPDATE ... SET ... WHERE pk = ?;` per record
//! - delete: one `DELETE ... WHERE pk IN (...);` for the whole batch
//!
//! Lifecycle hooks run once per batch. Shape problems (missing primary keys,
//! records with nothing to write, inserts whose field sets differ) are
//! reported as configuration errors before a connection is opened.

use dynmodel_core::{
    Command, Connection, ConnectionSource, Dialect, Entity, Error, Record, Result, ToRecord,
    Transaction, Value, to_records,
};

use crate::hooks::{BatchContext, BatchKind};
use crate::model::DynamicModel;

fn primary_key_value<'r>(
    record: &'r Record,
    primary_key: &str,
    index: usize,
    kind: BatchKind,
) -> Result<&'r Value> {
    match record.get(primary_key) {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(Error::config(format!(
            "{} record {} has no value for primary key '{}'",
            kind.as_str(),
            index,
            primary_key
        ))),
    }
}

/// Column list of an insert batch.
///
/// Columns come from the first record, in its field order, without the
/// primary key. With `include_primary_key` the primary key leads the list.
/// Every record must carry exactly the first record's non-key fields.
pub fn insert_columns(
    records: &[Record],
    primary_key: &str,
    include_primary_key: bool,
) -> Result<Vec<String>> {
    let Some(first) = records.first() else {
        return Err(Error::config("insert batch has no records"));
    };
    let is_key = |name: &&str| name.eq_ignore_ascii_case(primary_key);

    let mut columns: Vec<String> = first
        .keys()
        .filter(|name| !is_key(name))
        .map(str::to_string)
        .collect();

    for (index, record) in records.iter().enumerate().skip(1) {
        let fields: Vec<&str> = record.keys().filter(|name| !is_key(name)).collect();
        let same_shape = fields.len() == columns.len()
            && fields.iter().all(|name| first.contains_key(name));
        if !same_shape {
            return Err(Error::config(format!(
                "insert record {} has fields [{}] but the batch is shaped [{}]",
                index,
                fields.join(", "),
                columns.join(", ")
            )));
        }
    }

    if include_primary_key {
        let key = first.key_spelling(primary_key).unwrap_or(primary_key);
        columns.insert(0, key.to_string());
    }
    if columns.is_empty() {
        return Err(Error::config("insert batch has no fields to insert"));
    }
    Ok(columns)
}

/// Build the insert command for `records` over an already checked column list.
pub fn insert_command(
    dialect: &dyn Dialect,
    table: &str,
    columns: &[String],
    records: &[Record],
) -> Result<Command> {
    let mut command = Command::default();
    let mut statements = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let mut placeholders = Vec::with_capacity(columns.len());
        for column in columns {
            let value = record.get(column).ok_or_else(|| {
                Error::config(format!("insert record {index} has no value for '{column}'"))
            })?;
            let param = command.push_param(value.clone());
            placeholders.push(dialect.placeholder(param));
        }
        statements.push(format!(
            "{};",
            dialect.insert_statement(table, columns, &placeholders)
        ));
    }

    command.sql = statements.join(" ");
    Ok(command)
}

/// Build one command inserting every record.
///
/// Parameters are ordered row by row, then column by column.
pub fn build_insert(
    dialect: &dyn Dialect,
    table: &str,
    primary_key: &str,
    records: &[Record],
    include_primary_key: bool,
) -> Result<Command> {
    let columns = insert_columns(records, primary_key, include_primary_key)?;
    insert_command(dialect, table, &columns, records)
}

/// Build one command updating every record by primary key.
///
/// Null fields are written as a literal `NULL` and bind no parameter. The
/// primary key value binds last in each statement.
pub fn build_update(
    dialect: &dyn Dialect,
    table: &str,
    primary_key: &str,
    records: &[Record],
) -> Result<Command> {
    if records.is_empty() {
        return Err(Error::config("update batch has no records"));
    }
    let mut command = Command::default();
    let mut statements = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let key = primary_key_value(record, primary_key, index, BatchKind::Update)?;

        let mut assignments = Vec::with_capacity(record.len());
        for (name, value) in record.iter() {
            if name.eq_ignore_ascii_case(primary_key) {
                continue;
            }
            let column = dialect.quote_identifier(name);
            if value.is_null() {
                assignments.push(format!("{column} = NULL"));
            } else {
                let param = command.push_param(value.clone());
                assignments.push(format!("{column} = {}", dialect.placeholder(param)));
            }
        }
        if assignments.is_empty() {
            return Err(Error::config(format!(
                "update record {index} has no fields to set"
            )));
        }

        let param = command.push_param(key.clone());
        statements.push(format!(
            "{};",
            dialect.update_statement(table, &assignments, primary_key, &dialect.placeholder(param))
        ));
    }

    command.sql = statements.join(" ");
    Ok(command)
}

/// Build one `DELETE ... IN (...)` command, one parameter per record in order.
pub fn build_delete(
    dialect: &dyn Dialect,
    table: &str,
    primary_key: &str,
    records: &[Record],
) -> Result<Command> {
    if records.is_empty() {
        return Err(Error::config("delete batch has no records"));
    }
    let mut command = Command::default();
    let mut placeholders = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let key = primary_key_value(record, primary_key, index, BatchKind::Delete)?;
        let param = command.push_param(key.clone());
        placeholders.push(dialect.placeholder(param));
    }
    command.sql = format!(
        "{};",
        dialect.delete_statement(table, primary_key, &placeholders)
    );
    Ok(command)
}

/// Fetch one sequence value per record into its primary key.
fn assign_sequence_values(
    tx: &dyn Transaction,
    sequence_sql: &str,
    primary_key: &str,
    records: &mut [Record],
) -> Result<()> {
    for record in records.iter_mut() {
        let next = tx.scalar(sequence_sql, &[])?;
        record.insert(primary_key, next);
    }
    tracing::debug!(count = records.len(), "Fetched sequence values");
    Ok(())
}

impl<S: ConnectionSource> DynamicModel<S> {
    /// Sequence query to run per inserted record, if keys come from a sequence.
    fn sequence_query(&self) -> Option<String> {
        if !self.dialect().fetches_sequence_before_insert() {
            return None;
        }
        let sequence = self.config().sequence.as_deref()?;
        self.dialect().sequence_statement(sequence)
    }

    /// Shared batch flow.
    ///
    /// validate (insert/update) → before hook → `prepare` → open → begin →
    /// `execute` → commit → after hook. Returns `None` when a before hook
    /// cancelled the batch.
    fn run_batch<P>(
        &self,
        kind: BatchKind,
        records: Vec<Record>,
        prepare: impl FnOnce(&[Record]) -> Result<P>,
        execute: impl FnOnce(&dyn Transaction, &mut [Record], P) -> Result<u64>,
    ) -> Result<Option<BatchContext<'_>>> {
        let config = self.config();
        let hooks = self.hooks();
        let mut ctx = BatchContext::new(
            kind,
            &config.table,
            &config.primary_key,
            records,
            config.validator.as_ref(),
        );

        if kind != BatchKind::Delete {
            hooks.validate(&ctx)?;
        }
        let proceed = match kind {
            BatchKind::Delete => hooks.before_delete(&mut ctx),
            BatchKind::Insert | BatchKind::Update => hooks.before_save(&mut ctx),
        };
        if !proceed {
            tracing::warn!(
                table = %config.table,
                kind = kind.as_str(),
                count = ctx.len(),
                "Batch cancelled by before hook"
            );
            return Ok(None);
        }

        let prepared = prepare(&ctx.records)?;

        tracing::debug!(
            table = %config.table,
            kind = kind.as_str(),
            count = ctx.len(),
            "Executing batch"
        );

        let conn = self.source().open()?;
        let tx = conn.begin()?;
        let statements: &dyn Transaction = &tx;
        let affected = execute(statements, &mut ctx.records, prepared)?;
        tx.commit()?;
        ctx.affected = Some(affected);

        tracing::info!(
            table = %config.table,
            kind = kind.as_str(),
            count = ctx.len(),
            affected = affected,
            "Batch committed"
        );

        match kind {
            BatchKind::Insert => hooks.inserted(&ctx),
            BatchKind::Update => hooks.updated(&ctx),
            BatchKind::Delete => hooks.deleted(&ctx),
        }
        Ok(Some(ctx))
    }

    /// Insert every item with one command in one transaction.
    ///
    /// The primary key is left to the database unless a sequence is
    /// configured and the dialect fetches sequence values before inserting;
    /// then one value per item is fetched inside the transaction. Returns the
    /// affected row count, or 0 for an empty or cancelled batch.
    #[tracing::instrument(level = "debug", skip(self, items), fields(table = %self.table(), count = items.len()))]
    pub fn insert_batch<T: ToRecord>(&self, items: &[T]) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }
        let primary_key = self.primary_key();
        let sequence = self.sequence_query();
        let include_key = sequence.is_some();

        let ctx = self.run_batch(
            BatchKind::Insert,
            to_records(items),
            |records| insert_columns(records, primary_key, include_key),
            |tx, records, columns| {
                if let Some(sql) = &sequence {
                    assign_sequence_values(tx, sql, primary_key, records)?;
                }
                let command = insert_command(self.dialect(), self.table(), &columns, records)?;
                tracing::trace!(sql = %command.sql, params = command.param_count(), "Synthesized insert batch");
                tx.run(&command)
            },
        )?;
        Ok(ctx.and_then(|ctx| ctx.affected).unwrap_or(0))
    }

    /// Update every item by primary key with one command in one transaction.
    #[tracing::instrument(level = "debug", skip(self, items), fields(table = %self.table(), count = items.len()))]
    pub fn update_batch<T: ToRecord>(&self, items: &[T]) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }
        let ctx = self.run_batch(
            BatchKind::Update,
            to_records(items),
            |records| build_update(self.dialect(), self.table(), self.primary_key(), records),
            |tx, _, command| {
                tracing::trace!(sql = %command.sql, params = command.param_count(), "Synthesized update batch");
                tx.run(&command)
            },
        )?;
        Ok(ctx.and_then(|ctx| ctx.affected).unwrap_or(0))
    }

    /// Delete every item by primary key with a single `IN` statement.
    #[tracing::instrument(level = "debug", skip(self, items), fields(table = %self.table(), count = items.len()))]
    pub fn delete_batch<T: ToRecord>(&self, items: &[T]) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }
        let ctx = self.run_batch(
            BatchKind::Delete,
            to_records(items),
            |records| build_delete(self.dialect(), self.table(), self.primary_key(), records),
            |tx, _, command| {
                tracing::trace!(sql = %command.sql, params = command.param_count(), "Synthesized delete batch");
                tx.run(&command)
            },
        )?;
        Ok(ctx.and_then(|ctx| ctx.affected).unwrap_or(0))
    }

    /// Insert one item and return it with its primary key filled in.
    ///
    /// Any primary key value on the item is dropped so the database, or the
    /// configured sequence, assigns it. Returns `None` when a before hook
    /// cancelled the insert.
    #[tracing::instrument(level = "debug", skip(self, item), fields(table = %self.table()))]
    pub fn insert<T: ToRecord + ?Sized>(&self, item: &T) -> Result<Option<Record>> {
        let primary_key = self.primary_key();
        let mut record = item.to_record();
        record.remove(primary_key);
        let sequence = self.sequence_query();
        let include_key = sequence.is_some();

        let ctx = self.run_batch(
            BatchKind::Insert,
            vec![record],
            |records| insert_columns(records, primary_key, include_key),
            |tx, records, columns| {
                if let Some(sql) = &sequence {
                    assign_sequence_values(tx, sql, primary_key, records)?;
                }
                let command = insert_command(self.dialect(), self.table(), &columns, records)?;
                tracing::trace!(sql = %command.sql, "Synthesized insert");
                let affected = tx.run(&command)?;
                if sequence.is_none() {
                    let identity = tx.scalar(self.dialect().identity_statement(), &[])?;
                    for record in records.iter_mut() {
                        record.insert(primary_key, identity.clone());
                    }
                }
                Ok(affected)
            },
        )?;
        Ok(ctx.and_then(|mut ctx| ctx.records.pop()))
    }

    /// Insert a typed entity and write the generated primary key back into it.
    ///
    /// Returns `false` when a before hook cancelled the insert.
    pub fn insert_entity<T: ToRecord + Entity>(&self, entity: &mut T) -> Result<bool> {
        let Some(inserted) = self.insert(&*entity)? else {
            return Ok(false);
        };
        if let Some(key) = inserted.get(self.primary_key()) {
            T::field_table().assign(entity, self.primary_key(), key.clone())?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::BatchHooks;
    use crate::model::ModelConfig;
    use dynmodel_core::{
        Cursor, MySqlDialect, PostgresDialect, RecordValidator, SqliteDialect, ValidationError,
        record,
    };
    use std::cell::{Cell, RefCell};
    use std::sync::{Arc, Mutex};

    struct NoRows;

    impl Cursor for NoRows {
        fn columns(&self) -> &[String] {
            &[]
        }

        fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
            Ok(None)
        }
    }

    /// Connection that records every statement instead of running it.
    #[derive(Default)]
    struct Recorder {
        log: RefCell<Vec<(String, Vec<Value>)>>,
        next_id: Cell<i64>,
        begun: Cell<usize>,
        fail_on: Option<&'static str>,
    }

    impl Recorder {
        fn failing_on(fragment: &'static str) -> Self {
            Self {
                fail_on: Some(fragment),
                ..Self::default()
            }
        }

        fn record(&self, sql: &str, params: &[Value]) -> Result<()> {
            self.log.borrow_mut().push((sql.to_string(), params.to_vec()));
            match self.fail_on {
                Some(fragment) if sql.contains(fragment) => {
                    Err(Error::Custom(format!("injected failure on {fragment}")))
                }
                _ => Ok(()),
            }
        }

        fn statements(&self) -> Vec<String> {
            self.log.borrow().iter().map(|(sql, _)| sql.clone()).collect()
        }

        fn params_of(&self, index: usize) -> Vec<Value> {
            self.log.borrow()[index].1.clone()
        }
    }

    struct RecorderTx<'a> {
        conn: &'a Recorder,
        done: bool,
    }

    impl Drop for RecorderTx<'_> {
        fn drop(&mut self) {
            if !self.done {
                self.conn.log.borrow_mut().push(("ROLLBACK".into(), Vec::new()));
            }
        }
    }

    impl Transaction for RecorderTx<'_> {
        fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
            self.conn.execute(sql, params)
        }

        fn scalar(&self, sql: &str, params: &[Value]) -> Result<Value> {
            self.conn.scalar(sql, params)
        }

        fn commit(mut self) -> Result<()> {
            self.done = true;
            self.conn.log.borrow_mut().push(("COMMIT".into(), Vec::new()));
            Ok(())
        }

        fn rollback(mut self) -> Result<()> {
            self.done = true;
            self.conn.log.borrow_mut().push(("ROLLBACK".into(), Vec::new()));
            Ok(())
        }
    }

    impl Connection for Recorder {
        type Cursor = NoRows;
        type Tx<'conn> = RecorderTx<'conn>;

        fn query(&self, sql: &str, params: &[Value]) -> Result<NoRows> {
            self.record(sql, params)?;
            Ok(NoRows)
        }

        fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
            self.record(sql, params)?;
            if sql.starts_with("DELETE") {
                Ok(params.len() as u64)
            } else {
                Ok(sql.matches(';').count() as u64)
            }
        }

        fn scalar(&self, sql: &str, params: &[Value]) -> Result<Value> {
            self.record(sql, params)?;
            let id = self.next_id.get() + 1;
            self.next_id.set(id);
            Ok(Value::BigInt(id))
        }

        fn begin(&self) -> Result<RecorderTx<'_>> {
            self.begun.set(self.begun.get() + 1);
            self.log.borrow_mut().push(("BEGIN".into(), Vec::new()));
            Ok(RecorderTx {
                conn: self,
                done: false,
            })
        }
    }

    #[derive(Default)]
    struct Tracking {
        events: Mutex<Vec<String>>,
        veto: bool,
    }

    impl Tracking {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl BatchHooks for Arc<Tracking> {
        fn validate(&self, ctx: &BatchContext<'_>) -> std::result::Result<(), ValidationError> {
            self.push(format!("validate:{}", ctx.len()));
            match ctx.validator {
                Some(v) => v.validate_batch(&ctx.records),
                None => Ok(()),
            }
        }

        fn before_save(&self, ctx: &mut BatchContext<'_>) -> bool {
            self.push(format!("before_save:{}", ctx.len()));
            !self.veto
        }

        fn before_delete(&self, ctx: &mut BatchContext<'_>) -> bool {
            self.push(format!("before_delete:{}", ctx.len()));
            !self.veto
        }

        fn inserted(&self, ctx: &BatchContext<'_>) {
            self.push(format!("inserted:{:?}", ctx.affected));
        }

        fn updated(&self, ctx: &BatchContext<'_>) {
            self.push(format!("updated:{:?}", ctx.affected));
        }

        fn deleted(&self, ctx: &BatchContext<'_>) {
            self.push(format!("deleted:{:?}", ctx.affected));
        }
    }

    fn model(recorder: &Arc<Recorder>, config: ModelConfig) -> DynamicModel<Arc<Recorder>> {
        DynamicModel::new(Arc::clone(recorder), config)
    }

    #[test]
    fn insert_sql_omits_primary_key() {
        let records = vec![
            record! { "Name" => "x", "Qty" => 1 },
            record! { "Name" => "y", "Qty" => 2 },
        ];
        let command = build_insert(&SqliteDialect, "Products", "Id", &records, false).unwrap();
        assert_eq!(
            command.sql,
            r#"INSERT INTO "Products" ("Name", "Qty") VALUES (?1, ?2); INSERT INTO "Products" ("Name", "Qty") VALUES (?3, ?4);"#
        );
        assert!(!command.sql.contains("Id"));
        assert_eq!(
            command.params,
            vec![Value::from("x"), Value::Int(1), Value::from("y"), Value::Int(2)]
        );
    }

    #[test]
    fn insert_drops_key_and_follows_first_record_order() {
        let records = vec![
            record! { "id" => 9, "Name" => "x", "Qty" => 1 },
            record! { "Qty" => 2, "NAME" => "y" },
        ];
        let command = build_insert(&PostgresDialect, "Products", "Id", &records, false).unwrap();
        assert_eq!(
            command.sql,
            r#"INSERT INTO "Products" ("Name", "Qty") VALUES ($1, $2); INSERT INTO "Products" ("Name", "Qty") VALUES ($3, $4);"#
        );
        assert_eq!(command.params[2], Value::from("y"));
        assert_eq!(command.params[3], Value::Int(2));
    }

    #[test]
    fn insert_rejects_mismatched_shapes() {
        let records = vec![
            record! { "Name" => "x", "Qty" => 1 },
            record! { "Name" => "y", "Price" => 2 },
        ];
        let err = build_insert(&SqliteDialect, "Products", "Id", &records, false).unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("insert record 1"));

        let short = vec![record! { "Name" => "x", "Qty" => 1 }, record! { "Name" => "y" }];
        assert!(build_insert(&SqliteDialect, "Products", "Id", &short, false).is_err());
    }

    #[test]
    fn insert_without_fields_is_a_config_error() {
        let records = vec![record! { "Id" => 1 }];
        let err = build_insert(&SqliteDialect, "Products", "Id", &records, false).unwrap_err();
        assert!(err.is_config_error());

        let with_key = build_insert(&SqliteDialect, "Products", "Id", &records, true).unwrap();
        assert_eq!(with_key.sql, r#"INSERT INTO "Products" ("Id") VALUES (?1);"#);
    }

    #[test]
    fn update_writes_null_literally() {
        let records = vec![
            record! { "Id" => 1, "Name" => "x", "Note" => Value::Null },
            record! { "Name" => Value::Null, "Qty" => 5, "ID" => 2 },
        ];
        let command = build_update(&SqliteDialect, "Products", "Id", &records).unwrap();
        assert_eq!(
            command.sql,
            r#"UPDATE "Products" SET "Name" = ?1, "Note" = NULL WHERE "Id" = ?2; UPDATE "Products" SET "Name" = NULL, "Qty" = ?3 WHERE "Id" = ?4;"#
        );
        assert_eq!(
            command.params,
            vec![Value::from("x"), Value::Int(1), Value::Int(5), Value::Int(2)]
        );
    }

    #[test]
    fn update_requires_key_and_fields() {
        let missing = vec![record! { "Name" => "x" }];
        let err = build_update(&SqliteDialect, "t", "Id", &missing).unwrap_err();
        assert!(err.to_string().contains("primary key 'Id'"));

        let null_key = vec![record! { "Id" => Value::Null, "Name" => "x" }];
        assert!(build_update(&SqliteDialect, "t", "Id", &null_key).unwrap_err().is_config_error());

        let only_key = vec![record! { "Id" => 1 }];
        assert!(build_update(&SqliteDialect, "t", "Id", &only_key).unwrap_err().is_config_error());
    }

    #[test]
    fn delete_uses_one_in_list() {
        let records = vec![
            record! { "Id" => 3 },
            record! { "Id" => 1, "Name" => "ignored" },
            record! { "id" => 2 },
        ];
        let command = build_delete(&MySqlDialect, "Products", "Id", &records).unwrap();
        assert_eq!(command.sql, "DELETE FROM `Products` WHERE `Id` IN (?, ?, ?);");
        assert_eq!(command.params, vec![Value::Int(3), Value::Int(1), Value::Int(2)]);

        let missing = vec![record! { "Id" => 3 }, record! { "Name" => "x" }];
        let err = build_delete(&SqliteDialect, "Products", "Id", &missing).unwrap_err();
        assert!(err.to_string().contains("delete record 1"));
    }

    #[test]
    fn insert_batch_runs_once_in_a_transaction() {
        let recorder = Arc::new(Recorder::default());
        let hooks = Arc::new(Tracking::default());
        let products = model(&recorder, ModelConfig::new("Products", "Id")).with_hooks(Arc::clone(&hooks));

        let items = [
            record! { "Name" => "x", "Qty" => 1 },
            record! { "Name" => "y", "Qty" => 2 },
            record! { "Name" => "z", "Qty" => 3 },
        ];
        assert_eq!(products.insert_batch(&items).unwrap(), 3);

        let statements = recorder.statements();
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0], "BEGIN");
        assert_eq!(statements[1].matches("INSERT INTO").count(), 3);
        assert_eq!(statements[2], "COMMIT");
        assert_eq!(recorder.params_of(1).len(), 6);
        assert_eq!(
            hooks.events(),
            vec!["validate:3", "before_save:3", "inserted:Some(3)"]
        );
    }

    #[test]
    fn postgres_sequence_values_are_fetched_per_record() {
        let recorder = Arc::new(Recorder::default());
        let products = model(
            &recorder,
            ModelConfig::new("Products", "Id").sequence("products_id_seq"),
        )
        .with_dialect(PostgresDialect);

        let items = [record! { "Name" => "x" }, record! { "Name" => "y" }];
        assert_eq!(products.insert_batch(&items).unwrap(), 2);

        let statements = recorder.statements();
        assert_eq!(
            statements,
            vec![
                "BEGIN".to_string(),
                "SELECT nextval('products_id_seq')".to_string(),
                "SELECT nextval('products_id_seq')".to_string(),
                r#"INSERT INTO "Products" ("Id", "Name") VALUES ($1, $2); INSERT INTO "Products" ("Id", "Name") VALUES ($3, $4);"#.to_string(),
                "COMMIT".to_string(),
            ]
        );
        assert_eq!(
            recorder.params_of(3),
            vec![Value::BigInt(1), Value::from("x"), Value::BigInt(2), Value::from("y")]
        );
    }

    #[test]
    fn sequence_is_ignored_by_dialects_without_prefetch() {
        let recorder = Arc::new(Recorder::default());
        let products = model(&recorder, ModelConfig::new("Products", "Id").sequence("s"));
        products.insert_batch(&[record! { "Name" => "x" }]).unwrap();
        assert!(!recorder.statements().iter().any(|s| s.contains("nextval")));
        assert!(!recorder.statements()[1].contains("\"Id\""));
    }

    #[test]
    fn update_and_delete_batches_notify_once() {
        let recorder = Arc::new(Recorder::default());
        let hooks = Arc::new(Tracking::default());
        let products = model(&recorder, ModelConfig::new("Products", "Id")).with_hooks(Arc::clone(&hooks));

        let items = [record! { "Id" => 1, "Qty" => 5 }, record! { "Id" => 2, "Qty" => 6 }];
        assert_eq!(products.update_batch(&items).unwrap(), 2);
        assert_eq!(products.delete_batch(&items).unwrap(), 2);

        assert_eq!(
            hooks.events(),
            vec![
                "validate:2",
                "before_save:2",
                "updated:Some(2)",
                "before_delete:2",
                "deleted:Some(2)",
            ]
        );
        let statements = recorder.statements();
        assert_eq!(statements[4], r#"DELETE FROM "Products" WHERE "Id" IN (?1, ?2);"#);
        assert_eq!(recorder.params_of(4), vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn veto_cancels_without_io() {
        let recorder = Arc::new(Recorder::default());
        let hooks = Arc::new(Tracking {
            veto: true,
            ..Tracking::default()
        });
        let products = model(&recorder, ModelConfig::new("Products", "Id")).with_hooks(Arc::clone(&hooks));

        assert_eq!(products.insert_batch(&[record! { "Name" => "x" }]).unwrap(), 0);
        assert_eq!(products.delete_batch(&[record! { "Id" => 1 }]).unwrap(), 0);
        assert!(products.insert(&record! { "Name" => "x" }).unwrap().is_none());
        assert!(recorder.statements().is_empty());
        assert_eq!(recorder.begun.get(), 0);
        assert_eq!(
            hooks.events(),
            vec!["validate:1", "before_save:1", "before_delete:1", "validate:1", "before_save:1"]
        );
    }

    #[test]
    fn validation_failure_rejects_whole_batch() {
        let recorder = Arc::new(Recorder::default());
        let validator = RecordValidator::new().required("Name").max_length("Name", 3);
        let products = model(&recorder, ModelConfig::new("Products", "Id").validator(validator));

        let items = [
            record! { "Name" => "ok" },
            record! { "Name" => "" },
            record! { "Name" => "too long" },
        ];
        let err = products.insert_batch(&items).unwrap_err();
        match &err {
            Error::Validation(v) => {
                assert_eq!(v.len(), 2);
                let message = err.to_string();
                assert!(message.contains("[1] Name"));
                assert!(message.contains("[2] Name"));
            }
            other => panic!("unexpected: {other}"),
        }
        assert!(recorder.statements().is_empty());

        // deletes are not validated
        assert_eq!(products.delete_batch(&[record! { "Id" => 1 }]).unwrap(), 1);
    }

    #[test]
    fn config_errors_happen_before_connecting() {
        let recorder = Arc::new(Recorder::default());
        let products = model(&recorder, ModelConfig::new("Products", "Id"));

        let err = products.update_batch(&[record! { "Name" => "x" }]).unwrap_err();
        assert!(err.is_config_error());
        let err = products.insert_batch(&[record! { "Id" => 4 }]).unwrap_err();
        assert!(err.is_config_error());
        assert_eq!(recorder.begun.get(), 0);
    }

    #[test]
    fn empty_batches_do_nothing() {
        let recorder = Arc::new(Recorder::default());
        let hooks = Arc::new(Tracking::default());
        let products = model(&recorder, ModelConfig::new("Products", "Id")).with_hooks(Arc::clone(&hooks));
        let none: [Record; 0] = [];
        assert_eq!(products.insert_batch(&none).unwrap(), 0);
        assert_eq!(products.update_batch(&none).unwrap(), 0);
        assert_eq!(products.delete_batch(&none).unwrap(), 0);
        assert!(hooks.events().is_empty());
        assert!(recorder.statements().is_empty());
    }

    #[test]
    fn execution_failure_rolls_back_and_skips_after_hook() {
        let recorder = Arc::new(Recorder::failing_on("UPDATE"));
        let hooks = Arc::new(Tracking::default());
        let products = model(&recorder, ModelConfig::new("Products", "Id")).with_hooks(Arc::clone(&hooks));

        let err = products.update_batch(&[record! { "Id" => 1, "Qty" => 0 }]).unwrap_err();
        assert!(err.to_string().contains("injected failure"));
        let statements = recorder.statements();
        assert_eq!(statements.first().map(String::as_str), Some("BEGIN"));
        assert_eq!(statements.last().map(String::as_str), Some("ROLLBACK"));
        assert_eq!(hooks.events(), vec!["validate:1", "before_save:1"]);
    }

    #[test]
    fn single_insert_reads_back_identity() {
        let recorder = Arc::new(Recorder::default());
        let products = model(&recorder, ModelConfig::new("Products", "Id"));

        let inserted = products
            .insert(&record! { "Id" => 77, "Name" => "x" })
            .unwrap()
            .unwrap();
        assert_eq!(inserted.get("Id"), Some(&Value::BigInt(1)));
        assert_eq!(inserted.get("Name"), Some(&Value::from("x")));

        let statements = recorder.statements();
        assert_eq!(statements[1], r#"INSERT INTO "Products" ("Name") VALUES (?1);"#);
        assert_eq!(statements[2], "SELECT last_insert_rowid()");
        assert_eq!(statements[3], "COMMIT");
    }
}
