//! SQL dialects.
//!
//! A [`Dialect`] supplies the statement templates and placeholder syntax a
//! table handle splices its table, columns and parameters into. Statement
//! builders return text without a trailing `;`; batch synthesis appends it.

use crate::identifiers::{quote_ident, quote_ident_mysql, quote_qualified};
use std::fmt;

/// Statement templates for one database family.
pub trait Dialect: fmt::Debug + Send + Sync {
    /// The dialect name.
    fn name(&self) -> &'static str;

    /// Placeholder text binding parameter `index` (0-based).
    fn placeholder(&self, index: usize) -> String;

    /// Quote a single identifier.
    fn quote_identifier(&self, name: &str) -> String;

    /// Quote a possibly schema-qualified table name.
    fn quote_table(&self, table: &str) -> String {
        quote_qualified(table, |part| self.quote_identifier(part))
    }

    /// `INSERT INTO <table> (<cols>) VALUES (<placeholders>)`
    fn insert_statement(&self, table: &str, columns: &[String], placeholders: &[String]) -> String {
        let cols: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_table(table),
            cols.join(", "),
            placeholders.join(", ")
        )
    }

    /// `UPDATE <table> SET <assignments> WHERE <pk> = <placeholder>`
    ///
    /// `assignments` are complete `col = value` fragments.
    fn update_statement(
        &self,
        table: &str,
        assignments: &[String],
        primary_key: &str,
        key_placeholder: &str,
    ) -> String {
        format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.quote_table(table),
            assignments.join(", "),
            self.quote_identifier(primary_key),
            key_placeholder
        )
    }

    /// `DELETE FROM <table> WHERE <pk> IN (<placeholders>)`
    fn delete_statement(&self, table: &str, primary_key: &str, placeholders: &[String]) -> String {
        format!(
            "DELETE FROM {} WHERE {} IN ({})",
            self.quote_table(table),
            self.quote_identifier(primary_key),
            placeholders.join(", ")
        )
    }

    /// `SELECT <columns> FROM <table> [WHERE ..] [ORDER BY ..] [LIMIT n]`
    fn select_statement(
        &self,
        table: &str,
        columns: &str,
        where_clause: &str,
        order_by: &str,
        limit: Option<u64>,
    ) -> String {
        let mut sql = format!("SELECT {} FROM {}", columns, self.quote_table(table));
        push_clause(&mut sql, "WHERE", where_clause);
        push_clause(&mut sql, "ORDER BY", order_by);
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        sql
    }

    /// `SELECT COUNT(*) FROM <table> [WHERE ..]`
    fn count_statement(&self, table: &str, where_clause: &str) -> String {
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.quote_table(table));
        push_clause(&mut sql, "WHERE", where_clause);
        sql
    }

    /// One page of a select: `... LIMIT <limit> OFFSET <offset>`.
    fn paged_statement(
        &self,
        table: &str,
        columns: &str,
        where_clause: &str,
        order_by: &str,
        limit: u64,
        offset: u64,
    ) -> String {
        let mut sql = self.select_statement(table, columns, where_clause, order_by, None);
        sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
        sql
    }

    /// Query returning the next value of `sequence`, if the dialect has sequences.
    fn sequence_statement(&self, sequence: &str) -> Option<String> {
        let _ = sequence;
        None
    }

    /// Whether primary key values come from a sequence fetched before the insert.
    fn fetches_sequence_before_insert(&self) -> bool {
        false
    }

    /// Query returning the identity generated by the last insert on this connection.
    fn identity_statement(&self) -> &'static str;
}

/// Append `keyword fragment` unless the fragment is blank or already starts
/// with the keyword.
fn push_clause(sql: &mut String, keyword: &str, fragment: &str) {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return;
    }
    sql.push(' ');
    let starts_with_keyword = fragment
        .get(..keyword.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(keyword));
    if !starts_with_keyword {
        sql.push_str(keyword);
        sql.push(' ');
    }
    sql.push_str(fragment);
}

/// SQLite: `?N` placeholders, double-quoted identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("?{}", index + 1)
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_ident(name)
    }

    fn identity_statement(&self) -> &'static str {
        "SELECT last_insert_rowid()"
    }
}

/// PostgreSQL: `$N` placeholders, sequences fetched with `nextval`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index + 1)
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_ident(name)
    }

    fn sequence_statement(&self, sequence: &str) -> Option<String> {
        Some(format!("SELECT nextval('{}')", sequence.replace('\'', "''")))
    }

    fn fetches_sequence_before_insert(&self) -> bool {
        true
    }

    fn identity_statement(&self) -> &'static str {
        "SELECT lastval()"
    }
}

/// MySQL: anonymous `?` placeholders, backtick identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn quote_identifier(&self, name: &str) -> String {
        quote_ident_mysql(name)
    }

    fn identity_statement(&self) -> &'static str {
        "SELECT LAST_INSERT_ID()"
    }
}
