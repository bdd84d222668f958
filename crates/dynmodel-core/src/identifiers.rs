//! SQL identifier quoting.
//!
//! Table and column names coming from a table handle or a record are always
//! quoted before they are spliced into generated SQL.

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them (`"` → `""`).
///
/// ```
/// use dynmodel_core::quote_ident;
///
/// assert_eq!(quote_ident("Products"), "\"Products\"");
/// assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a SQL identifier using MySQL backtick quoting.
///
/// ```
/// use dynmodel_core::quote_ident_mysql;
///
/// assert_eq!(quote_ident_mysql("Products"), "`Products`");
/// ```
#[inline]
pub fn quote_ident_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a possibly schema-qualified name segment by segment.
///
/// `main.Products` becomes `"main"."Products"` with the ANSI quoter.
pub fn quote_qualified(name: &str, quote: impl Fn(&str) -> String) -> String {
    name.split('.').map(quote).collect::<Vec<_>>().join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("a\"b\"c"), "\"a\"\"b\"\"c\"");
        assert_eq!(quote_ident("select"), "\"select\"");
        assert_eq!(quote_ident("first name"), "\"first name\"");
    }

    #[test]
    fn test_quote_ident_injection_attempt() {
        let quoted = quote_ident("x\"; DROP TABLE t; --");
        assert_eq!(quoted, "\"x\"\"; DROP TABLE t; --\"");
    }

    #[test]
    fn test_quote_ident_mysql_escapes() {
        assert_eq!(quote_ident_mysql("a`b"), "`a``b`");
    }

    #[test]
    fn test_quote_qualified() {
        assert_eq!(quote_qualified("Products", quote_ident), "\"Products\"");
        assert_eq!(
            quote_qualified("main.Products", quote_ident),
            "\"main\".\"Products\""
        );
        assert_eq!(
            quote_qualified("shop.orders", quote_ident_mysql),
            "`shop`.`orders`"
        );
    }
}
