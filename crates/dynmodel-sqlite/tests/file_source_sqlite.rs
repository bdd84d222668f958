use dynmodel_core::{Connection, ConnectionSource, Cursor, Transaction, Value};
use dynmodel_sqlite::{SqliteConfig, SqliteConnection};

fn temp_db(name: &str) -> String {
    let path = std::env::temp_dir().join(format!(
        "dynmodel_sqlite_{}_{}.db",
        name,
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    path.to_string_lossy().into_owned()
}

#[test]
fn config_source_reopens_same_file() {
    let path = temp_db("reopen");
    let source = SqliteConfig::file(&path);

    {
        let conn = source.open().unwrap();
        conn.execute_raw("CREATE TABLE kv (k TEXT PRIMARY KEY, v BLOB)")
            .unwrap();
        let tx = conn.begin().unwrap();
        tx.execute(
            "INSERT INTO kv (k, v) VALUES (?1, ?2)",
            &[Value::from("a"), Value::Bytes(vec![1, 2, 3])],
        )
        .unwrap();
        tx.commit().unwrap();
    }

    let conn = source.open().unwrap();
    let mut cursor = conn.query("SELECT k, v FROM kv", &[]).unwrap();
    let row = cursor.next_row().unwrap().unwrap();
    assert_eq!(row, vec![Value::from("a"), Value::Bytes(vec![1, 2, 3])]);
    assert!(cursor.next_row().unwrap().is_none());

    drop(cursor);
    drop(conn);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn temporal_and_json_values_bind_as_text() {
    let conn = SqliteConnection::open_memory().unwrap();
    conn.execute_raw("CREATE TABLE ev (d TEXT, j TEXT, ok INTEGER, price REAL)")
        .unwrap();
    conn.execute(
        "INSERT INTO ev (d, j, ok, price) VALUES (?1, ?2, ?3, ?4)",
        &[
            Value::Date(19_723),
            Value::Json(serde_json::json!({"a": 1})),
            Value::Bool(true),
            Value::Double(2.5),
        ],
    )
    .unwrap();

    let mut cursor = conn.query("SELECT d, j, ok, price FROM ev", &[]).unwrap();
    let row = cursor.next_row().unwrap().unwrap();
    assert_eq!(row[0], Value::from("2024-01-01"));
    assert_eq!(row[1], Value::from(r#"{"a":1}"#));
    assert_eq!(row[2], Value::Int(1));
    assert_eq!(row[3], Value::Double(2.5));
}

#[test]
fn failed_statement_inside_transaction_rolls_back_everything() {
    let conn = SqliteConnection::open_memory().unwrap();
    conn.execute_raw("CREATE TABLE u (id INTEGER PRIMARY KEY, name TEXT UNIQUE)")
        .unwrap();

    let result = {
        let tx = conn.begin().unwrap();
        tx.execute(
            "INSERT INTO u (name) VALUES (?1); INSERT INTO u (name) VALUES (?2);",
            &[Value::from("dup"), Value::from("dup")],
        )
    };
    assert!(result.is_err());
    assert!(!conn.in_transaction());
    assert_eq!(
        conn.scalar("SELECT COUNT(*) FROM u", &[]).unwrap(),
        Value::Int(0)
    );
}
