use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::Connection;
use std::path::Path;

pub const TABLE_LIST_HEADERS: &[&str] = &["schema", "name", "type", "ncol", "wr", "strict"];
pub const TABLE_INFO_HEADERS: &[&str] = &["cid", "name", "type", "notnull", "dflt_value", "pk"];
pub const SCHEMA_HEADERS: &[&str] = &["type", "name", "tbl_name", "rootpage", "sql"];

/// Outcome of running one statement. Failures are data, never panics:
/// `ok = false` carries the driver's message in `error`.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub ok: bool,
    pub rows: Vec<Vec<Value>>,
    pub error: Option<String>,
}

impl ExecOutcome {
    fn success(rows: Vec<Vec<Value>>) -> Self {
        Self {
            ok: true,
            rows,
            error: None,
        }
    }

    fn failure(message: String) -> Self {
        Self {
            ok: false,
            rows: Vec::new(),
            error: Some(message),
        }
    }
}

pub struct SqliteExecutor {
    pub path: String,
    conn: Connection,
    auto_commit: bool,
}

impl SqliteExecutor {
    pub fn open(path: &Path, auto_commit: bool) -> Result<Self> {
        if !path.is_file() {
            anyhow::bail!("database file not found: {}", path.display());
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database: {}", path.display()))?;

        // Without auto-commit the whole session runs inside one deferred
        // transaction; uncommitted changes roll back when the connection drops.
        if !auto_commit {
            conn.execute_batch("BEGIN")?;
        }

        Ok(Self {
            path: path.display().to_string(),
            conn,
            auto_commit,
        })
    }

    #[cfg(test)]
    pub fn open_in_memory(auto_commit: bool) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        if !auto_commit {
            conn.execute_batch("BEGIN")?;
        }
        Ok(Self {
            path: ":memory:".to_string(),
            conn,
            auto_commit,
        })
    }

    pub fn execute(&self, sql: &str, commit: bool) -> ExecOutcome {
        match self.run(sql, commit) {
            Ok(rows) => ExecOutcome::success(rows),
            Err(e) => ExecOutcome::failure(e.to_string()),
        }
    }

    fn run(&self, sql: &str, commit: bool) -> rusqlite::Result<Vec<Vec<Value>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let column_count = stmt.column_count();

        let rows = if column_count == 0 {
            stmt.execute([])?;
            Vec::new()
        } else {
            let mut collected = Vec::new();
            let mut result = stmt.query([])?;
            while let Some(row) = result.next()? {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    values.push(row.get::<_, Value>(i)?);
                }
                collected.push(values);
            }
            collected
        };

        if commit && !self.auto_commit {
            self.conn.execute_batch("COMMIT; BEGIN")?;
        }

        Ok(rows)
    }

    pub fn list_tables(&self) -> ExecOutcome {
        self.execute("PRAGMA table_list", false)
    }

    pub fn list_columns(&self, table: &str) -> ExecOutcome {
        self.execute(
            &format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\"")),
            false,
        )
    }

    pub fn dump_schema(&self) -> ExecOutcome {
        self.execute("SELECT * FROM sqlite_schema", false)
    }

    /// Name + creation statement for every user table, for the AI context
    /// prompt. Best-effort: failures yield an empty context.
    pub fn schema_context(&self) -> Vec<(String, String)> {
        let outcome = self.execute(
            "SELECT tbl_name, sql FROM sqlite_schema \
             WHERE type = 'table' AND tbl_name NOT LIKE 'sqlite%'",
            false,
        );

        outcome
            .rows
            .iter()
            .filter_map(|row| match (row.first(), row.get(1)) {
                (Some(Value::Text(name)), Some(Value::Text(sql))) => {
                    Some((name.clone(), sql.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn table_names(&self) -> Vec<String> {
        let outcome = self.execute(
            "SELECT tbl_name FROM sqlite_schema WHERE type = 'table'",
            false,
        );

        outcome
            .rows
            .iter()
            .filter_map(|row| match row.first() {
                Some(Value::Text(name)) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Column names of one table, in declared order. `None` when the lookup
    /// fails or the table does not exist.
    pub fn column_names(&self, table: &str) -> Option<Vec<String>> {
        let outcome = self.list_columns(table);
        if !outcome.ok || outcome.rows.is_empty() {
            return None;
        }

        let names: Vec<String> = outcome
            .rows
            .iter()
            .filter_map(|row| match row.get(1) {
                Some(Value::Text(name)) => Some(name.clone()),
                _ => None,
            })
            .collect();

        if names.is_empty() {
            None
        } else {
            Some(names)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> SqliteExecutor {
        let db = SqliteExecutor::open_in_memory(true).unwrap();
        assert!(db.execute("CREATE TABLE t (x INT, name TEXT)", false).ok);
        assert!(db.execute("INSERT INTO t VALUES (1, 'one')", false).ok);
        db
    }

    #[test]
    fn execute_never_fails_hard() {
        let db = seeded();
        let outcome = db.execute("SELEC nonsense", false);
        assert!(!outcome.ok);
        assert!(outcome.error.unwrap().contains("syntax error"));
        assert!(outcome.rows.is_empty());
    }

    #[test]
    fn select_collects_rows() {
        let db = seeded();
        let outcome = db.execute("SELECT x, name FROM t", false);
        assert!(outcome.ok);
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0][0], Value::Integer(1));
        assert_eq!(outcome.rows[0][1], Value::Text("one".to_string()));
    }

    #[test]
    fn non_query_returns_no_rows() {
        let db = seeded();
        let outcome = db.execute("INSERT INTO t VALUES (2, 'two')", false);
        assert!(outcome.ok);
        assert!(outcome.rows.is_empty());
    }

    #[test]
    fn constraint_violation_is_an_outcome() {
        let db = SqliteExecutor::open_in_memory(true).unwrap();
        db.execute("CREATE TABLE u (x INT PRIMARY KEY)", false);
        db.execute("INSERT INTO u VALUES (1)", false);
        let outcome = db.execute("INSERT INTO u VALUES (1)", false);
        assert!(!outcome.ok);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn list_tables_is_idempotent() {
        let db = seeded();
        let first = db.list_tables();
        let second = db.list_tables();
        assert!(first.ok && second.ok);
        assert_eq!(first.rows, second.rows);
    }

    #[test]
    fn column_names_in_declared_order() {
        let db = seeded();
        assert_eq!(
            db.column_names("t"),
            Some(vec!["x".to_string(), "name".to_string()])
        );
        assert_eq!(db.column_names("missing"), None);
    }

    #[test]
    fn schema_context_skips_internals() {
        let db = seeded();
        let context = db.schema_context();
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].0, "t");
        assert!(context[0].1.starts_with("CREATE TABLE"));
    }

    #[test]
    fn uncommitted_changes_roll_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        std::fs::File::create(&path).unwrap();

        {
            let db = SqliteExecutor::open(&path, false).unwrap();
            assert!(db.execute("CREATE TABLE gone (x INT)", false).ok);
        }

        let db = SqliteExecutor::open(&path, true).unwrap();
        assert!(db.table_names().is_empty());
    }

    #[test]
    fn commit_flag_persists_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        std::fs::File::create(&path).unwrap();

        {
            let db = SqliteExecutor::open(&path, false).unwrap();
            assert!(db.execute("CREATE TABLE kept (x INT)", true).ok);
        }

        let db = SqliteExecutor::open(&path, true).unwrap();
        assert_eq!(db.table_names(), vec!["kept".to_string()]);
    }

    #[test]
    fn open_missing_file_is_a_startup_error() {
        assert!(SqliteExecutor::open(Path::new("/no/such/file.db"), true).is_err());
    }
}
