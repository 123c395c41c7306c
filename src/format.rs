use crate::db::{ExecOutcome, SqliteExecutor};
use anyhow::Result;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};
use rusqlite::types::Value;

/// Where display headers for a result come from.
pub enum Headers<'a> {
    /// Caller-supplied names, e.g. the pragma column sets in `db`.
    Fixed(&'a [&'a str]),
    /// Infer from the statement text and the live schema.
    Infer {
        sql: &'a str,
        db: &'a SqliteExecutor,
    },
    /// Straight to positional labels.
    Positional,
}

pub fn parse_color(name: &str) -> Color {
    match name.to_ascii_lowercase().as_str() {
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" => Color::Magenta,
        "white" => Color::White,
        "grey" | "gray" => Color::Grey,
        _ => Color::Cyan,
    }
}

pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => String::from_utf8_lossy(b).to_string(),
    }
}

fn value_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Real(r) => {
            serde_json::Number::from_f64(*r).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        Value::Text(s) => serde_json::Value::from(s.as_str()),
        Value::Blob(b) => serde_json::Value::from(String::from_utf8_lossy(b).to_string()),
    }
}

/// Render one outcome to stdout. A failed outcome surfaces its message as the
/// error; a successful outcome with no rows renders nothing.
pub fn render(outcome: &ExecOutcome, headers: Headers, json: bool, color: Color) -> Result<()> {
    if !outcome.ok {
        anyhow::bail!(
            "{}",
            outcome.error.as_deref().unwrap_or("statement failed")
        );
    }

    let arity = match outcome.rows.first() {
        Some(row) if !row.is_empty() => row.len(),
        _ => return Ok(()),
    };

    let resolved = resolve_headers(&headers, arity);

    if json {
        let payload = json_payload(&outcome.rows, resolved.as_deref());
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{}", build_table(&outcome.rows, resolved.as_deref(), color));
    }

    Ok(())
}

/// `None` means no usable header set was found and positional labels apply.
fn resolve_headers(headers: &Headers, arity: usize) -> Option<Vec<String>> {
    let names = match headers {
        Headers::Fixed(names) => Some(names.iter().map(|s| s.to_string()).collect()),
        Headers::Infer { sql, db } => infer_headers(sql, db),
        Headers::Positional => None,
    };

    match names {
        Some(names) if names.len() == arity => Some(names),
        Some(_) => {
            tracing::debug!("header count does not match row arity, using positional labels");
            None
        }
        None => None,
    }
}

fn positional_labels(arity: usize) -> Vec<String> {
    (1..=arity).map(|i| format!("Col. {i}")).collect()
}

/// Best-effort column-name inference for a statement whose result shape is
/// unknown. Grammar: `select * from <table>` asks the schema for the table's
/// columns; `select <ident> [, <ident>]* from ...` uses the listed names;
/// anything else (expressions, functions, joins with aliases) falls through.
pub fn infer_headers(sql: &str, db: &SqliteExecutor) -> Option<Vec<String>> {
    let tokens: Vec<&str> = sql.split_whitespace().collect();
    if !tokens.first()?.eq_ignore_ascii_case("select") {
        return None;
    }

    let from_ix = tokens.iter().position(|t| t.eq_ignore_ascii_case("from"))?;
    let column_segment = tokens.get(1..from_ix)?.join(" ");

    if column_segment.trim() == "*" {
        let table = tokens.get(from_ix + 1)?.trim_end_matches(';');
        if !is_identifier(table) {
            return None;
        }
        return db.column_names(table);
    }

    if column_segment.is_empty()
        || !column_segment
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == ',' || c.is_whitespace())
    {
        return None;
    }

    let names: Vec<String> = column_segment
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if names.is_empty() {
        None
    } else {
        Some(names)
    }
}

fn is_identifier(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn build_table(rows: &[Vec<Value>], names: Option<&[String]>, color: Color) -> Table {
    let arity = rows.first().map_or(0, Vec::len);
    let labels = names.map_or_else(|| positional_labels(arity), <[String]>::to_vec);

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);

    let mut header = vec![Cell::new("Index").fg(color)];
    header.extend(labels.iter().map(|name| Cell::new(name).fg(color)));
    table.set_header(header);

    for (index, row) in rows.iter().enumerate() {
        let mut cells = vec![index.to_string()];
        cells.extend(row.iter().map(value_text));
        table.add_row(cells);
    }

    table
}

fn json_payload(rows: &[Vec<Value>], names: Option<&[String]>) -> serde_json::Map<String, serde_json::Value> {
    let mut payload = serde_json::Map::new();

    for (index, row) in rows.iter().enumerate() {
        let entry = match names {
            Some(names) => serde_json::Value::Object(
                names
                    .iter()
                    .zip(row)
                    .map(|(name, value)| (name.clone(), value_json(value)))
                    .collect(),
            ),
            None => serde_json::Value::Array(row.iter().map(value_json).collect()),
        };
        payload.insert(index.to_string(), entry);
    }

    payload
}
