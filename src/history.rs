use anyhow::{Context as _, Result};
use rustyline::completion::Completer;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only statement log, persisted one statement per line.
#[derive(Clone)]
pub struct HistoryStore {
    path: PathBuf,
    entries: Vec<String>,
}

impl HistoryStore {
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .map(|p| p.join("sqlitem").join("history.txt"))
            .unwrap_or_else(|| PathBuf::from(".sqlitem-history.txt"))
    }

    pub fn open(path: &Path, new_thread: bool) -> Result<Self> {
        if new_thread && path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("failed to clear history file: {}", path.display()))?;
            tracing::info!("started a new history thread");
        }

        let entries = match std::fs::read_to_string(path) {
            Ok(contents) => contents
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => Vec::new(),
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn append(&mut self, statement: &str) -> Result<()> {
        let statement = statement.trim();
        if statement.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to write history file: {}", self.path.display()))?;
        writeln!(file, "{statement}")?;

        self.entries.push(statement.to_string());
        Ok(())
    }

    pub fn all(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `n = 1` is the most recent entry.
    pub fn nth_from_end(&self, n: usize) -> Option<&str> {
        if n == 0 || n > self.entries.len() {
            return None;
        }
        self.entries.get(self.entries.len() - n).map(String::as_str)
    }

    /// Prefix matches, deduplicated, most recent first.
    pub fn suggestions(&self, prefix: &str) -> Vec<String> {
        let mut seen = Vec::new();
        for entry in self.entries.iter().rev() {
            if entry.starts_with(prefix) && !seen.contains(entry) {
                seen.push(entry.clone());
            }
        }
        seen
    }
}

/// Line completion for the interactive session. Works entirely from
/// snapshots (a clone of the history store, table and column names captured
/// at session start): the completer runs during the blocking read and must
/// never touch the live connection.
pub struct SessionHelper {
    history: HistoryStore,
    tables: Vec<String>,
    columns: HashMap<String, Vec<String>>,
    enabled: bool,
}

impl SessionHelper {
    pub fn new(
        history: HistoryStore,
        tables: Vec<String>,
        columns: HashMap<String, Vec<String>>,
        enabled: bool,
    ) -> Self {
        Self {
            history,
            tables,
            columns,
            enabled,
        }
    }

    pub fn sync_history(&mut self, entries: &[String]) {
        self.history.entries = entries.to_vec();
    }

    fn candidates(&self, text: &str) -> Vec<String> {
        if !self.enabled {
            return Vec::new();
        }

        let mut out = Vec::new();
        let processed = text.trim_end().to_lowercase();

        if processed.ends_with("from") {
            for table in &self.tables {
                out.push(format!("{text} {table}"));
            }
        } else if processed.ends_with("where") {
            if let Some(columns) = self.target_columns(text) {
                for column in columns {
                    out.push(format!("{text} {column}"));
                }
            }
        }

        out.extend(self.history.suggestions(text));
        out
    }

    /// Columns of the table named after `from` in the line, if we know it.
    fn target_columns(&self, text: &str) -> Option<&Vec<String>> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let from_ix = tokens.iter().position(|t| t.eq_ignore_ascii_case("from"))?;
        let table = tokens.get(from_ix + 1)?;
        let table = self.tables.iter().find(|t| t.as_str() == *table)?;
        self.columns.get(table)
    }
}

impl Completer for SessionHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        Ok((0, self.candidates(&line[..pos])))
    }
}

impl Hinter for SessionHelper {
    type Hint = String;
}

impl Highlighter for SessionHelper {}
impl Validator for SessionHelper {}
impl Helper for SessionHelper {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_persists_across_opens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.txt");

        let mut history = HistoryStore::open(&path, false).unwrap();
        history.append("SELECT 1").unwrap();
        history.append("SELECT 2").unwrap();

        let reopened = HistoryStore::open(&path, false).unwrap();
        assert_eq!(reopened.all(), &["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn new_thread_clears_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.txt");

        let mut history = HistoryStore::open(&path, false).unwrap();
        history.append("SELECT 1").unwrap();

        let fresh = HistoryStore::open(&path, true).unwrap();
        assert_eq!(fresh.len(), 0);
    }

    #[test]
    fn nth_from_end_counts_backwards() {
        let dir = tempdir().unwrap();
        let mut history = HistoryStore::open(&dir.path().join("h"), false).unwrap();
        history.append("first").unwrap();
        history.append("second").unwrap();

        assert_eq!(history.nth_from_end(1), Some("second"));
        assert_eq!(history.nth_from_end(2), Some("first"));
        assert_eq!(history.nth_from_end(3), None);
        assert_eq!(history.nth_from_end(0), None);
    }

    #[test]
    fn suggestions_deduplicate_most_recent_first() {
        let dir = tempdir().unwrap();
        let mut history = HistoryStore::open(&dir.path().join("h"), false).unwrap();
        for stmt in ["SELECT a", "SELECT b", "SELECT a", "INSERT c"] {
            history.append(stmt).unwrap();
        }

        assert_eq!(history.suggestions("SELECT"), &["SELECT a", "SELECT b"]);
        assert!(history.suggestions("DROP").is_empty());
    }

    #[test]
    fn blank_statements_are_not_recorded() {
        let dir = tempdir().unwrap();
        let mut history = HistoryStore::open(&dir.path().join("h"), false).unwrap();
        history.append("   ").unwrap();
        assert_eq!(history.len(), 0);
    }

    fn store_with(dir: &tempfile::TempDir, entries: &[&str]) -> HistoryStore {
        let mut history = HistoryStore::open(&dir.path().join("h"), false).unwrap();
        for entry in entries {
            history.append(entry).unwrap();
        }
        history
    }

    #[test]
    fn completer_suggests_tables_after_from() {
        let dir = tempdir().unwrap();
        let helper = SessionHelper::new(
            store_with(&dir, &["SELECT * FROM linux"]),
            vec!["linux".to_string(), "bsd".to_string()],
            HashMap::new(),
            true,
        );

        let candidates = helper.candidates("SELECT * FROM");
        assert!(candidates.contains(&"SELECT * FROM linux".to_string()));
        assert!(candidates.contains(&"SELECT * FROM bsd".to_string()));
    }

    #[test]
    fn completer_suggests_columns_after_where() {
        let dir = tempdir().unwrap();
        let mut columns = HashMap::new();
        columns.insert("linux".to_string(), vec!["distro".to_string()]);
        let helper = SessionHelper::new(
            store_with(&dir, &[]),
            vec!["linux".to_string()],
            columns,
            true,
        );

        let candidates = helper.candidates("SELECT * FROM linux WHERE");
        assert_eq!(candidates, vec!["SELECT * FROM linux WHERE distro".to_string()]);
    }

    #[test]
    fn disabled_completer_stays_quiet() {
        let dir = tempdir().unwrap();
        let helper = SessionHelper::new(
            store_with(&dir, &["SELECT 1"]),
            vec!["linux".to_string()],
            HashMap::new(),
            false,
        );
        assert!(helper.candidates("SELECT").is_empty());
    }
}
