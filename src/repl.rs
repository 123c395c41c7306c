use crate::claude::Client;
use crate::config;
use crate::confirm;
use crate::db::{SqliteExecutor, SCHEMA_HEADERS, TABLE_INFO_HEADERS, TABLE_LIST_HEADERS};
use crate::format::{self, Headers};
use crate::generate::SqlGenerator;
use crate::history::{HistoryStore, SessionHelper};
use anyhow::Result;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::collections::HashMap;
use std::io::{self, Write};
use std::time::{Duration, Instant};
use thiserror::Error;

const CYAN: &str = "\x1b[36m";
const MAGENTA: &str = "\x1b[35m";
const BLUE: &str = "\x1b[34m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("index out of range, history holds {0} statements")]
    OutOfRange(usize),
    #[error("AI backend unavailable: {0}")]
    GenerationUnavailable(String),
}

#[derive(Clone, Copy)]
enum Builtin {
    Tables,
    Columns,
    Schema,
    Clear,
    Help,
    Sys,
    Sql,
    Ai,
    Reset,
    Exit,
}

struct CommandSpec {
    name: &'static str,
    builtin: Builtin,
    about: &'static str,
}

// Built once, matched before classification. An unmatched line falls through
// to the default statement path.
const REGISTRY: &[CommandSpec] = &[
    CommandSpec {
        name: "tables",
        builtin: Builtin::Tables,
        about: "Show database tables",
    },
    CommandSpec {
        name: "columns",
        builtin: Builtin::Columns,
        about: "Show columns of a table: columns <table-name>",
    },
    CommandSpec {
        name: "schema",
        builtin: Builtin::Schema,
        about: "Show database schema",
    },
    CommandSpec {
        name: "clear",
        builtin: Builtin::Clear,
        about: "Clear console",
    },
    CommandSpec {
        name: "help",
        builtin: Builtin::Help,
        about: "Show help info in tabular form",
    },
    CommandSpec {
        name: "h",
        builtin: Builtin::Help,
        about: "Show help info in tabular form",
    },
    CommandSpec {
        name: "sys",
        builtin: Builtin::Sys,
        about: "Execute a system command: sys <command> (shortcut ./<command>)",
    },
    CommandSpec {
        name: "sql",
        builtin: Builtin::Sql,
        about: "Execute a sql statement: sql <statement> (shortcut /sql)",
    },
    CommandSpec {
        name: "ai",
        builtin: Builtin::Ai,
        about: "Generate sql statements with AI and execute: ai <request> (shortcut /ai)",
    },
    CommandSpec {
        name: "reset",
        builtin: Builtin::Reset,
        about: "Start a new conversation thread with AI",
    },
    CommandSpec {
        name: "exit",
        builtin: Builtin::Exit,
        about: "Quit this program",
    },
];

fn lookup(name: &str) -> Option<Builtin> {
    REGISTRY
        .iter()
        .find(|spec| spec.name == name)
        .map(|spec| spec.builtin)
}

pub fn report_error(err: &anyhow::Error) {
    eprintln!("{RED}> Error - {err}{RESET}");
}

pub struct SessionOptions {
    pub color: Color,
    pub no_color: bool,
    pub json: bool,
    pub yes: bool,
    pub ai: bool,
    pub follow_up: bool,
}

pub struct Session {
    db: SqliteExecutor,
    history: HistoryStore,
    generator: Option<SqlGenerator<Client>>,
    opts: SessionOptions,
    ai_mode: bool,
    started: Instant,
    command_started: Instant,
    command_ended: Instant,
}

impl Session {
    pub fn new(db: SqliteExecutor, history: HistoryStore, opts: SessionOptions) -> Self {
        let now = Instant::now();
        let ai_mode = opts.ai;
        Self {
            db,
            history,
            generator: None,
            opts,
            ai_mode,
            started: now,
            command_started: now,
            command_ended: now,
        }
    }

    /// Handle one input line. Returns true only when the session should end.
    /// Errors from here are reported at the read loop and never fatal.
    pub async fn dispatch(&mut self, line: &str) -> Result<bool> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(false);
        }

        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };

        if let Some(builtin) = lookup(head) {
            return self.run_builtin(builtin, rest).await;
        }

        self.run_line(line).await?;
        Ok(false)
    }

    async fn run_builtin(&mut self, builtin: Builtin, rest: &str) -> Result<bool> {
        match builtin {
            Builtin::Tables => self.show(self.db.list_tables(), TABLE_LIST_HEADERS)?,
            Builtin::Columns => {
                if rest.is_empty() {
                    println!("Table name is required.");
                } else {
                    self.show(self.db.list_columns(rest), TABLE_INFO_HEADERS)?;
                }
            }
            Builtin::Schema => self.show(self.db.dump_schema(), SCHEMA_HEADERS)?,
            Builtin::Clear => {
                print!("\x1b[2J\x1b[1;1H");
                io::stdout().flush()?;
            }
            Builtin::Help => self.print_help(),
            Builtin::Sys => self.run_shell(rest)?,
            Builtin::Sql => self.execute_batch(&[rest.to_string()], false)?,
            Builtin::Ai => {
                let batch = self.generate(rest).await?;
                self.execute_batch(&batch, true)?;
            }
            Builtin::Reset => match self.generator.as_mut() {
                Some(generator) => generator.reset(),
                None => println!("You haven't chatted with the AI yet."),
            },
            Builtin::Exit => {
                if confirm::confirm_exit()? {
                    println!("Okay, goodbye!");
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Classification for lines that are not built-in commands, in priority
    /// order: shell escape, history repeat, raw marker, AI marker, implicit
    /// AI mode, raw statement.
    async fn run_line(&mut self, line: &str) -> Result<()> {
        if let Some(command) = line.strip_prefix("./") {
            return self.run_shell(command.trim());
        }

        let mut line = line.to_string();
        let mut forced = false;

        if line.starts_with('!') {
            let n = line.chars().take_while(|c| *c == '!').count();
            line = self
                .history
                .nth_from_end(n)
                .ok_or(SessionError::OutOfRange(self.history.len()))?
                .to_string();
            forced = true;
        }

        let (batch, forced) = if let Some(rest) = line.strip_prefix("/sql") {
            (vec![rest.trim().to_string()], forced)
        } else if let Some(rest) = line.strip_prefix("/ai") {
            (self.generate(rest.trim()).await?, true)
        } else if self.ai_mode {
            (self.generate(&line).await?, true)
        } else {
            (vec![line], forced)
        };

        self.execute_batch(&batch, forced)
    }

    /// Run a batch in order, each statement gated independently. A declined
    /// statement is skipped: not executed, not recorded. A failed statement
    /// is reported and the batch moves on.
    fn execute_batch(&mut self, batch: &[String], forced: bool) -> Result<()> {
        self.command_started = Instant::now();

        for statement in batch {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }

            if confirm::requires_confirmation(forced, self.opts.yes)
                && !confirm::confirm_statement(statement)?
            {
                continue;
            }

            let outcome = self.db.execute(statement, false);
            self.history.append(statement)?;

            let rendered = format::render(
                &outcome,
                Headers::Infer {
                    sql: statement,
                    db: &self.db,
                },
                self.opts.json,
                self.opts.color,
            );
            if let Err(e) = rendered {
                report_error(&e);
            }
        }

        self.command_ended = Instant::now();
        Ok(())
    }

    async fn generate(&mut self, request: &str) -> Result<Vec<String>> {
        if self.generator.is_none() {
            let key = match config::api_key() {
                Ok(key) => key,
                Err(e) => {
                    // implicit AI mode stays off until an explicit retry
                    self.ai_mode = false;
                    return Err(SessionError::GenerationUnavailable(e.to_string()).into());
                }
            };
            self.generator = Some(SqlGenerator::new(Client::new(&key, self.opts.follow_up)));
            self.ai_mode = self.opts.ai;
        }

        let db = &self.db;
        match self.generator.as_mut() {
            Some(generator) => generator.generate(db, request).await,
            None => Err(SessionError::GenerationUnavailable("not initialized".into()).into()),
        }
    }

    fn show(&self, outcome: crate::db::ExecOutcome, headers: &[&str]) -> Result<()> {
        format::render(
            &outcome,
            Headers::Fixed(headers),
            self.opts.json,
            self.opts.color,
        )
    }

    fn run_shell(&self, command: &str) -> Result<()> {
        if command.is_empty() {
            return Ok(());
        }
        std::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()?;
        Ok(())
    }

    fn print_help(&self) {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec![
            Cell::new("No.").fg(self.opts.color),
            Cell::new("Command").fg(self.opts.color),
            Cell::new("Function").fg(self.opts.color),
        ]);

        for (i, spec) in REGISTRY.iter().enumerate() {
            table.add_row(vec![(i + 1).to_string(), spec.name.to_string(), spec.about.to_string()]);
        }
        table.add_row(vec![
            (REGISTRY.len() + 1).to_string(),
            "default".to_string(),
            "Run the line as a sql statement (translated first when AI mode is on)".to_string(),
        ]);

        println!("{table}");
    }

    fn prompt_line(&self) -> String {
        let user = std::env::var("USER").unwrap_or_else(|_| "user".to_string());
        let clock = chrono::Local::now().format("%H:%M:%S");
        let uptime = format_hms(self.started.elapsed());
        let last = format!(
            "{:.1}",
            self.command_ended
                .duration_since(self.command_started)
                .as_secs_f32()
        );

        if self.opts.no_color {
            format!(
                "╭─[{user}@localhost]({})~[🕒{clock}-💻{uptime}-⚡{last}s]",
                self.db.path
            )
        } else {
            format!(
                "╭─[{CYAN}{user}@localhost{RESET}]({MAGENTA}{}{RESET})~[🕒{BLUE}{clock}{RESET}-💻{RED}{uptime}{RESET}-⚡{YELLOW}{last}s{RESET}]",
                self.db.path
            )
        }
    }
}

fn format_hms(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

pub async fn run(mut session: Session, no_suggestions: bool) -> Result<()> {
    let mut rl: Editor<SessionHelper, DefaultHistory> = Editor::new()?;

    // Completion works from a snapshot: the connection belongs to the
    // dispatch loop alone.
    let tables = session.db.table_names();
    let mut columns = HashMap::new();
    for table in &tables {
        if let Some(names) = session.db.column_names(table) {
            columns.insert(table.clone(), names);
        }
    }
    rl.set_helper(Some(SessionHelper::new(
        session.history.clone(),
        tables,
        columns,
        !no_suggestions,
    )));

    for entry in session.history.all() {
        let _ = rl.add_history_entry(entry);
    }

    println!("Welcome to the interactive sqlitem session.");
    println!("Run help or h for usage info.");
    println!("Use '!' to re-run previous statements.");
    println!();

    loop {
        println!("{}", session.prompt_line());
        match rl.readline("╰─> ") {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);

                match session.dispatch(&line).await {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(e) => report_error(&e),
                }

                if let Some(helper) = rl.helper_mut() {
                    helper.sync_history(session.history.all());
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {err:?}");
                break;
            }
        }
    }

    Ok(())
}
