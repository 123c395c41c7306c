mod claude;
mod config;
mod confirm;
mod db;
mod format;
mod generate;
mod history;
mod repl;

use anyhow::Result;
use clap::{Parser, Subcommand};
use claude::Client;
use comfy_table::Color;
use db::{SqliteExecutor, TABLE_INFO_HEADERS, TABLE_LIST_HEADERS};
use format::Headers;
use generate::SqlGenerator;
use history::HistoryStore;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sqlitem",
    version,
    about = "Interact with SQLite databases via command-line interface"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List tables contained in the database
    ListTables {
        database: PathBuf,

        /// Stdout results in json format
        #[arg(short, long)]
        json: bool,
    },

    /// List columns for a particular table
    ListColumns {
        database: PathBuf,
        table: String,

        /// Stdout results in json format
        #[arg(short, long)]
        json: bool,
    },

    /// Run sql statements against the database [AUTO-COMMITS]
    Execute {
        database: PathBuf,

        /// Sql statement or prompt
        #[arg(short, long, required = true)]
        sql: Vec<String>,

        /// Generate sql statements from prompts by AI
        #[arg(short = 'i', long)]
        ai: bool,

        /// Stdout results in json format
        #[arg(short, long)]
        json: bool,

        /// Do not stdout results
        #[arg(short, long)]
        quiet: bool,
    },

    /// Execute sql statements interactively
    Interactive {
        database: PathBuf,

        /// Results font color
        #[arg(short, long, default_value = "cyan")]
        color: String,

        /// Stdout results in json format
        #[arg(short, long)]
        json: bool,

        /// Okay to execution of AI generated sql statements
        #[arg(short, long)]
        yes: bool,

        /// Enable auto-commit
        #[arg(short = 'a', long)]
        auto_commit: bool,

        /// Generate sql statements from plain text by AI
        #[arg(short = 'i', long)]
        ai: bool,

        /// Add previous chats with AI to context
        #[arg(short = 'f', long)]
        follow_up: bool,

        /// Stdout prompt text in plain font
        #[arg(long)]
        no_color: bool,

        /// Do not suggest sql statements
        #[arg(long)]
        no_suggestions: bool,

        /// Start a new history thread
        #[arg(long)]
        new_history: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Command::ListTables { database, json } => {
            let db = SqliteExecutor::open(&database, true)?;
            format::render(
                &db.list_tables(),
                Headers::Fixed(TABLE_LIST_HEADERS),
                json,
                Color::Cyan,
            )?;
        }

        Command::ListColumns {
            database,
            table,
            json,
        } => {
            let db = SqliteExecutor::open(&database, true)?;
            format::render(
                &db.list_columns(&table),
                Headers::Fixed(TABLE_INFO_HEADERS),
                json,
                Color::Cyan,
            )?;
        }

        Command::Execute {
            database,
            sql,
            ai,
            json,
            quiet,
        } => {
            let db = SqliteExecutor::open(&database, true)?;

            let statements = if ai {
                let mut generator = SqlGenerator::new(Client::new(&config::api_key()?, false));
                let mut batch = Vec::new();
                for prompt in &sql {
                    batch.extend(generator.generate(&db, prompt).await?);
                }
                batch
            } else {
                sql
            };

            for statement in &statements {
                let outcome = db.execute(statement, true);
                if quiet {
                    continue;
                }
                let rendered = format::render(
                    &outcome,
                    Headers::Infer {
                        sql: statement,
                        db: &db,
                    },
                    json,
                    Color::Cyan,
                );
                if let Err(e) = rendered {
                    repl::report_error(&e);
                }
            }
        }

        Command::Interactive {
            database,
            color,
            json,
            yes,
            auto_commit,
            ai,
            follow_up,
            no_color,
            no_suggestions,
            new_history,
        } => {
            let db = SqliteExecutor::open(&database, auto_commit)?;
            let history = HistoryStore::open(&HistoryStore::default_path(), new_history)?;

            let session = repl::Session::new(
                db,
                history,
                repl::SessionOptions {
                    color: format::parse_color(&color),
                    no_color,
                    json,
                    yes,
                    ai,
                    follow_up,
                },
            );

            repl::run(session, no_suggestions).await?;
        }
    }

    Ok(())
}
