use anyhow::Result;
use crossterm::cursor;
use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use crossterm::terminal;
use std::io::{self, IsTerminal, Write};

/// The bypass flag ("always yes") wins; otherwise confirmation is whatever
/// the dispatch classification forced.
pub fn requires_confirmation(forced: bool, bypass: bool) -> bool {
    forced && !bypass
}

/// Show the literal statement and ask before running it.
pub fn confirm_statement(statement: &str) -> Result<bool> {
    println!("[Exc] - {statement}");
    affirm(&["Run", "Skip"])
}

pub fn confirm_exit() -> Result<bool> {
    println!("Are you sure to exit?");
    affirm(&["Yes", "No"])
}

fn affirm(options: &[&str]) -> Result<bool> {
    if !io::stdin().is_terminal() {
        return prompt_line();
    }
    Ok(matches!(pick_option(options)?, Some(0)))
}

// Piped input cannot drive the raw-mode picker.
fn prompt_line() -> Result<bool> {
    print!("[y/N]: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn pick_option(options: &[&str]) -> Result<Option<usize>> {
    let mut selected: usize = 0;
    let mut stdout = io::stdout();

    terminal::enable_raw_mode()?;

    let draw = |stdout: &mut io::Stdout, sel: usize| -> io::Result<()> {
        for (i, option) in options.iter().enumerate() {
            if i == sel {
                write!(stdout, "\r  \x1b[32m> {option}\x1b[0m\x1b[K\n")?;
            } else {
                write!(stdout, "\r    {option}\x1b[K\n")?;
            }
        }
        Ok(())
    };

    draw(&mut stdout, selected)?;
    crossterm::execute!(stdout, cursor::MoveUp(options.len() as u16))?;
    stdout.flush()?;

    let result = loop {
        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Up | KeyCode::Char('k') => {
                    if selected > 0 {
                        selected -= 1;
                    }
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    if selected < options.len() - 1 {
                        selected += 1;
                    }
                }
                KeyCode::Enter => break Some(selected),
                KeyCode::Esc => break None,
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break None,
                _ => continue,
            }

            draw(&mut stdout, selected)?;
            crossterm::execute!(stdout, cursor::MoveUp(options.len() as u16))?;
            stdout.flush()?;
        }
    };

    terminal::disable_raw_mode()?;
    crossterm::execute!(stdout, cursor::MoveDown(options.len() as u16))?;
    write!(stdout, "\r")?;
    stdout.flush()?;

    Ok(result)
}
