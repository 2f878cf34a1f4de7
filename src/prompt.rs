//! Interactive credential prompt
//!
//! The access id is read as a normal line. The access key is read with the
//! terminal in raw mode so nothing typed is echoed back.

use std::io::{self, BufRead, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use livetail_api::Credentials;

/// Ask for an access id and access key on the terminal
pub fn prompt_credentials() -> io::Result<Credentials> {
    let access_id = read_line("Please enter your Access ID: ")?;
    let access_key = read_secret("Please enter your Access Key: ")?;
    Ok(Credentials::new(access_id.trim(), access_key))
}

fn read_line(prompt: &str) -> io::Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{}", prompt)?;
    stderr.flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "input closed before an Access ID was entered",
        ));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn read_secret(prompt: &str) -> io::Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{}", prompt)?;
    stderr.flush()?;

    let secret = {
        let _raw = RawMode::enable()?;
        collect_secret(event::read)
    };

    // Raw mode swallowed the newline of the Enter key
    writeln!(stderr)?;
    secret
}

/// Keeps the terminal in raw mode until dropped
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        // Best effort cleanup on drop
        let _ = disable_raw_mode();
    }
}

/// Gather key presses up to Enter into a string
fn collect_secret<F>(mut next_event: F) -> io::Result<String>
where
    F: FnMut() -> io::Result<Event>,
{
    let mut secret = String::new();

    loop {
        match next_event()? {
            Event::Key(KeyEvent {
                code,
                modifiers,
                kind,
                ..
            }) => {
                // Filter out release events (important for Windows)
                if kind != KeyEventKind::Press {
                    continue;
                }
                match code {
                    KeyCode::Enter => return Ok(secret),
                    KeyCode::Char('c') | KeyCode::Char('d')
                        if modifiers.contains(KeyModifiers::CONTROL) =>
                    {
                        return Err(io::Error::new(
                            io::ErrorKind::Interrupted,
                            "Access Key entry cancelled",
                        ));
                    }
                    KeyCode::Backspace => {
                        secret.pop();
                    }
                    KeyCode::Char(c) => secret.push(c),
                    _ => {}
                }
            }
            Event::Paste(text) => secret.push_str(text.trim_end_matches(['\r', '\n'])),
            _ => {}
        }
    }
}
