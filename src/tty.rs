//! Terminal I/O utilities for CLI.
//!
//! Provides TTY detection and the operator confirmation gate.

use std::io::{self, BufRead, IsTerminal, Write};

use capstan::lifecycle::Confirmation;

pub fn is_stdin_tty() -> bool {
    io::stdin().is_terminal()
}

pub fn prompt(message: &str) -> capstan::Result<String> {
    eprint!("{}", message);
    io::stderr().flush().ok();

    let stdin = io::stdin();
    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .map_err(|e| capstan::Error::internal_io(e.to_string(), Some("read stdin".to_string())))?;

    Ok(line.trim().to_string())
}

/// Print status message to stderr if running in a terminal.
pub fn status(message: &str) {
    if io::stderr().is_terminal() {
        eprintln!("{}", message);
    }
}

/// Asks the operator on the terminal. Anything but `n`/`no` confirms.
pub struct TerminalConfirmation;

impl Confirmation for TerminalConfirmation {
    fn confirm(&self, message: &str) -> capstan::Result<bool> {
        if !is_stdin_tty() {
            return Err(capstan::Error::validation_invalid_argument(
                "tty",
                "Waiting before refreshing requires an interactive TTY",
                None,
                None,
            )
            .with_hint("Drop --wait-before-refreshing or run capstan from a terminal"));
        }

        let answer = prompt(&format!("{} [Y/n] ", message))?;
        Ok(is_confirmation(&answer))
    }
}

fn is_confirmation(answer: &str) -> bool {
    !matches!(answer.to_ascii_lowercase().as_str(), "n" | "no")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_key_but_no_confirms() {
        assert!(is_confirmation(""));
        assert!(is_confirmation("y"));
        assert!(is_confirmation("go"));
        assert!(!is_confirmation("n"));
        assert!(!is_confirmation("No"));
    }
}
