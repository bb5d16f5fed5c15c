//! Command-line word splitting for transport specifications.
//!
//! The `transport-cmd` and `remote-cmd` options accept a single string in
//! shell-like notation: whitespace separates words unless protected by
//! single or double quotes; single quotes inhibit all escaping; outside
//! single quotes a backslash escapes the following character; inside double
//! quotes it only escapes `"`, `\`, and `$`.

use thiserror::Error;

/// Errors produced while splitting a command specification.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum CommandParseError {
    /// The specification contained no words at all.
    #[error("empty command specification")]
    Empty,
    /// A quote was opened but never closed.
    #[error("unterminated {0} quote in command specification")]
    UnterminatedQuote(char),
    /// The specification ended in the middle of a backslash escape.
    #[error("trailing backslash in command specification")]
    TrailingEscape,
}

/// Splits `spec` into words with shell-style quoting.
///
/// # Errors
///
/// Returns an error for empty input, unterminated quotes, or a trailing
/// escape.
pub fn split_command(spec: &str) -> Result<Vec<String>, CommandParseError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = spec.chars();

    while let Some(ch) = chars.next() {
        match ch {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(CommandParseError::UnterminatedQuote('\'')),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$')) => current.push(c),
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err(CommandParseError::TrailingEscape),
                        },
                        Some(c) => current.push(c),
                        None => return Err(CommandParseError::UnterminatedQuote('"')),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(c) => current.push(c),
                    None => return Err(CommandParseError::TrailingEscape),
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    if words.is_empty() {
        return Err(CommandParseError::Empty);
    }
    Ok(words)
}
