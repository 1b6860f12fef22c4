// crates/change-gate-core/src/runtime/script.rs
// ============================================================================
// Module: SQL Script Splitter
// Description: Splits a changeset script into individual statements.
// Purpose: Execute scripts one statement at a time.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Statements end at `;` outside of quotes and comments. `--` line comments
//! and `/* */` block comments are dropped. Single quotes, double quotes, and
//! backticks are honored, including doubled-quote escapes. Empty statements
//! are discarded.
//!
//! Compound statements with inner semicolons (for example trigger bodies)
//! are not recognized and will be split.

// ============================================================================
// SECTION: Splitting
// ============================================================================

/// Lexer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Plain SQL.
    Code,
    /// Inside a quoted literal or identifier.
    Quoted(char),
    /// Inside a `--` comment.
    LineComment,
    /// Inside a `/* */` comment.
    BlockComment,
}

/// Splits `script` into trimmed, non-empty statements without the trailing `;`.
#[must_use]
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = State::Code;
    let mut chars = script.chars().peekable();

    while let Some(ch) = chars.next() {
        match state {
            State::Code => match ch {
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment;
                }
                '\'' | '"' | '`' => {
                    current.push(ch);
                    state = State::Quoted(ch);
                }
                ';' => push_statement(&mut statements, &mut current),
                _ => current.push(ch),
            },
            State::Quoted(quote) => {
                current.push(ch);
                if ch == quote {
                    if chars.peek() == Some(&quote) {
                        if let Some(escaped) = chars.next() {
                            current.push(escaped);
                        }
                    } else {
                        state = State::Code;
                    }
                }
            }
            State::LineComment => {
                if ch == '\n' {
                    current.push('\n');
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    current.push(' ');
                    state = State::Code;
                }
            }
        }
    }
    push_statement(&mut statements, &mut current);
    statements
}

/// Moves the buffered statement into the output when non-empty.
fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
    current.clear();
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_semicolons_outside_literals() {
        let script = "-- id: 1\nCREATE TABLE t (v TEXT);\nINSERT INTO t VALUES ('a;b');\n";
        assert_eq!(
            split_statements(script),
            vec!["CREATE TABLE t (v TEXT)".to_string(), "INSERT INTO t VALUES ('a;b')".to_string()]
        );
    }

    #[test]
    fn doubled_quotes_stay_inside_literal() {
        let script = "INSERT INTO t VALUES ('it''s; fine'); /* x; y */ SELECT 1;";
        assert_eq!(
            split_statements(script),
            vec!["INSERT INTO t VALUES ('it''s; fine')".to_string(), "SELECT 1".to_string()]
        );
    }

    #[test]
    fn comment_only_script_is_empty() {
        assert!(split_statements("-- nothing here;\n/* ; */\n;;").is_empty());
    }
}
