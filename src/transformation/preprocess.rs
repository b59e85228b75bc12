//! Statement preprocessing.
//!
//! Strips comments, decides whether a statement needs to reach the warehouse
//! at all and shortens long statements for log lines and error messages.

use sqlparser::dialect::SnowflakeDialect;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use tracing::debug;

/// Statements longer than this many characters are excerpted.
const EXCERPT_THRESHOLD: usize = 1000;

/// Characters kept from each end of an excerpted statement.
const EXCERPT_EDGE: usize = 500;

/// A statement ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    /// Comment-free, trimmed statement text; logged, executed and quoted in errors.
    pub text: String,
    /// False for empty statements and for `SELECT` statements, which cannot change state.
    pub should_execute: bool,
}

/// Prepares a raw statement from a script.
pub fn preprocess(raw: &str) -> Prepared {
    let text = strip_comments(raw).trim().to_string();
    let should_execute = !text.is_empty() && !starts_with_select(&text);
    Prepared {
        text,
        should_execute,
    }
}

fn starts_with_select(text: &str) -> bool {
    text.get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("SELECT"))
}

/// Removes `--`, `//` and `/* */` comments, leaving string literals,
/// quoted identifiers and `scheme://` locations alone. Text that cannot be tokenized is returned as is
/// and left for the warehouse to reject.
pub fn strip_comments(sql: &str) -> String {
    let dialect = SnowflakeDialect {};
    let tokens = match Tokenizer::new(&dialect, sql).with_unescape(false).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            debug!("Could not tokenize statement, keeping comments: {}", e);
            return sql.to_string();
        }
    };

    if !tokens.iter().any(is_comment) {
        return sql.to_string();
    }

    let mut stripped = String::with_capacity(sql.len());
    for token in &tokens {
        match token {
            // `//` right after a colon belongs to a URL such as `file:///tmp/x.csv`.
            Token::Whitespace(Whitespace::SingleLineComment { prefix, .. })
                if prefix == "//" && stripped.ends_with(':') =>
            {
                stripped.push_str(&token.to_string())
            }
            // A line comment swallows its newline; keep the line break.
            Token::Whitespace(Whitespace::SingleLineComment { comment, .. }) => {
                if comment.ends_with('\n') {
                    stripped.push('\n');
                }
            }
            Token::Whitespace(Whitespace::MultiLineComment(_)) => stripped.push(' '),
            other => stripped.push_str(&other.to_string()),
        }
    }
    stripped
}

fn is_comment(token: &Token) -> bool {
    matches!(
        token,
        Token::Whitespace(Whitespace::SingleLineComment { .. })
            | Token::Whitespace(Whitespace::MultiLineComment(_))
    )
}

/// Shortens a statement to its first and last 500 characters.
pub fn excerpt(query: &str) -> String {
    let length = query.chars().count();
    if length <= EXCERPT_THRESHOLD {
        return query.to_string();
    }

    let head: String = query.chars().take(EXCERPT_EDGE).collect();
    let tail: String = query.chars().skip(length - EXCERPT_EDGE).collect();
    format!("{head}\n...\n{tail}")
}
