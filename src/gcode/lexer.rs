//! Tokenizer for command text.
//!
//! A token is either a letter followed by an optional sign and a run of
//! digits/decimal points (`G1`, `X-10.5`), or a double-quoted string
//! (`"scan a"`). Input is folded to uppercase before matching, and anything
//! the pattern does not cover is skipped rather than rejected.

use std::sync::LazyLock;

use regex::Regex;

static TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[A-Z]-?[0-9.]+|"[\w ]*""#).expect("token pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A field letter and its raw value text, e.g. `X` and `-10.5`.
    Field { letter: char, value: String },
    /// The contents of a double-quoted string, quotes stripped.
    Quoted(String),
}

/// One-shot token stream over a piece of command text.
pub struct Lexer {
    upper: String,
    pos: usize,
}

impl Lexer {
    pub fn new(src: &str) -> Self {
        Self {
            upper: src.to_uppercase(),
            pos: 0,
        }
    }
}

impl Iterator for Lexer {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        let matched = TOKEN_PATTERN.find_at(&self.upper, self.pos)?;
        self.pos = matched.end();
        let text = matched.as_str();
        if let Some(inner) = text.strip_prefix('"') {
            let inner = inner.strip_suffix('"').unwrap_or(inner);
            Some(Token::Quoted(inner.to_string()))
        } else {
            let mut chars = text.chars();
            let letter = chars.next()?;
            Some(Token::Field {
                letter,
                value: chars.as_str().to_string(),
            })
        }
    }
}
