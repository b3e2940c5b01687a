//! AML Tokenizer — converts chained-declaration text into a token stream
//!
//! Handles: reserved method names (keywords), signal literals, quoted names,
//! pin numbers, and the `.` `(` `)` `,` punctuation of the chained-call form.
//! Whitespace, `\` line continuations and `#` comments are discarded.
//!
//! There is no generic identifier token: a bare word that is neither a
//! keyword nor a signal matches no pattern and is a lex error. This is what
//! rejects misspelled methods (`.states(`) and lowercase signals (`low`).
//!
//! Guarantees:
//! - Deterministic: same input always produces same token stream
//! - Fail-fast: the first unmatched character aborts tokenization

use serde::Serialize;

use crate::{Error, Result};

/// Reserved method names of the chained-declaration form
pub const KEYWORDS: &[&str] = &[
    "AppBuilder",
    "get_contents",
    "sensor",
    "actuator",
    "on_pin",
    "state",
    "set",
    "to",
    "when",
    "has_value",
    "go_to_state",
    "when_all",
    "when_any",
    "when_condition",
    "all",
    "any",
    "not",
];

/// The only valid signal literals
pub const SIGNALS: &[&str] = &["HIGH", "LOW"];

/// Token categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    Keyword,
    Signal,
    /// Quoted name; the lexeme excludes the quotes
    String,
    Number,
    Dot,
    LParen,
    RParen,
    Comma,
    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            TokenKind::Keyword => "keyword",
            TokenKind::Signal => "signal",
            TokenKind::String => "string",
            TokenKind::Number => "number",
            TokenKind::Dot => "'.'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::Comma => "','",
            TokenKind::Eof => "end of input",
        };
        f.write_str(name)
    }
}

/// Position in source text for error reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Span {
    pub line: usize,
    pub column: usize,
    /// Byte offset into the source
    pub offset: usize,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A token with its source text and position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.kind {
            TokenKind::Keyword | TokenKind::Signal | TokenKind::Number => {
                write!(f, "{} '{}'", self.kind, self.lexeme)
            }
            TokenKind::String => write!(f, "string \"{}\"", self.lexeme),
            _ => write!(f, "{}", self.kind),
        }
    }
}

/// Tokenizer for AML source text
pub struct Tokenizer<'a> {
    source: &'a str,
    input: Vec<(usize, char)>,
    position: usize,
    line: usize,
    column: usize,
}

impl<'a> Tokenizer<'a> {
    /// Create a new tokenizer for the given input text
    pub fn new(text: &'a str) -> Self {
        Tokenizer {
            source: text,
            input: text.char_indices().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the entire input; the last token is always `Eof`
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments();

            let Some(ch) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    lexeme: String::new(),
                    span: self.current_span(),
                });
                break;
            };

            tokens.push(self.next_token(ch)?);
        }

        tracing::trace!(count = tokens.len(), "tokenized input");
        Ok(tokens)
    }

    // ── Character helpers ──────────────────────────────────

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).map(|&(_, c)| c)
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).map(|&(_, c)| c)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek();
        if let Some(c) = ch {
            self.position += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        ch
    }

    fn byte_offset(&self) -> usize {
        self.input
            .get(self.position)
            .map(|&(offset, _)| offset)
            .unwrap_or(self.source.len())
    }

    fn current_span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
            offset: self.byte_offset(),
        }
    }

    fn error_at(&self, character: char, span: Span) -> Error {
        Error::LexError { character, span }
    }

    // ── Whitespace & Comments ──────────────────────────────

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(ch) if ch.is_whitespace() => {
                    self.advance();
                }
                // Line continuation carried over from the chained-call form
                Some('\\') if self.continuation_follows() => {
                    self.advance();
                }
                Some('#') => {
                    while let Some(ch) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn continuation_follows(&self) -> bool {
        match self.peek_ahead(1) {
            Some('\n') | None => true,
            Some('\r') => self.peek_ahead(2) == Some('\n'),
            _ => false,
        }
    }

    // ── Main dispatch ──────────────────────────────────────

    fn next_token(&mut self, ch: char) -> Result<Token> {
        let span = self.current_span();

        let punct = match ch {
            '.' => Some(TokenKind::Dot),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            ',' => Some(TokenKind::Comma),
            _ => None,
        };
        if let Some(kind) = punct {
            self.advance();
            return Ok(Token {
                kind,
                lexeme: ch.to_string(),
                span,
            });
        }

        match ch {
            '"' => self.read_string(span),
            c if c.is_ascii_digit() => self.read_number(span),
            c if c.is_ascii_alphabetic() || c == '_' => self.read_word(span),
            _ => Err(self.error_at(ch, span)),
        }
    }

    // ── Quoted names ───────────────────────────────────────

    fn read_string(&mut self, span: Span) -> Result<Token> {
        let start = self.position;
        self.advance(); // opening "

        loop {
            match self.peek() {
                Some('"') => break,
                Some('\n') | None => {
                    // Unterminated: no pattern matches at the opening quote
                    return Err(self.error_at('"', span));
                }
                Some(_) => {
                    self.advance();
                }
            }
        }

        let value: String = self.input[start + 1..self.position]
            .iter()
            .map(|&(_, c)| c)
            .collect();
        self.advance(); // closing "

        Ok(Token {
            kind: TokenKind::String,
            lexeme: value,
            span,
        })
    }

    // ── Pin numbers ────────────────────────────────────────

    fn read_number(&mut self, span: Span) -> Result<Token> {
        let start = self.position;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let text: String = self.input[start..self.position]
            .iter()
            .map(|&(_, c)| c)
            .collect();

        if text.parse::<u32>().is_err() {
            let first = text.chars().next().unwrap_or('0');
            return Err(self.error_at(first, span));
        }

        Ok(Token {
            kind: TokenKind::Number,
            lexeme: text,
            span,
        })
    }

    // ── Keywords & Signals ─────────────────────────────────

    fn read_word(&mut self, span: Span) -> Result<Token> {
        let start = self.position;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.advance();
        }
        let text: String = self.input[start..self.position]
            .iter()
            .map(|&(_, c)| c)
            .collect();

        // Keyword set is tried before the signal set
        let kind = if KEYWORDS.contains(&text.as_str()) {
            TokenKind::Keyword
        } else if SIGNALS.contains(&text.as_str()) {
            TokenKind::Signal
        } else {
            let first = text.chars().next().unwrap_or('_');
            return Err(self.error_at(first, span));
        };

        Ok(Token {
            kind,
            lexeme: text,
            span,
        })
    }
}

/// Tokenize `source` in one call
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Tokenizer::new(source).tokenize()
}
