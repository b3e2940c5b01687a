//! Error types for the AML pipeline
//!
//! Lexing, parsing and linking return `Result<T, Error>`. Semantic
//! validation never fails; its findings are data (see `validator`).

use crate::parser::tokenizer::Span;

/// AML pipeline error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No token pattern matches at the current position
    #[error("Lex error: unexpected character '{character}' at offset {} ({span})", span.offset)]
    LexError { character: char, span: Span },

    /// Grammar violation; parsing stops at the first one
    #[error("Syntax error: {message}")]
    SyntaxError { message: String, span: Option<Span> },

    /// A brick reference could not be resolved during linking
    #[error("Undefined brick")]
    UndefinedBrick,

    /// A state reference could not be resolved during linking
    #[error("Undefined state")]
    UndefinedState,

    /// A hand-built parse tree lacks a node the builder requires
    #[error("Malformed parse tree: {0}")]
    MalformedTree(String),
}

impl Error {
    /// Source position of a lex or syntax error, if known
    pub fn span(&self) -> Option<&Span> {
        match self {
            Error::LexError { span, .. } => Some(span),
            Error::SyntaxError { span, .. } => span.as_ref(),
            Error::UndefinedBrick | Error::UndefinedState | Error::MalformedTree(_) => None,
        }
    }

    /// True for link-phase failures (`UndefinedBrick`, `UndefinedState`)
    pub fn is_link_error(&self) -> bool {
        matches!(self, Error::UndefinedBrick | Error::UndefinedState)
    }
}

/// Result type alias for AML operations
pub type Result<T> = std::result::Result<T, Error>;
