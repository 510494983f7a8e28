use crate::value_objects::mark::Mark;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("undefined alias '*{name}' at line {line}, column {column}")]
    UndefinedAlias {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("duplicate anchor '&{name}' at line {line} (first defined at line {first_line})")]
    DuplicateAnchor {
        name: String,
        line: usize,
        first_line: usize,
    },

    #[error("duplicate key '{key}' at line {line} (first defined at line {first_line})")]
    DuplicateKey {
        key: String,
        line: usize,
        first_line: usize,
    },

    #[error("recursive alias '*{name}' at line {line}, column {column}: anchor is still being defined")]
    RecursiveAlias {
        name: String,
        line: usize,
        column: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    Syntax,
    UndefinedAlias,
    DuplicateAnchor,
    DuplicateKey,
    RecursiveAlias,
}

impl ParseErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseErrorKind::Syntax => "syntax",
            ParseErrorKind::UndefinedAlias => "undefined_alias",
            ParseErrorKind::DuplicateAnchor => "duplicate_anchor",
            ParseErrorKind::DuplicateKey => "duplicate_key",
            ParseErrorKind::RecursiveAlias => "recursive_alias",
        }
    }
}

impl ParseError {
    pub(crate) fn syntax(message: impl Into<String>, mark: Mark) -> Self {
        ParseError::Syntax {
            message: message.into(),
            line: mark.line,
            column: mark.column,
        }
    }

    pub fn kind(&self) -> ParseErrorKind {
        match self {
            ParseError::Syntax { .. } => ParseErrorKind::Syntax,
            ParseError::UndefinedAlias { .. } => ParseErrorKind::UndefinedAlias,
            ParseError::DuplicateAnchor { .. } => ParseErrorKind::DuplicateAnchor,
            ParseError::DuplicateKey { .. } => ParseErrorKind::DuplicateKey,
            ParseError::RecursiveAlias { .. } => ParseErrorKind::RecursiveAlias,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            ParseError::Syntax { line, .. }
            | ParseError::UndefinedAlias { line, .. }
            | ParseError::DuplicateAnchor { line, .. }
            | ParseError::DuplicateKey { line, .. }
            | ParseError::RecursiveAlias { line, .. } => *line,
        }
    }
}
