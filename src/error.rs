//! Error types for arcspi
//!
//! Every failure the crate can report lives in [`Error`]. Callers that need to
//! pick a recovery strategy should match on [`Error::kind`] rather than on
//! individual variants.

use thiserror::Error;

use crate::memory::ArenaId;

/// The four caller-visible failure classes, plus internal faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A handle whose backing arena no longer exists. Recompile and retry.
    StaleReference,
    /// Static request and runtime schema disagree.
    TypeMismatch,
    /// The host engine rejected or failed the statement.
    Execution,
    /// A result sequence was indexed outside its range.
    Bounds,
    /// Broken host invariants; not expected in correct programs.
    Internal,
}

/// What a type-mismatch position refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Column,
    Argument,
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Column => write!(f, "column"),
            Slot::Argument => write!(f, "argument"),
        }
    }
}

/// The main error type for arcspi
#[derive(Error, Debug)]
pub enum Error {
    // ========== Lexer Errors ==========
    #[error("Lexer error: unexpected character '{0}' at position {1}")]
    UnexpectedCharacter(char, usize),

    #[error("Lexer error: unterminated string literal starting at position {0}")]
    UnterminatedString(usize),

    #[error("Lexer error: invalid number format at position {0}")]
    InvalidNumber(usize),

    // ========== Parser Errors ==========
    #[error("Parse error: unexpected token '{found}', expected {expected}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    // ========== Arena Errors ==========
    #[error("Stale reference: pointer {addr:#x} (epoch {epoch}) is not backed by a live arena")]
    StalePointer { addr: usize, epoch: u64 },

    #[error("Stale reference: arena {0} has been destroyed")]
    ArenaGone(ArenaId),

    #[error("Stale reference: connection {0} is no longer open")]
    ConnectionGone(usize),

    // ========== Type Errors ==========
    #[error("Type error: {slot} count mismatch, expected {expected}, got {actual}")]
    CountMismatch {
        slot: Slot,
        expected: usize,
        actual: usize,
    },

    #[error("Type error: {slot} {index} expected {expected}, got {actual}")]
    TypeMismatch {
        slot: Slot,
        index: usize,
        expected: String,
        actual: String,
    },

    // ========== Execution Errors ==========
    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Execution error: division by zero")]
    DivisionByZero,

    #[error("Execution error: {0} out of range")]
    NumericOverflow(&'static str),

    #[error("Execution error: there is no parameter ${0}")]
    UndefinedParameter(usize),

    #[error("Execution error: column '{0}' does not exist")]
    ColumnNotFound(String),

    #[error("Execution error: function {0} does not exist")]
    UnknownFunction(String),

    #[error("Execution error: cannot cast {from} to {to}")]
    InvalidCast { from: String, to: String },

    #[error("Execution error: operator does not exist: {left} {op} {right}")]
    OperatorMismatch {
        left: String,
        op: String,
        right: String,
    },

    #[error("Execution error: not connected")]
    NotConnected,

    #[error("Execution error: too many nested connections (limit {0})")]
    ConnectionLimit(usize),

    // ========== Bounds Errors ==========
    #[error("Bounds error: row {index} requested but result has {len} row(s)")]
    OutOfBounds { index: usize, len: usize },

    // ========== Configuration Errors ==========
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::StalePointer { .. } | Error::ArenaGone(_) | Error::ConnectionGone(_) => {
                ErrorKind::StaleReference
            }
            Error::CountMismatch { .. } | Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::UnexpectedCharacter(..)
            | Error::UnterminatedString(_)
            | Error::InvalidNumber(_)
            | Error::UnexpectedToken { .. }
            | Error::ParseError(_)
            | Error::ExecutionError(_)
            | Error::DivisionByZero
            | Error::NumericOverflow(_)
            | Error::UndefinedParameter(_)
            | Error::ColumnNotFound(_)
            | Error::UnknownFunction(_)
            | Error::InvalidCast { .. }
            | Error::OperatorMismatch { .. }
            | Error::NotConnected
            | Error::ConnectionLimit(_) => ErrorKind::Execution,
            Error::OutOfBounds { .. } => ErrorKind::Bounds,
            Error::Config(_) | Error::IoError(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.kind() == ErrorKind::StaleReference
    }

    pub fn is_type_mismatch(&self) -> bool {
        self.kind() == ErrorKind::TypeMismatch
    }

    pub fn is_execution(&self) -> bool {
        self.kind() == ErrorKind::Execution
    }

    pub fn is_bounds(&self) -> bool {
        self.kind() == ErrorKind::Bounds
    }
}

/// Result type alias for arcspi operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::TypeMismatch {
            slot: Slot::Column,
            index: 0,
            expected: "bool".to_string(),
            actual: "int8".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Type error: column 0 expected bool, got int8"
        );

        let err = Error::UnexpectedCharacter('@', 5);
        assert_eq!(
            err.to_string(),
            "Lexer error: unexpected character '@' at position 5"
        );
    }

    #[test]
    fn test_error_kinds_are_distinct() {
        assert!(Error::StalePointer { addr: 16, epoch: 3 }.is_stale());
        assert!(Error::CountMismatch {
            slot: Slot::Argument,
            expected: 1,
            actual: 2
        }
        .is_type_mismatch());
        assert!(Error::DivisionByZero.is_execution());
        assert!(Error::ParseError("x".into()).is_execution());
        assert!(Error::OutOfBounds { index: 3, len: 1 }.is_bounds());
        assert_eq!(Error::Internal("x".into()).kind(), ErrorKind::Internal);
    }
}
