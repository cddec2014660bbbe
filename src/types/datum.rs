//! Engine values
//!
//! A [`Datum`] is one native value as the host engine stores it in a tuple
//! table. It carries its own tag, so decoding is always a checked match and
//! never a reinterpretation of raw bytes.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::TypeTag;

/// A value in the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Datum {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// 16-bit integer
    Int2(i16),
    /// 32-bit integer
    Int4(i32),
    /// 64-bit integer
    Int8(i64),
    /// 32-bit float
    Float4(f32),
    /// 64-bit float
    Float8(f64),
    /// Text value
    Text(String),
    /// Binary data
    Bytea(Vec<u8>),
}

// Floats compare bitwise so that decoded rows round-trip exactly
impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Datum::Null, Datum::Null) => true,
            (Datum::Bool(a), Datum::Bool(b)) => a == b,
            (Datum::Int2(a), Datum::Int2(b)) => a == b,
            (Datum::Int4(a), Datum::Int4(b)) => a == b,
            (Datum::Int8(a), Datum::Int8(b)) => a == b,
            (Datum::Float4(a), Datum::Float4(b)) => a.to_bits() == b.to_bits(),
            (Datum::Float8(a), Datum::Float8(b)) => a.to_bits() == b.to_bits(),
            (Datum::Text(a), Datum::Text(b)) => a == b,
            (Datum::Bytea(a), Datum::Bytea(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Datum {}

impl Datum {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// The tag of a non-null value
    pub fn type_tag(&self) -> Option<TypeTag> {
        match self {
            Datum::Null => None,
            Datum::Bool(_) => Some(TypeTag::Bool),
            Datum::Int2(_) => Some(TypeTag::Int2),
            Datum::Int4(_) => Some(TypeTag::Int4),
            Datum::Int8(_) => Some(TypeTag::Int8),
            Datum::Float4(_) => Some(TypeTag::Float4),
            Datum::Float8(_) => Some(TypeTag::Float8),
            Datum::Text(_) => Some(TypeTag::Text),
            Datum::Bytea(_) => Some(TypeTag::Bytea),
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> String {
        match self.type_tag() {
            Some(tag) => tag.to_string(),
            None => "NULL".to_string(),
        }
    }

    /// Try to convert to boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Widen any integer to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int2(i) => Some(*i as i64),
            Datum::Int4(i) => Some(*i as i64),
            Datum::Int8(i) => Some(*i),
            _ => None,
        }
    }

    /// Widen any numeric to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Float4(f) => Some(*f as f64),
            Datum::Float8(f) => Some(*f),
            other => other.as_i64().map(|i| i as f64),
        }
    }

    /// Try to borrow as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two values (for WHERE clauses and ORDER BY)
    pub fn compare(&self, other: &Datum) -> Option<Ordering> {
        match (self, other) {
            (Datum::Null, Datum::Null) => Some(Ordering::Equal),
            (Datum::Null, _) | (_, Datum::Null) => None,
            (Datum::Bool(a), Datum::Bool(b)) => Some(a.cmp(b)),
            (Datum::Text(a), Datum::Text(b)) => Some(a.cmp(b)),
            (Datum::Bytea(a), Datum::Bytea(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => x.partial_cmp(&y),
                    _ => None, // Incompatible types
                },
            },
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Bool(b) => write!(f, "{}", if *b { "t" } else { "f" }),
            Datum::Int2(i) => write!(f, "{}", i),
            Datum::Int4(i) => write!(f, "{}", i),
            Datum::Int8(i) => write!(f, "{}", i),
            Datum::Float4(n) => write!(f, "{}", n),
            Datum::Float8(n) => write!(f, "{}", n),
            Datum::Text(s) => write!(f, "{}", s),
            Datum::Bytea(b) => {
                write!(f, "\\x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

/// Name and type of one result column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDesc {
    /// Column name
    pub name: String,
    /// Column type
    pub type_tag: TypeTag,
}

impl ColumnDesc {
    pub fn new(name: impl Into<String>, type_tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            type_tag,
        }
    }
}
