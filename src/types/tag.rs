//! Runtime type tags
//!
//! The host engine describes every result column and every bound parameter
//! with a [`TypeTag`]. Static Rust types are matched against these tags
//! before any value is converted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine-native column types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    /// Boolean
    Bool,
    /// 16-bit integer
    Int2,
    /// 32-bit integer
    Int4,
    /// 64-bit integer
    Int8,
    /// Single-precision floating point
    Float4,
    /// Double-precision floating point
    Float8,
    /// Unlimited text
    Text,
    /// Binary data
    Bytea,
}

impl TypeTag {
    /// Get the size in bytes for this type (for fixed-size types)
    pub fn size(&self) -> Option<usize> {
        match self {
            TypeTag::Bool => Some(1),
            TypeTag::Int2 => Some(2),
            TypeTag::Int4 => Some(4),
            TypeTag::Int8 => Some(8),
            TypeTag::Float4 => Some(4),
            TypeTag::Float8 => Some(8),
            TypeTag::Text | TypeTag::Bytea => None,
        }
    }

    /// Check if this type is an integer type
    pub fn is_integer(&self) -> bool {
        matches!(self, TypeTag::Int2 | TypeTag::Int4 | TypeTag::Int8)
    }

    /// Check if this type is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, TypeTag::Float4 | TypeTag::Float8)
    }

    /// Check if this type is numeric
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Check if values of the two types can be compared
    pub fn is_comparable_with(&self, other: &TypeTag) -> bool {
        self == other || (self.is_numeric() && other.is_numeric())
    }

    /// The type both operands of a numeric operator are coerced to.
    ///
    /// Integers widen to the larger integer; any float operand makes the
    /// result `float8` unless both sides are `float4`.
    pub fn promote(a: TypeTag, b: TypeTag) -> Option<TypeTag> {
        if !a.is_numeric() || !b.is_numeric() {
            return None;
        }
        if a == b {
            return Some(a);
        }
        if a.is_float() || b.is_float() {
            return Some(TypeTag::Float8);
        }
        Some(if a.rank() >= b.rank() { a } else { b })
    }

    fn rank(&self) -> u8 {
        match self {
            TypeTag::Int2 => 1,
            TypeTag::Int4 => 2,
            TypeTag::Int8 => 3,
            TypeTag::Float4 => 4,
            TypeTag::Float8 => 5,
            _ => 0,
        }
    }

    /// Resolve a SQL type name, including the common aliases
    pub fn from_name(name: &str) -> Option<TypeTag> {
        match name.to_lowercase().as_str() {
            "bool" | "boolean" => Some(TypeTag::Bool),
            "int2" | "smallint" => Some(TypeTag::Int2),
            "int4" | "int" | "integer" => Some(TypeTag::Int4),
            "int8" | "bigint" => Some(TypeTag::Int8),
            "float4" | "real" => Some(TypeTag::Float4),
            "float8" | "double precision" | "float" => Some(TypeTag::Float8),
            "text" | "varchar" => Some(TypeTag::Text),
            "bytea" => Some(TypeTag::Bytea),
            _ => None,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Bool => write!(f, "bool"),
            TypeTag::Int2 => write!(f, "int2"),
            TypeTag::Int4 => write!(f, "int4"),
            TypeTag::Int8 => write!(f, "int8"),
            TypeTag::Float4 => write!(f, "float4"),
            TypeTag::Float8 => write!(f, "float8"),
            TypeTag::Text => write!(f, "text"),
            TypeTag::Bytea => write!(f, "bytea"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_size() {
        assert_eq!(TypeTag::Int4.size(), Some(4));
        assert_eq!(TypeTag::Int8.size(), Some(8));
        assert_eq!(TypeTag::Text.size(), None);
    }

    #[test]
    fn test_promotion() {
        assert_eq!(
            TypeTag::promote(TypeTag::Int8, TypeTag::Int4),
            Some(TypeTag::Int8)
        );
        assert_eq!(
            TypeTag::promote(TypeTag::Int2, TypeTag::Float4),
            Some(TypeTag::Float8)
        );
        assert_eq!(
            TypeTag::promote(TypeTag::Float4, TypeTag::Float4),
            Some(TypeTag::Float4)
        );
        assert_eq!(TypeTag::promote(TypeTag::Text, TypeTag::Int4), None);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(TypeTag::from_name("BIGINT"), Some(TypeTag::Int8));
        assert_eq!(TypeTag::from_name("double precision"), Some(TypeTag::Float8));
        assert_eq!(TypeTag::from_name("numeric"), None);
        assert_eq!(TypeTag::Int8.to_string(), "int8");
    }
}
