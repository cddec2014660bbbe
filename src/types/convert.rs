//! Conversions between Rust values and engine datums
//!
//! [`IntoDatum`] encodes bound parameters, [`FromDatum`] decodes result
//! columns. `Option<T>` is the only way to accept an engine NULL.

use super::{Datum, TypeTag};

/// A Rust value that can be bound as a query parameter
pub trait IntoDatum {
    /// The engine type this parameter is declared as
    fn type_tag() -> TypeTag;

    /// Encode the value
    fn into_datum(self) -> Datum;
}

/// A Rust value that can be decoded from a result column
pub trait FromDatum: Sized {
    /// Type name used in mismatch reports
    fn type_name() -> String;

    /// Whether a column of type `tag` decodes into `Self`
    fn accepts(tag: TypeTag) -> bool;

    /// Decode a non-null value; `None` if the datum has the wrong tag
    fn from_datum(datum: Datum) -> Option<Self>;

    /// Decode an engine NULL; `None` if `Self` cannot represent it
    fn from_null() -> Option<Self> {
        None
    }
}

macro_rules! impl_datum_conversions {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl IntoDatum for $ty {
                fn type_tag() -> TypeTag {
                    TypeTag::$variant
                }

                fn into_datum(self) -> Datum {
                    Datum::$variant(self)
                }
            }

            impl FromDatum for $ty {
                fn type_name() -> String {
                    TypeTag::$variant.to_string()
                }

                fn accepts(tag: TypeTag) -> bool {
                    tag == TypeTag::$variant
                }

                fn from_datum(datum: Datum) -> Option<Self> {
                    match datum {
                        Datum::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )+
    };
}

impl_datum_conversions! {
    bool => Bool,
    i16 => Int2,
    i32 => Int4,
    i64 => Int8,
    f32 => Float4,
    f64 => Float8,
    String => Text,
    Vec<u8> => Bytea,
}

impl IntoDatum for &str {
    fn type_tag() -> TypeTag {
        TypeTag::Text
    }

    fn into_datum(self) -> Datum {
        Datum::Text(self.to_string())
    }
}

impl IntoDatum for &[u8] {
    fn type_tag() -> TypeTag {
        TypeTag::Bytea
    }

    fn into_datum(self) -> Datum {
        Datum::Bytea(self.to_vec())
    }
}

impl<T: IntoDatum> IntoDatum for Option<T> {
    fn type_tag() -> TypeTag {
        T::type_tag()
    }

    fn into_datum(self) -> Datum {
        match self {
            Some(v) => v.into_datum(),
            None => Datum::Null,
        }
    }
}

impl<T: FromDatum> FromDatum for Option<T> {
    fn type_name() -> String {
        T::type_name()
    }

    fn accepts(tag: TypeTag) -> bool {
        T::accepts(tag)
    }

    fn from_datum(datum: Datum) -> Option<Self> {
        T::from_datum(datum).map(Some)
    }

    fn from_null() -> Option<Self> {
        Some(None)
    }
}

/// Dynamic target: accepts any column, NULL included
impl FromDatum for Datum {
    fn type_name() -> String {
        "any".to_string()
    }

    fn accepts(_tag: TypeTag) -> bool {
        true
    }

    fn from_datum(datum: Datum) -> Option<Self> {
        Some(datum)
    }

    fn from_null() -> Option<Self> {
        Some(Datum::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_encoding() {
        assert_eq!(<i64 as IntoDatum>::type_tag(), TypeTag::Int8);
        assert_eq!(42i64.into_datum(), Datum::Int8(42));
        assert_eq!("hi".into_datum(), Datum::Text("hi".to_string()));
        assert_eq!(<Option<f32> as IntoDatum>::type_tag(), TypeTag::Float4);
        assert_eq!(None::<f32>.into_datum(), Datum::Null);
    }

    #[test]
    fn test_decoding_checks_tag() {
        assert_eq!(i32::from_datum(Datum::Int4(7)), Some(7));
        assert_eq!(i32::from_datum(Datum::Int8(7)), None);
        assert!(!<bool as FromDatum>::accepts(TypeTag::Int8));
    }

    #[test]
    fn test_null_handling() {
        assert_eq!(<i64 as FromDatum>::from_null(), None);
        assert_eq!(<Option<i64> as FromDatum>::from_null(), Some(None));
        assert_eq!(
            <Option<String> as FromDatum>::from_datum(Datum::Text("x".into())),
            Some(Some("x".to_string()))
        );
    }
}
