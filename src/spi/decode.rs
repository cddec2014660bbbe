//! Typed row decoding
//!
//! A [`FromRow`] type first validates the whole row descriptor, then decodes
//! individual rows. Validation runs once per execution; decoding runs once
//! per row, the first time the row is observed.

use crate::error::{Error, Result, Slot};
use crate::types::{ColumnDesc, Datum, FromDatum};

/// A Rust type one result row decodes into
pub trait FromRow: Sized {
    /// Check column count and column types against `Self`
    fn check_descriptor(columns: &[ColumnDesc]) -> Result<()>;

    /// Decode one complete row; fails without producing a partial value
    fn from_row(values: Vec<Datum>) -> Result<Self>;
}

/// Validate a descriptor for `R` before any row is touched
pub fn validate<R: FromRow>(columns: &[ColumnDesc]) -> Result<()> {
    R::check_descriptor(columns)
}

fn check_count(actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(Error::CountMismatch {
            slot: Slot::Column,
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_column<T: FromDatum>(columns: &[ColumnDesc], index: usize) -> Result<()> {
    let column = &columns[index];
    if T::accepts(column.type_tag) {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            slot: Slot::Column,
            index,
            expected: T::type_name(),
            actual: column.type_tag.to_string(),
        })
    }
}

fn decode_datum<T: FromDatum>(index: usize, datum: Datum) -> Result<T> {
    let mismatch = |actual: String| Error::TypeMismatch {
        slot: Slot::Column,
        index,
        expected: T::type_name(),
        actual,
    };

    if datum.is_null() {
        return T::from_null().ok_or_else(|| mismatch("NULL".to_string()));
    }
    let actual = datum.type_name();
    T::from_datum(datum).ok_or_else(|| mismatch(actual))
}

// A bare value decodes a single-column row
macro_rules! impl_scalar_row {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl FromRow for $ty {
                fn check_descriptor(columns: &[ColumnDesc]) -> Result<()> {
                    check_count(columns.len(), 1)?;
                    check_column::<Self>(columns, 0)
                }

                fn from_row(values: Vec<Datum>) -> Result<Self> {
                    check_count(values.len(), 1)?;
                    let datum = values.into_iter().next().unwrap_or(Datum::Null);
                    decode_datum(0, datum)
                }
            }

            impl FromRow for Option<$ty> {
                fn check_descriptor(columns: &[ColumnDesc]) -> Result<()> {
                    check_count(columns.len(), 1)?;
                    check_column::<Self>(columns, 0)
                }

                fn from_row(values: Vec<Datum>) -> Result<Self> {
                    check_count(values.len(), 1)?;
                    let datum = values.into_iter().next().unwrap_or(Datum::Null);
                    decode_datum(0, datum)
                }
            }
        )+
    };
}

impl_scalar_row!(bool, i16, i32, i64, f32, f64, String, Vec<u8>);

impl FromRow for Datum {
    fn check_descriptor(columns: &[ColumnDesc]) -> Result<()> {
        check_count(columns.len(), 1)
    }

    fn from_row(values: Vec<Datum>) -> Result<Self> {
        check_count(values.len(), 1)?;
        Ok(values.into_iter().next().unwrap_or(Datum::Null))
    }
}

/// Dynamic rows: any column count, any types
impl FromRow for Vec<Datum> {
    fn check_descriptor(_columns: &[ColumnDesc]) -> Result<()> {
        Ok(())
    }

    fn from_row(values: Vec<Datum>) -> Result<Self> {
        Ok(values)
    }
}

macro_rules! impl_tuple_row {
    ($len:expr => $($idx:tt $T:ident),+) => {
        impl<$($T: FromDatum),+> FromRow for ($($T,)+) {
            fn check_descriptor(columns: &[ColumnDesc]) -> Result<()> {
                check_count(columns.len(), $len)?;
                $(check_column::<$T>(columns, $idx)?;)+
                Ok(())
            }

            fn from_row(values: Vec<Datum>) -> Result<Self> {
                check_count(values.len(), $len)?;
                let mut values = values.into_iter();
                Ok(($(decode_datum::<$T>($idx, values.next().unwrap_or(Datum::Null))?,)+))
            }
        }
    };
}

impl_tuple_row!(1 => 0 A);
impl_tuple_row!(2 => 0 A, 1 B);
impl_tuple_row!(3 => 0 A, 1 B, 2 C);
impl_tuple_row!(4 => 0 A, 1 B, 2 C, 3 D);
impl_tuple_row!(5 => 0 A, 1 B, 2 C, 3 D, 4 E);
impl_tuple_row!(6 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
impl_tuple_row!(7 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G);
impl_tuple_row!(8 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H);
impl_tuple_row!(9 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I);
impl_tuple_row!(10 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I, 9 J);
impl_tuple_row!(11 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I, 9 J, 10 K);
impl_tuple_row!(12 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I, 9 J, 10 K, 11 L);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeTag;

    fn desc(tags: &[TypeTag]) -> Vec<ColumnDesc> {
        tags.iter()
            .enumerate()
            .map(|(i, tag)| ColumnDesc::new(format!("c{}", i), *tag))
            .collect()
    }

    #[test]
    fn test_descriptor_validation() {
        let columns = desc(&[TypeTag::Int8, TypeTag::Text]);
        assert!(validate::<(i64, String)>(&columns).is_ok());
        assert!(validate::<(Option<i64>, Option<String>)>(&columns).is_ok());
        assert!(validate::<Vec<Datum>>(&columns).is_ok());

        match validate::<(i64, bool)>(&columns) {
            Err(Error::TypeMismatch {
                slot: Slot::Column,
                index,
                expected,
                actual,
            }) => {
                assert_eq!(index, 1);
                assert_eq!(expected, "bool");
                assert_eq!(actual, "text");
            }
            other => panic!("expected type mismatch, got {:?}", other),
        }

        assert!(matches!(
            validate::<(i64,)>(&columns),
            Err(Error::CountMismatch {
                expected: 1,
                actual: 2,
                ..
            })
        ));
        assert!(validate::<i64>(&columns).is_err());
    }

    #[test]
    fn test_first_mismatch_wins() {
        let columns = desc(&[TypeTag::Int4, TypeTag::Int4]);
        match validate::<(bool, bool)>(&columns) {
            Err(Error::TypeMismatch { index, .. }) => assert_eq!(index, 0),
            other => panic!("expected type mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_null_decoding() {
        let row = vec![Datum::Null, Datum::Int4(3)];
        let (a, b) = <(Option<i32>, i32)>::from_row(row.clone()).unwrap();
        assert_eq!(a, None);
        assert_eq!(b, 3);

        match <(i32, i32)>::from_row(row) {
            Err(Error::TypeMismatch { index, actual, .. }) => {
                assert_eq!(index, 0);
                assert_eq!(actual, "NULL");
            }
            other => panic!("expected type mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_scalar_rows() {
        assert_eq!(i64::from_row(vec![Datum::Int8(5)]).unwrap(), 5);
        assert_eq!(
            Option::<String>::from_row(vec![Datum::Null]).unwrap(),
            None
        );
        assert_eq!(Datum::from_row(vec![Datum::Null]).unwrap(), Datum::Null);
        assert!(i64::from_row(vec![Datum::Int8(1), Datum::Int8(2)]).is_err());
    }
}
