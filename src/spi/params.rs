//! Positional query parameters
//!
//! A [`Params`] value is a tuple of [`IntoDatum`] values bound to `$1`,
//! `$2`, ... in order. Its signature is known statically, which is what
//! plans are compiled against.

use crate::error::{Error, Result, Slot};
use crate::types::{Datum, IntoDatum, TypeTag};

pub trait Params {
    /// Declared type of each parameter, in order
    fn signature() -> Vec<TypeTag>;

    /// Encode the bound values, in order
    fn into_datums(self) -> Vec<Datum>;
}

impl Params for () {
    fn signature() -> Vec<TypeTag> {
        Vec::new()
    }

    fn into_datums(self) -> Vec<Datum> {
        Vec::new()
    }
}

macro_rules! impl_params {
    ($($idx:tt $T:ident),+) => {
        impl<$($T: IntoDatum),+> Params for ($($T,)+) {
            fn signature() -> Vec<TypeTag> {
                vec![$($T::type_tag()),+]
            }

            fn into_datums(self) -> Vec<Datum> {
                vec![$(self.$idx.into_datum()),+]
            }
        }
    };
}

impl_params!(0 A);
impl_params!(0 A, 1 B);
impl_params!(0 A, 1 B, 2 C);
impl_params!(0 A, 1 B, 2 C, 3 D);
impl_params!(0 A, 1 B, 2 C, 3 D, 4 E);
impl_params!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
impl_params!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G);
impl_params!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H);
impl_params!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I);
impl_params!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I, 9 J);
impl_params!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I, 9 J, 10 K);
impl_params!(0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H, 8 I, 9 J, 10 K, 11 L);

/// Compare bound argument types with a compiled signature
pub(crate) fn check_arguments(expected: &[TypeTag], actual: &[TypeTag]) -> Result<()> {
    if expected.len() != actual.len() {
        return Err(Error::CountMismatch {
            slot: Slot::Argument,
            expected: expected.len(),
            actual: actual.len(),
        });
    }
    for (index, (e, a)) in expected.iter().zip(actual).enumerate() {
        if e != a {
            return Err(Error::TypeMismatch {
                slot: Slot::Argument,
                index,
                expected: e.to_string(),
                actual: a.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature() {
        assert!(<() as Params>::signature().is_empty());
        assert_eq!(
            <(i64, Option<String>, &str) as Params>::signature(),
            vec![TypeTag::Int8, TypeTag::Text, TypeTag::Text]
        );
    }

    #[test]
    fn test_into_datums() {
        let datums = (1i32, None::<bool>, 2.5f64).into_datums();
        assert_eq!(
            datums,
            vec![Datum::Int4(1), Datum::Null, Datum::Float8(2.5)]
        );
    }

    #[test]
    fn test_argument_check() {
        let sig = [TypeTag::Int8];
        assert!(check_arguments(&sig, &[TypeTag::Int8]).is_ok());
        assert!(matches!(
            check_arguments(&sig, &[TypeTag::Int4]),
            Err(Error::TypeMismatch {
                slot: Slot::Argument,
                index: 0,
                ..
            })
        ));
        assert!(matches!(
            check_arguments(&sig, &[]),
            Err(Error::CountMismatch {
                slot: Slot::Argument,
                ..
            })
        ));
    }
}
