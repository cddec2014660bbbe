//! Types module
//!
//! Engine type tags, native values, and the conversion traits that connect
//! them to Rust types.

pub mod convert;
pub mod datum;
pub mod tag;

pub use convert::{FromDatum, IntoDatum};
pub use datum::{ColumnDesc, Datum};
pub use tag::TypeTag;
