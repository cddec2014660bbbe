//! arcspi - Arena-safe typed query interface for an embedded database host
//!
//! This library lets extension code run ad hoc and prepared queries with
//! statically typed parameters and rows, while rejecting any use of plans
//! or results whose host arena has already been torn down:
//! - Arena registry (pointer ownership, liveness, epochs)
//! - Typed decoding of parameters and result rows
//! - Query executor, prepared plans and lazy result sequences
//! - An in-process reference host with a small SQL dialect

pub mod config;
pub mod error;
pub mod host;
pub mod memory;
pub mod spi;
pub mod types;

pub use config::{HostConfig, SpiConfig};
pub use error::{Error, ErrorKind, Result};
pub use host::{Host, HostScope};
pub use memory::{MemoryContext, TrackedPtr};
pub use spi::{FromRow, Params, Plan, Results, SpiExecutor};
pub use types::{ColumnDesc, Datum, TypeTag};
