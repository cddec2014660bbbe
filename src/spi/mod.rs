//! Typed, arena-safe query interface
//!
//! - [`SpiExecutor`]: connection scope, one-shot and prepared execution
//! - [`Plan`]: prepared statement with explicit promotion
//! - [`Results`]: lazily decoded row sequence
//! - [`FromRow`] / [`Params`]: static row and parameter typing

pub mod decode;
pub mod executor;
pub mod params;
pub mod plan;
pub mod results;

pub use decode::FromRow;
pub use executor::SpiExecutor;
pub use params::Params;
pub use plan::{Plan, PlanState};
pub use results::{Iter, Results};
