#![deny(missing_docs)]
#![doc = "Invariant oracles for real quadratic fields."]

/// External program oracle.
pub mod command;
/// Continued fraction expansion yielding the fundamental unit and regulator.
pub mod continued;
/// Reduced binary quadratic forms and narrow class numbers.
pub mod forms;
/// Exact in-process oracle.
pub mod native;
/// Serializable oracle selection.
pub mod spec;
/// Exact fundamental unit representation.
pub mod unit;

pub use command::CommandOracle;
pub use continued::{expand, UnitExpansion};
pub use forms::{narrow_class_number, reduced_forms, Form};
pub use native::NativeOracle;
pub use spec::OracleSpec;
pub use unit::FundamentalUnit;
