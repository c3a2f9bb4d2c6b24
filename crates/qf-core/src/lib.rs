#![deny(missing_docs)]
#![doc = "Core types, the invariant oracle contract and shared errors for the real quadratic field survey."]

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub mod errors;
pub mod provenance;

pub use errors::{ErrorInfo, QfError};
pub use provenance::RunProvenance;

/// Returns true when no prime square divides `n`.
///
/// Exact trial division: each prime factor is removed once and a second
/// division by the same prime means a square divides `n`. Zero is never
/// squarefree; one is, although it is not an admissible field index.
pub fn is_squarefree(mut n: u64) -> bool {
    if n == 0 {
        return false;
    }
    let mut p = 2u64;
    while p.saturating_mul(p) <= n {
        if n % p == 0 {
            n /= p;
            if n % p == 0 {
                return false;
            }
        }
        p += if p == 2 { 1 } else { 2 };
    }
    true
}

/// Squarefree integer `d >= 2` identifying the real quadratic field `Q(sqrt(d))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct FieldIndex(u64);

impl FieldIndex {
    /// Largest admissible index; keeps `4d` and form arithmetic inside machine integers.
    pub const MAX: u64 = 1 << 60;

    /// Validates `d` and wraps it.
    pub fn new(d: u64) -> Result<Self, QfError> {
        if d < 2 {
            return Err(QfError::Range(
                ErrorInfo::new("field-index-small", "field indices start at 2")
                    .with_context("d", d.to_string()),
            ));
        }
        if d > Self::MAX {
            return Err(QfError::Range(
                ErrorInfo::new("field-index-large", "field index exceeds supported maximum")
                    .with_context("d", d.to_string())
                    .with_context("max", Self::MAX.to_string()),
            ));
        }
        if !is_squarefree(d) {
            return Err(QfError::Range(
                ErrorInfo::new("field-index-square", "field index is divisible by a square")
                    .with_context("d", d.to_string()),
            ));
        }
        Ok(Self(d))
    }

    /// Wraps a value the caller has already proven to be an admissible index.
    pub fn new_unchecked(d: u64) -> Self {
        debug_assert!(d >= 2 && d <= Self::MAX && is_squarefree(d));
        Self(d)
    }

    /// Returns the raw integer `d`.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for FieldIndex {
    type Error = QfError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FieldIndex> for u64 {
    fn from(value: FieldIndex) -> Self {
        value.0
    }
}

impl fmt::Display for FieldIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Invariants returned by an oracle for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invariants {
    /// Field discriminant `d_K`.
    pub discriminant: i64,
    /// Class number `h_K`.
    pub class_number: u64,
    /// Exact textual form of the fundamental unit.
    pub fundamental_unit: String,
    /// Regulator `R_K`.
    pub regulator: f64,
    /// Minkowski bound of the field.
    pub minkowski_bound: f64,
}

/// One output row: a field index together with its invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvariantRecord {
    /// The field index, echoed.
    pub d: FieldIndex,
    /// Invariants computed for `d`.
    pub invariants: Invariants,
}

impl InvariantRecord {
    /// Column names written as the header of every batch file.
    pub const HEADER: [&'static str; 6] = ["d", "dK", "hK", "fu", "rK", "mb"];

    /// Creates a record from its parts.
    pub fn new(d: FieldIndex, invariants: Invariants) -> Self {
        Self { d, invariants }
    }

    /// Renders the six columns as text.
    ///
    /// Floats use the shortest representation that parses back to the same
    /// `f64`, so no precision is lost beyond what the oracle produced.
    pub fn to_row(&self) -> [String; 6] {
        let inv = &self.invariants;
        [
            self.d.to_string(),
            inv.discriminant.to_string(),
            inv.class_number.to_string(),
            inv.fundamental_unit.clone(),
            inv.regulator.to_string(),
            inv.minkowski_bound.to_string(),
        ]
    }

    /// Parses a row previously produced by [`InvariantRecord::to_row`].
    pub fn from_row<S: AsRef<str>>(row: &[S]) -> Result<Self, QfError> {
        if row.len() != Self::HEADER.len() {
            return Err(QfError::Serde(
                ErrorInfo::new("row-width", "record row must have six columns")
                    .with_context("columns", row.len().to_string()),
            ));
        }
        let field = |idx: usize| row[idx].as_ref().trim();
        let parse_err = |column: &str, value: &str, err: String| {
            QfError::Serde(
                ErrorInfo::new("row-parse", err)
                    .with_context("column", column)
                    .with_context("value", value),
            )
        };
        let raw_d: u64 = field(0)
            .parse()
            .map_err(|err: std::num::ParseIntError| parse_err("d", field(0), err.to_string()))?;
        let d = FieldIndex::new(raw_d)?;
        let discriminant = field(1)
            .parse()
            .map_err(|err: std::num::ParseIntError| parse_err("dK", field(1), err.to_string()))?;
        let class_number = field(2)
            .parse()
            .map_err(|err: std::num::ParseIntError| parse_err("hK", field(2), err.to_string()))?;
        let regulator = field(4).parse().map_err(|err: std::num::ParseFloatError| {
            parse_err("rK", field(4), err.to_string())
        })?;
        let minkowski_bound = field(5).parse().map_err(|err: std::num::ParseFloatError| {
            parse_err("mb", field(5), err.to_string())
        })?;
        Ok(Self {
            d,
            invariants: Invariants {
                discriminant,
                class_number,
                fundamental_unit: row[3].as_ref().to_string(),
                regulator,
                minkowski_bound,
            },
        })
    }
}

/// Computes the invariants of one real quadratic field.
///
/// Implementations must be deterministic and safe to call concurrently from
/// independent workers; each call may be arbitrarily slow.
pub trait InvariantOracle: Send + Sync {
    /// Short label recorded in run provenance.
    fn name(&self) -> &str;

    /// Computes the invariants of `Q(sqrt(d))`.
    fn invariants(&self, d: FieldIndex) -> Result<Invariants, QfError>;
}

impl<T: InvariantOracle + ?Sized> InvariantOracle for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn invariants(&self, d: FieldIndex) -> Result<Invariants, QfError> {
        (**self).invariants(d)
    }
}

impl<T: InvariantOracle + ?Sized> InvariantOracle for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn invariants(&self, d: FieldIndex) -> Result<Invariants, QfError> {
        (**self).invariants(d)
    }
}

impl<T: InvariantOracle + ?Sized> InvariantOracle for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn invariants(&self, d: FieldIndex) -> Result<Invariants, QfError> {
        (**self).invariants(d)
    }
}
