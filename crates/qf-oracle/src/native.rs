use num_bigint::BigInt;
use qf_core::errors::{ErrorInfo, QfError};
use qf_core::{FieldIndex, InvariantOracle, Invariants};
use tracing::trace;

use crate::continued::expand;
use crate::forms::narrow_class_number;

/// Field discriminant of `Q(sqrt(d))`.
pub fn discriminant(d: FieldIndex) -> i64 {
    let raw = d.get() as i64;
    if raw % 4 == 1 {
        raw
    } else {
        4 * raw
    }
}

/// Minkowski bound `sqrt(|d_K|) / 2` for a real quadratic field.
pub fn minkowski_bound(discriminant: i64) -> f64 {
    (discriminant.unsigned_abs() as f64).sqrt() / 2.0
}

/// Exact in-process oracle.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeOracle;

impl NativeOracle {
    /// Creates the oracle.
    pub fn new() -> Self {
        Self
    }
}

impl InvariantOracle for NativeOracle {
    fn name(&self) -> &str {
        "native"
    }

    fn invariants(&self, d: FieldIndex) -> Result<Invariants, QfError> {
        let disc = discriminant(d);
        let expansion = expand(d)?;
        let narrow = narrow_class_number(disc)?;
        let norm = expansion.unit.norm().unwrap_or_default();
        let class_number = if norm == BigInt::from(-1) {
            narrow
        } else if narrow % 2 == 0 {
            narrow / 2
        } else {
            return Err(QfError::Oracle(
                ErrorInfo::new("class-number-parity", "narrow class number must be even")
                    .with_context("d", d.to_string())
                    .with_context("narrow", narrow.to_string()),
            ));
        };
        trace!(d = d.get(), period = expansion.period, class_number, "field computed");
        Ok(Invariants {
            discriminant: disc,
            class_number,
            fundamental_unit: expansion.unit.to_string(),
            regulator: expansion.regulator,
            minkowski_bound: minkowski_bound(disc),
        })
    }
}
