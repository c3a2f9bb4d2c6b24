//! Continued fraction expansion of the maximal order generator.
//!
//! For `w = sqrt(d)` (or `(1 + sqrt(d))/2` when `d = 1 mod 4`) every complete
//! quotient after the first is reduced, so the expansion is purely periodic
//! from index 1. The product of the complete quotients over one period is the
//! fundamental unit and the sum of their logarithms is the regulator.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Zero};
use qf_core::errors::{ErrorInfo, QfError};
use qf_core::FieldIndex;

use crate::unit::FundamentalUnit;

/// Integer square root, `floor(sqrt(n))` for `n >= 0`.
pub fn isqrt(n: i128) -> i128 {
    if n < 2 {
        return n.max(0);
    }
    let mut x = (n as f64).sqrt() as i128;
    while x * x > n {
        x -= 1;
    }
    while (x + 1) * (x + 1) <= n {
        x += 1;
    }
    x
}

/// Complete quotient `(p + sqrt(d)) / q` with `q | d - p^2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Quotient {
    p: i128,
    q: i128,
}

impl Quotient {
    fn partial(self, root: i128) -> i128 {
        (self.p + root).div_euclid(self.q)
    }

    fn next(self, d: i128, root: i128) -> Self {
        let a = self.partial(root);
        let p = a * self.q - self.p;
        let q = (d - p * p) / self.q;
        Self { p, q }
    }
}

/// Output of one period of the expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitExpansion {
    /// Fundamental unit of the maximal order, greater than one.
    pub unit: FundamentalUnit,
    /// Natural logarithm of the unit.
    pub regulator: f64,
    /// Period length of the expansion.
    pub period: usize,
}

/// Expands the generator of the maximal order of `Q(sqrt(d))` over one period.
pub fn expand(index: FieldIndex) -> Result<UnitExpansion, QfError> {
    let raw = index.get();
    let d = raw as i128;
    let root = isqrt(d);
    let start = if raw % 4 == 1 {
        Quotient { p: 1, q: 2 }
    } else {
        Quotient { p: 0, q: 1 }
    };

    let first = start.next(d, root);
    let big_d = BigInt::from(raw);
    let sqrt_d = (raw as f64).sqrt();
    let (mut x, mut y, mut z) = (BigInt::one(), BigInt::zero(), BigInt::one());
    let mut regulator = 0.0f64;
    let mut period = 0usize;
    let mut current = first;
    loop {
        if current.q <= 0 {
            return Err(QfError::Oracle(
                ErrorInfo::new("expansion-not-reduced", "complete quotient lost reduction")
                    .with_context("d", raw.to_string())
                    .with_context("step", period.to_string()),
            ));
        }
        let p = BigInt::from(current.p);
        let next_x = &x * &p + &y * &big_d;
        let next_y = &x + &y * &p;
        x = next_x;
        y = next_y;
        z *= BigInt::from(current.q);
        let g = x.gcd(&y).gcd(&z);
        if !g.is_one() {
            x /= &g;
            y /= &g;
            z /= &g;
        }
        regulator += ((current.p as f64 + sqrt_d) / current.q as f64).ln();
        period += 1;

        current = current.next(d, root);
        if current == first {
            break;
        }
    }

    let unit = FundamentalUnit::from_fraction(&x, &y, &z, raw)?;
    if !unit.is_unit() {
        return Err(QfError::Oracle(
            ErrorInfo::new("unit-norm", "period product does not have norm +-1")
                .with_context("d", raw.to_string())
                .with_context("unit", unit.to_string()),
        ));
    }
    Ok(UnitExpansion {
        unit,
        regulator,
        period,
    })
}
