use std::fmt;
use std::str::FromStr;

use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};
use qf_core::errors::{ErrorInfo, QfError};

/// Exact unit `a + b*sqrt(d)`, or `(a + b*sqrt(d))/2` when `half` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundamentalUnit {
    /// Rational coefficient numerator.
    pub a: BigInt,
    /// Irrational coefficient numerator.
    pub b: BigInt,
    /// Whether both numerators are over 2.
    pub half: bool,
    /// Radicand.
    pub d: u64,
}

impl FundamentalUnit {
    /// Builds `(x + y*sqrt(d)) / z`, bringing it to lowest form.
    ///
    /// Fails unless `2x/z` and `2y/z` are integers, which holds for every
    /// element of the maximal order.
    pub fn from_fraction(x: &BigInt, y: &BigInt, z: &BigInt, d: u64) -> Result<Self, QfError> {
        let two = BigInt::from(2);
        let twice_x = x * &two;
        let twice_y = y * &two;
        if z.is_zero() || !(&twice_x % z).is_zero() || !(&twice_y % z).is_zero() {
            return Err(QfError::Oracle(
                ErrorInfo::new("unit-not-integral", "unit is not in the maximal order")
                    .with_context("d", d.to_string()),
            ));
        }
        let a = twice_x / z;
        let b = twice_y / z;
        if (&a % &two).is_zero() && (&b % &two).is_zero() {
            Ok(Self {
                a: a / &two,
                b: b / &two,
                half: false,
                d,
            })
        } else {
            Ok(Self {
                a,
                b,
                half: true,
                d,
            })
        }
    }

    /// Returns the norm `N(e) = e * conj(e)`, or `None` when it is not an integer.
    pub fn norm(&self) -> Option<BigInt> {
        let raw = &self.a * &self.a - BigInt::from(self.d) * &self.b * &self.b;
        if !self.half {
            return Some(raw);
        }
        let four = BigInt::from(4);
        if (&raw % &four).is_zero() {
            Some(raw / four)
        } else {
            None
        }
    }

    /// Whether the value is a unit (norm +1 or -1).
    pub fn is_unit(&self) -> bool {
        self.norm()
            .map(|norm| norm.abs().is_one())
            .unwrap_or(false)
    }

    /// Natural logarithm of the (positive) real embedding.
    pub fn ln(&self) -> f64 {
        let sqrt_d = (self.d as f64).sqrt();
        let denom = if self.half { 2f64.ln() } else { 0.0 };
        if self.a.bits() < 900 && self.b.bits() < 900 {
            let a = to_f64(&self.a);
            let b = to_f64(&self.b);
            return (a + b * sqrt_d).ln() - denom;
        }
        // e is huge, so conj(e) = +-1/e vanishes and e ~ 2a.
        ln_big(&self.a) + 2f64.ln() - denom
    }
}

fn to_f64(value: &BigInt) -> f64 {
    num_traits::ToPrimitive::to_f64(value).unwrap_or(f64::INFINITY)
}

fn ln_big(value: &BigInt) -> f64 {
    let bits = value.bits();
    let shift = bits.saturating_sub(64);
    let top: BigInt = value >> shift;
    to_f64(&top).ln() + shift as f64 * 2f64.ln()
}

impl fmt::Display for FundamentalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.half {
            write!(f, "{}/2 + {}/2*sqrt({})", self.a, self.b, self.d)
        } else {
            write!(f, "{} + {}*sqrt({})", self.a, self.b, self.d)
        }
    }
}

impl FromStr for FundamentalUnit {
    type Err = QfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || {
            QfError::Serde(
                ErrorInfo::new("unit-parse", "expected 'a + b*sqrt(d)' or 'a/2 + b/2*sqrt(d)'")
                    .with_context("value", s),
            )
        };
        let (left, right) = s.trim().split_once(" + ").ok_or_else(malformed)?;
        let (coeff, radical) = right.split_once("*sqrt(").ok_or_else(malformed)?;
        let radicand = radical.strip_suffix(')').ok_or_else(malformed)?;
        let d: u64 = radicand.parse().map_err(|_| malformed())?;

        let (a_text, a_half) = split_half(left);
        let (b_text, b_half) = split_half(coeff);
        if a_half != b_half {
            return Err(malformed());
        }
        let a: BigInt = a_text.parse().map_err(|_| malformed())?;
        let b: BigInt = b_text.parse().map_err(|_| malformed())?;
        Ok(Self {
            a,
            b,
            half: a_half,
            d,
        })
    }
}

fn split_half(text: &str) -> (&str, bool) {
    match text.strip_suffix("/2") {
        Some(numerator) => (numerator, true),
        None => (text, false),
    }
}
