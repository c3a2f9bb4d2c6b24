//! Narrow class numbers from cycles of reduced indefinite binary quadratic forms.

use std::collections::HashSet;

use num_integer::Integer;
use qf_core::errors::{ErrorInfo, QfError};

use crate::continued::isqrt;

/// Binary quadratic form `a x^2 + b xy + c y^2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Form {
    /// Leading coefficient.
    pub a: i128,
    /// Middle coefficient.
    pub b: i128,
    /// Trailing coefficient.
    pub c: i128,
}

impl Form {
    /// Discriminant `b^2 - 4ac`.
    pub fn discriminant(&self) -> i128 {
        self.b * self.b - 4 * self.a * self.c
    }

    fn is_primitive(&self) -> bool {
        self.a.gcd(&self.b).gcd(&self.c) == 1
    }

    /// Reduction operator: the unique reduced neighbour `(c, b', a')`.
    ///
    /// `b'` is the representative of `-b mod 2|c|` in `(sqrt(D) - 2|c|, sqrt(D))`.
    pub fn rho(&self, disc: i128, root: i128) -> Self {
        let modulus = 2 * self.c.abs();
        let residue = (-self.b).rem_euclid(modulus);
        let b = root - (root - residue).rem_euclid(modulus);
        let a = (b * b - disc) / (4 * self.c);
        Self { a: self.c, b, c: a }
    }
}

/// Enumerates the reduced primitive forms of a positive non-square discriminant.
///
/// Reduced means `0 < b < sqrt(D)` and `sqrt(D) - b < 2|a| < sqrt(D) + b`.
pub fn reduced_forms(disc: i64) -> Vec<Form> {
    let disc = disc as i128;
    let root = isqrt(disc);
    let mut forms = Vec::new();
    let mut b = if disc % 2 == 0 { 2 } else { 1 };
    while b <= root {
        let product = (disc - b * b) / 4;
        let lo = ((root - b + 2) / 2).max(1);
        let hi = (root + b) / 2;
        for m in lo..=hi {
            if product % m != 0 {
                continue;
            }
            let c = product / m;
            for form in [Form { a: m, b, c: -c }, Form { a: -m, b, c }] {
                if form.is_primitive() {
                    forms.push(form);
                }
            }
        }
        b += 2;
    }
    forms
}

/// Counts the rho-cycles of reduced primitive forms, the narrow class number.
pub fn narrow_class_number(disc: i64) -> Result<u64, QfError> {
    let forms = reduced_forms(disc);
    let wide = disc as i128;
    let root = isqrt(wide);
    let all: HashSet<Form> = forms.iter().copied().collect();
    let mut seen: HashSet<Form> = HashSet::with_capacity(all.len());
    let mut cycles = 0u64;
    for start in &forms {
        if seen.contains(start) {
            continue;
        }
        cycles += 1;
        let mut current = *start;
        loop {
            seen.insert(current);
            current = current.rho(wide, root);
            if !all.contains(&current) {
                return Err(QfError::Oracle(
                    ErrorInfo::new("form-cycle", "reduction left the set of reduced forms")
                        .with_context("discriminant", disc.to_string())
                        .with_context(
                            "form",
                            format!("({}, {}, {})", current.a, current.b, current.c),
                        ),
                ));
            }
            if current == *start {
                break;
            }
            if seen.contains(&current) {
                return Err(QfError::Oracle(
                    ErrorInfo::new("form-cycle", "reduction cycles do not partition the forms")
                        .with_context("discriminant", disc.to_string()),
                ));
            }
        }
    }
    Ok(cycles)
}
