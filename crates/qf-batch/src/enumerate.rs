use qf_core::errors::{ErrorInfo, QfError};
use qf_core::FieldIndex;

const WINDOW: u64 = 1 << 15;

fn isqrt(n: u64) -> u64 {
    let mut x = (n as f64).sqrt() as u64;
    while x.saturating_mul(x) > n {
        x -= 1;
    }
    while (x + 1).saturating_mul(x + 1) <= n {
        x += 1;
    }
    x
}

/// Primes whose squares are needed to sieve up to a growing bound.
#[derive(Debug, Default)]
struct SquarePrimes {
    primes: Vec<u64>,
    limit: u64,
}

impl SquarePrimes {
    fn ensure(&mut self, limit: u64) {
        if limit <= self.limit {
            return;
        }
        let limit = limit.max(self.limit.saturating_mul(2)).max(64);
        let size = limit as usize + 1;
        let mut composite = vec![false; size];
        let mut primes = Vec::new();
        for n in 2..size {
            if composite[n] {
                continue;
            }
            primes.push(n as u64);
            let mut multiple = n * n;
            while multiple < size {
                composite[multiple] = true;
                multiple += n;
            }
        }
        self.primes = primes;
        self.limit = limit;
    }
}

/// Lazy, finite sequence of admissible field indices in `[lo, hi)`.
///
/// Backed by a segmented sieve: each window strikes out multiples of `p^2`
/// for every prime `p` with `p^2` inside the window.
#[derive(Debug)]
pub struct Candidates {
    primes: SquarePrimes,
    hi: u64,
    window_lo: u64,
    window: Vec<bool>,
    cursor: usize,
}

/// Squarefree integers in `[lo, hi)`, excluding 0 and 1.
pub fn candidates(lo: u64, hi: u64) -> Candidates {
    let lo = lo.max(2);
    let hi = hi.min(FieldIndex::MAX + 1);
    Candidates {
        primes: SquarePrimes::default(),
        hi,
        window_lo: lo,
        window: Vec::new(),
        cursor: 0,
    }
}

impl Candidates {
    fn fill(&mut self, lo: u64) {
        let hi = lo.saturating_add(WINDOW).min(self.hi);
        let mut window = vec![true; (hi - lo) as usize];
        self.primes.ensure(isqrt(hi - 1));
        for &p in &self.primes.primes {
            let square = p * p;
            if square >= hi {
                break;
            }
            let mut multiple = lo.div_ceil(square) * square;
            while multiple < hi {
                window[(multiple - lo) as usize] = false;
                multiple += square;
            }
        }
        self.window_lo = lo;
        self.window = window;
        self.cursor = 0;
    }
}

impl Iterator for Candidates {
    type Item = FieldIndex;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            while self.cursor < self.window.len() {
                let offset = self.cursor;
                self.cursor += 1;
                if self.window[offset] {
                    return Some(FieldIndex::new_unchecked(self.window_lo + offset as u64));
                }
            }
            let next_lo = self.window_lo + self.window.len() as u64;
            if next_lo >= self.hi {
                return None;
            }
            self.fill(next_lo);
        }
    }
}

/// Takes the first `count` field indices `>= start`.
///
/// Returns them with the exclusive raw bound one past the last index taken,
/// which is where the next batch starts.
pub fn take_fields(start: u64, count: u64) -> Result<(Vec<FieldIndex>, u64), QfError> {
    let indices: Vec<FieldIndex> = candidates(start, FieldIndex::MAX + 1)
        .take(count as usize)
        .collect();
    if (indices.len() as u64) < count {
        return Err(QfError::Range(
            ErrorInfo::new("range-exhausted", "not enough field indices below the maximum")
                .with_context("start", start.to_string())
                .with_context("requested", count.to_string())
                .with_context("found", indices.len().to_string()),
        ));
    }
    let end = indices
        .last()
        .map(|last| last.get() + 1)
        .unwrap_or_else(|| start.max(2));
    Ok((indices, end))
}
