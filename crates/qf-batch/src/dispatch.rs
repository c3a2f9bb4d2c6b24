use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use qf_core::errors::{ErrorInfo, QfError};
use qf_core::{FieldIndex, InvariantOracle, InvariantRecord};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// What to do with a batch when the oracle fails for some of its indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Fail the whole batch; the run stops and the batch can be retried.
    #[default]
    Abort,
    /// Keep successful records and report the failed indices next to them.
    Skip,
}

/// Options governing one dispatch call.
#[derive(Debug, Clone)]
pub struct DispatchOpts {
    /// Number of worker threads in the pool built for this call.
    pub workers: usize,
    /// Indices handed to a worker per scheduling unit.
    pub chunk_size: usize,
    /// Extra attempts per index after the first failure.
    pub max_retries: u32,
    /// Batch-level reaction to oracle failures.
    pub failure_policy: FailurePolicy,
}

impl Default for DispatchOpts {
    fn default() -> Self {
        Self {
            workers: 1,
            chunk_size: 1000,
            max_retries: 0,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

/// An index the oracle could not compute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleFailure {
    /// Field index that failed.
    pub d: FieldIndex,
    /// Attempts made before giving up.
    pub attempts: u32,
    /// Last error reported by the oracle; panics surface as `oracle-panic`.
    pub error: QfError,
}

/// Records in completion order plus the indices that failed.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    /// One record per successful index, in the order workers completed them.
    pub records: IndexMap<FieldIndex, InvariantRecord>,
    /// Indices that failed under [`FailurePolicy::Skip`], sorted by `d`.
    pub failures: Vec<OracleFailure>,
}

fn config_error(code: &str, message: &str) -> QfError {
    QfError::Config(ErrorInfo::new(code, message))
}

/// Runs the oracle for every index on a pool of `opts.workers` threads.
///
/// The pool lives for this call only. Results are collected in completion
/// order; every input index ends up either in `records` or in `failures`.
pub fn dispatch<O>(
    indices: &[FieldIndex],
    oracle: &O,
    opts: &DispatchOpts,
) -> Result<DispatchOutcome, QfError>
where
    O: InvariantOracle + ?Sized,
{
    if opts.workers == 0 {
        return Err(config_error("workers", "worker count must be at least 1"));
    }
    if opts.chunk_size == 0 {
        return Err(config_error("chunk-size", "dispatch chunk size must be at least 1"));
    }
    let mut unique = HashSet::with_capacity(indices.len());
    if let Some(dup) = indices.iter().find(|d| !unique.insert(**d)) {
        return Err(QfError::Range(
            ErrorInfo::new("duplicate-index", "field index appears twice in one batch")
                .with_context("d", dup.to_string()),
        ));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.workers)
        .thread_name(|idx| format!("qf-worker-{idx}"))
        .build()
        .map_err(|err| config_error("thread-pool", &err.to_string()))?;

    let (tx, rx) = crossbeam_channel::unbounded();
    pool.install(|| {
        indices
            .par_chunks(opts.chunk_size)
            .for_each_with(tx, |tx, chunk| {
                debug!(
                    first = chunk.first().map(|d| d.get()),
                    len = chunk.len(),
                    "chunk started"
                );
                for &d in chunk {
                    let outcome = evaluate(oracle, d, opts.max_retries);
                    // The receiver outlives the pool, so sending cannot fail.
                    let _ = tx.send((d, outcome));
                }
            });
    });
    drop(pool);

    let mut records = IndexMap::with_capacity(indices.len());
    let mut failures = Vec::new();
    for (d, outcome) in rx.iter() {
        match outcome {
            Ok(record) => {
                if records.insert(d, record).is_some() {
                    return Err(duplicate_result(d));
                }
            }
            Err(failure) => failures.push(failure),
        }
    }
    failures.sort_by_key(|failure: &OracleFailure| failure.d);
    let mut failed = HashSet::with_capacity(failures.len());
    for failure in &failures {
        if records.contains_key(&failure.d) || !failed.insert(failure.d) {
            return Err(duplicate_result(failure.d));
        }
    }
    if records.len() + failures.len() != indices.len() {
        return Err(QfError::Oracle(
            ErrorInfo::new("missing-result", "dispatch lost field indices")
                .with_context("expected", indices.len().to_string())
                .with_context("received", (records.len() + failures.len()).to_string()),
        ));
    }

    if !failures.is_empty() {
        match opts.failure_policy {
            FailurePolicy::Abort => {
                let first = &failures[0];
                let cause = first.error.info();
                let mut info = ErrorInfo::new("oracle-failed", cause.message.clone());
                info.context = cause.context.clone();
                return Err(QfError::Oracle(
                    info.with_context("cause", cause.code.clone())
                        .with_context("d", first.d.to_string())
                        .with_context("failures", failures.len().to_string())
                        .with_hint("rerun the batch or use the skip failure policy"),
                ));
            }
            FailurePolicy::Skip => {
                for failure in &failures {
                    warn!(
                        d = failure.d.get(),
                        attempts = failure.attempts,
                        code = %failure.error.info().code,
                        error = %failure.error.info().message,
                        "oracle failed; index skipped"
                    );
                }
            }
        }
    }

    Ok(DispatchOutcome { records, failures })
}

fn duplicate_result(d: FieldIndex) -> QfError {
    QfError::Oracle(
        ErrorInfo::new("duplicate-result", "field index completed twice")
            .with_context("d", d.to_string()),
    )
}

fn evaluate<O>(oracle: &O, d: FieldIndex, max_retries: u32) -> Result<InvariantRecord, OracleFailure>
where
    O: InvariantOracle + ?Sized,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let error = match panic::catch_unwind(AssertUnwindSafe(|| oracle.invariants(d))) {
            Ok(Ok(invariants)) => return Ok(InvariantRecord::new(d, invariants)),
            Ok(Err(err)) => err,
            Err(payload) => QfError::Oracle(
                ErrorInfo::new("oracle-panic", panic_message(payload.as_ref()))
                    .with_context("d", d.to_string()),
            ),
        };
        if attempt > max_retries {
            return Err(OracleFailure {
                d,
                attempts: attempt,
                error,
            });
        }
        debug!(d = d.get(), attempt, error = %error.info(), "oracle failed; retrying");
        thread::sleep(RETRY_BACKOFF * attempt);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("oracle panicked: {text}")
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("oracle panicked: {text}")
    } else {
        "oracle panicked".to_string()
    }
}
