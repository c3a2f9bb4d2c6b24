use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use qf_core::errors::{ErrorInfo, QfError};
use qf_core::{FieldIndex, InvariantOracle, RunProvenance};
use tracing::{debug, info};

use crate::dispatch::{dispatch, DispatchOpts};
use crate::enumerate::{candidates, take_fields};
use crate::params::{load_params, RunParams, Sizing};
use crate::report::{BatchReport, RunReport, RUN_REPORT_FILE};
use crate::serde::to_canonical_json_bytes;
use crate::writer::{batch_file_name, failures_file_name, write_batch, write_failures, WriteOpts};

fn io_error(code: &str, path: &Path, err: impl ToString) -> QfError {
    QfError::Io(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
    )
}

/// One contiguous slice of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 1-based batch number.
    pub index: usize,
    /// Number of batches in the run.
    pub total: usize,
    /// First raw integer covered.
    pub start: u64,
    /// Exclusive raw upper bound.
    pub end: u64,
    /// Field indices in `[start, end)`, ascending.
    pub indices: Vec<FieldIndex>,
}

impl Batch {
    /// Progress label `"index/total"`.
    pub fn label(&self) -> String {
        format!("{}/{}", self.index, self.total)
    }
}

/// Lazily yields the batches of a run.
///
/// Each batch starts where the previous one ended; its indices are only
/// enumerated when the batch is requested.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    sizing: Sizing,
    batch_size: u64,
    next_start: u64,
    remaining: u64,
    produced: usize,
    total: usize,
}

impl BatchPlan {
    /// Plans the batches of validated parameters.
    pub fn new(params: &RunParams) -> Result<Self, QfError> {
        params.validate()?;
        let batch_size = params.batch_size();
        let total = params.total_fields.div_ceil(batch_size);
        let total = usize::try_from(total).map_err(|_| {
            QfError::Range(
                ErrorInfo::new("batch-count", "too many batches")
                    .with_context("batches", total.to_string()),
            )
        })?;
        Ok(Self {
            sizing: params.sizing,
            batch_size,
            next_start: params.start,
            remaining: params.total_fields,
            produced: 0,
            total,
        })
    }

    /// Number of batches the plan yields.
    pub fn total(&self) -> usize {
        self.total
    }
}

impl Iterator for BatchPlan {
    type Item = Result<Batch, QfError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let size = self.batch_size.min(self.remaining);
        let start = self.next_start;
        let (indices, end) = match self.sizing {
            Sizing::Fields => match take_fields(start, size) {
                Ok(taken) => taken,
                Err(err) => {
                    self.remaining = 0;
                    return Some(Err(err));
                }
            },
            Sizing::Raw => {
                let end = start + size;
                (candidates(start, end).collect(), end)
            }
        };
        self.remaining -= size;
        self.next_start = end;
        self.produced += 1;
        Some(Ok(Batch {
            index: self.produced,
            total: self.total,
            start,
            end,
            indices,
        }))
    }
}

/// Runs every batch of `params` through `oracle`, writing one file per batch.
///
/// Batches are processed strictly one after another. `progress` is called
/// after each batch file has been written. On error the run stops; files of
/// completed batches stay on disk and the error names the failing batch.
/// A report left by an earlier run in the same directory is removed before
/// the first batch, so only a finished run leaves `run_report.json` behind.
pub fn run<O, F>(params: &RunParams, oracle: &O, mut progress: F) -> Result<RunReport, QfError>
where
    O: InvariantOracle + ?Sized,
    F: FnMut(&BatchReport),
{
    let params = &params.resolved();
    let plan = BatchPlan::new(params)?;
    let total = plan.total();
    let out = params.output.dir.as_path();
    fs::create_dir_all(out).map_err(|err| io_error("out-dir", out, err))?;
    let report_path = out.join(RUN_REPORT_FILE);
    remove_stale(&report_path, "run-report-remove")?;

    let provenance = RunProvenance::new(
        params.params_hash()?,
        oracle.name(),
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    )
    .with_tool("qf-batch", env!("CARGO_PKG_VERSION"));
    let opts = params.dispatch_opts();
    let write_opts = params.output.write_opts();
    info!(
        total_fields = params.total_fields,
        batches = total,
        batch_size = params.batch_size(),
        workers = opts.workers,
        oracle = oracle.name(),
        "run started"
    );

    let mut batches = Vec::with_capacity(total);
    for (position, batch) in plan.enumerate() {
        let label = format!("{}/{}", position + 1, total);
        let report = batch
            .and_then(|batch| run_batch(params, oracle, &opts, &write_opts, batch))
            .map_err(|err| err.with_context("batch", label.clone()))?;
        info!(
            batch = %label,
            records = report.records,
            failures = report.failures,
            file = %report.file,
            "batch written"
        );
        progress(&report);
        batches.push(report);
    }

    let report = RunReport::new(params.clone(), provenance, batches);
    let bytes = to_canonical_json_bytes(&report)?;
    fs::write(&report_path, bytes)
        .map_err(|err| io_error("run-report-write", &report_path, err))?;
    info!(
        records = report.total_records,
        failures = report.total_failures,
        "run finished"
    );
    Ok(report)
}

/// Loads parameters from a YAML file and runs them with the oracle they name.
pub fn run_from_path<F>(params_path: &Path, progress: F) -> Result<RunReport, QfError>
where
    F: FnMut(&BatchReport),
{
    let params = load_params(params_path)?;
    let oracle = params.oracle.build()?;
    run(&params, oracle.as_ref(), progress)
}

fn run_batch<O>(
    params: &RunParams,
    oracle: &O,
    opts: &DispatchOpts,
    write_opts: &WriteOpts,
    batch: Batch,
) -> Result<BatchReport, QfError>
where
    O: InvariantOracle + ?Sized,
{
    debug!(
        batch = %batch.label(),
        start = batch.start,
        end = batch.end,
        fields = batch.indices.len(),
        "batch planned"
    );
    let outcome = dispatch(&batch.indices, oracle, opts)?;
    let output = &params.output;
    let file = batch_file_name(&output.prefix, batch.index, batch.total, output.format);
    let sha256 = write_batch(&output.dir.join(&file), outcome.records.values(), write_opts)?;
    let name = failures_file_name(&output.prefix, batch.index, batch.total);
    let failures_path = output.dir.join(&name);
    let failures_file = if outcome.failures.is_empty() {
        remove_stale(&failures_path, "failures-remove")?;
        None
    } else {
        write_failures(&failures_path, &outcome.failures)?;
        Some(name)
    };
    Ok(BatchReport {
        index: batch.index,
        total: batch.total,
        start: batch.start,
        end: batch.end,
        fields: batch.indices.len() as u64,
        records: outcome.records.len() as u64,
        failures: outcome.failures.len() as u64,
        file,
        sha256,
        failures_file,
    })
}

fn remove_stale(path: &Path, code: &str) -> Result<(), QfError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale output");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_error(code, path, err)),
    }
}
