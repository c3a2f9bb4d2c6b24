use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use qf_core::errors::{ErrorInfo, QfError};
use qf_core::{FieldIndex, RunProvenance};
use serde::{Deserialize, Serialize};

use crate::enumerate::candidates;
use crate::hash::sha256_hex;
use crate::params::{RunParams, Sizing};
use crate::serde::from_json_slice;
use crate::writer::read_batch;

/// File name of the run report inside the output directory.
pub const RUN_REPORT_FILE: &str = "run_report.json";

fn io_error(code: &str, path: &Path, err: impl ToString) -> QfError {
    QfError::Io(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
    )
}

fn verify_error(code: &str, message: &str, batch: &BatchReport) -> QfError {
    QfError::Serde(
        ErrorInfo::new(code, message)
            .with_context("batch", format!("{}/{}", batch.index, batch.total))
            .with_context("file", batch.file.clone()),
    )
}

/// Outcome of one written batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// 1-based batch number.
    pub index: usize,
    /// Number of batches in the run.
    pub total: usize,
    /// First raw integer covered by the batch.
    pub start: u64,
    /// Exclusive raw upper bound of the batch.
    pub end: u64,
    /// Field indices dispatched.
    pub fields: u64,
    /// Rows written.
    pub records: u64,
    /// Indices skipped after oracle failures.
    pub failures: u64,
    /// Batch file name, relative to the output directory.
    pub file: String,
    /// SHA256 of the batch file contents.
    pub sha256: String,
    /// Failures file name, present only when indices were skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failures_file: Option<String>,
}

/// Summary written to `run_report.json` after a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Parameters driving the run.
    pub params: RunParams,
    /// Provenance metadata.
    pub provenance: RunProvenance,
    /// Per-batch results in batch order.
    pub batches: Vec<BatchReport>,
    /// Rows written across all batches.
    pub total_records: u64,
    /// Indices skipped across all batches.
    pub total_failures: u64,
}

impl RunReport {
    /// Builds the report and its totals.
    pub fn new(params: RunParams, provenance: RunProvenance, batches: Vec<BatchReport>) -> Self {
        let total_records = batches.iter().map(|batch| batch.records).sum();
        let total_failures = batches.iter().map(|batch| batch.failures).sum();
        Self {
            params,
            provenance,
            batches,
            total_records,
            total_failures,
        }
    }

    /// Loads `run_report.json` from an output directory.
    pub fn load(dir: &Path) -> Result<Self, QfError> {
        let path = dir.join(RUN_REPORT_FILE);
        let bytes = fs::read(&path).map_err(|err| io_error("run-report-read", &path, err))?;
        from_json_slice(&bytes)
    }
}

/// Counts gathered while verifying an output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VerifySummary {
    /// Batch files checked.
    pub batches: usize,
    /// Rows read back.
    pub records: u64,
    /// Skipped indices listed in failure files.
    pub failures: u64,
}

/// Re-reads a finished run and checks it against its report.
///
/// Every batch file must hash to the recorded digest, and its rows plus any
/// listed failures must be exactly the field indices of the batch's raw range.
/// Consecutive batches must be contiguous and together cover the run.
pub fn verify_run(dir: &Path) -> Result<VerifySummary, QfError> {
    let report = RunReport::load(dir)?;
    let params = &report.params;
    let mut summary = VerifySummary::default();
    let mut seen: HashSet<FieldIndex> = HashSet::new();
    let mut expected_start = params.start;
    let mut planned_fields = 0u64;

    for batch in &report.batches {
        if batch.start != expected_start {
            return Err(verify_error("verify-gap", "batch does not continue the previous one", batch)
                .with_context("expected_start", expected_start.to_string())
                .with_context("start", batch.start.to_string()));
        }
        expected_start = batch.end;
        planned_fields += batch.fields;

        let path = dir.join(&batch.file);
        let bytes = fs::read(&path).map_err(|err| io_error("batch-read", &path, err))?;
        if sha256_hex(&bytes) != batch.sha256 {
            return Err(verify_error("verify-hash", "batch file hash does not match the report", batch));
        }
        let records = read_batch(&path, params.output.format)?;
        if records.len() as u64 != batch.records {
            return Err(verify_error("verify-count", "row count does not match the report", batch)
                .with_context("rows", records.len().to_string()));
        }

        let mut covered: BTreeSet<FieldIndex> = records.iter().map(|record| record.d).collect();
        if covered.len() != records.len() {
            return Err(verify_error("verify-duplicate", "batch file repeats a field index", batch));
        }
        if let Some(name) = &batch.failures_file {
            let failed = read_failure_indices(&dir.join(name))?;
            if failed.len() as u64 != batch.failures {
                return Err(verify_error("verify-count", "failure count does not match the report", batch));
            }
            for d in failed {
                if !covered.insert(d) {
                    return Err(verify_error("verify-duplicate", "field index both written and failed", batch)
                        .with_context("d", d.to_string()));
                }
            }
            summary.failures += batch.failures;
        }

        let expected: BTreeSet<FieldIndex> = candidates(batch.start, batch.end).collect();
        if covered != expected {
            let stray = covered.symmetric_difference(&expected).next().copied();
            return Err(verify_error("verify-coverage", "batch does not cover its range exactly", batch)
                .with_context("d", stray.map(|d| d.to_string()).unwrap_or_default()));
        }
        for d in &covered {
            if !seen.insert(*d) {
                return Err(verify_error("verify-overlap", "field index appears in two batches", batch)
                    .with_context("d", d.to_string()));
            }
        }
        summary.batches += 1;
        summary.records += batch.records;
    }

    let complete = match params.sizing {
        Sizing::Fields => planned_fields == params.total_fields,
        Sizing::Raw => expected_start == params.start.saturating_add(params.total_fields),
    };
    if !complete {
        return Err(QfError::Serde(
            ErrorInfo::new("verify-incomplete", "batches do not cover the requested run")
                .with_context("batches", report.batches.len().to_string())
                .with_context("total_fields", params.total_fields.to_string()),
        ));
    }
    Ok(summary)
}

fn read_failure_indices(path: &Path) -> Result<Vec<FieldIndex>, QfError> {
    let bytes = fs::read(path).map_err(|err| io_error("failures-read", path, err))?;
    let mut rdr = csv::Reader::from_reader(bytes.as_slice());
    rdr.records()
        .map(|row| {
            let row = row.map_err(|err| QfError::Serde(ErrorInfo::new("csv-read", err.to_string())))?;
            let raw = row.get(0).unwrap_or_default();
            let d: u64 = raw.parse().map_err(|_| {
                QfError::Serde(
                    ErrorInfo::new("row-parse", "malformed failure row")
                        .with_context("path", path.display().to_string())
                        .with_context("value", raw),
                )
            })?;
            FieldIndex::new(d)
        })
        .collect()
}
