#![deny(missing_docs)]
#![doc = "Batch-parallel survey of real quadratic field invariants: enumeration, dispatch and output."]

/// Sequential batch controller.
pub mod batch;
/// Parallel oracle dispatch over a scoped worker pool.
pub mod dispatch;
/// Squarefree candidate enumeration.
pub mod enumerate;
/// Canonical hashing helpers.
pub mod hash;
/// Run parameters and their YAML form.
pub mod params;
/// Run reports and output verification.
pub mod report;
/// Canonical JSON serde helpers.
pub mod serde;
/// Batch file writers and readers.
pub mod writer;

pub use batch::{run, run_from_path, Batch, BatchPlan};
pub use dispatch::{dispatch, DispatchOpts, DispatchOutcome, FailurePolicy, OracleFailure};
pub use enumerate::{candidates, take_fields, Candidates};
pub use params::{load_params, OutputSpec, RunParams, Sizing};
pub use report::{verify_run, BatchReport, RunReport, VerifySummary, RUN_REPORT_FILE};
pub use writer::{
    batch_file_name, failures_file_name, read_batch, read_batch_csv, render_batch, write_batch,
    write_failures, OutputFormat, WriteOpts,
};
