use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread;

use qf_core::errors::{ErrorInfo, QfError};
use qf_core::FieldIndex;
use qf_oracle::OracleSpec;
use serde::{Deserialize, Serialize};

use crate::dispatch::{DispatchOpts, FailurePolicy};
use crate::hash::stable_hash_string;
use crate::serde::{from_yaml_slice, to_yaml_string};
use crate::writer::{OutputFormat, WriteOpts};

fn range_error(code: &str, message: &str, key: &str, value: impl ToString) -> QfError {
    QfError::Range(ErrorInfo::new(code, message).with_context(key, value.to_string()))
}

fn config_error(code: &str, message: &str, key: &str, value: impl ToString) -> QfError {
    QfError::Config(ErrorInfo::new(code, message).with_context(key, value.to_string()))
}

/// How `total_fields` and the batch size are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Sizing {
    /// Counts are numbers of fields; every batch but the last holds exactly `B` fields.
    #[default]
    Fields,
    /// Counts are spans of raw integers, filtered to squarefree values per batch.
    Raw,
}

/// Where and how batch files are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Directory receiving batch files and the run report.
    #[serde(default = "OutputSpec::default_dir")]
    pub dir: PathBuf,
    /// File name prefix for batch files.
    #[serde(default = "OutputSpec::default_prefix")]
    pub prefix: String,
    /// Serialization format of batch files.
    #[serde(default)]
    pub format: OutputFormat,
    /// Sort rows by `d` instead of keeping completion order.
    #[serde(default)]
    pub sort_rows: bool,
}

impl OutputSpec {
    fn default_dir() -> PathBuf {
        PathBuf::from("invariants")
    }

    fn default_prefix() -> String {
        "invariants".to_string()
    }

    /// Writer options derived from this spec.
    pub fn write_opts(&self) -> WriteOpts {
        WriteOpts {
            format: self.format,
            sort_rows: self.sort_rows,
        }
    }
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            prefix: Self::default_prefix(),
            format: OutputFormat::default(),
            sort_rows: false,
        }
    }
}

/// Parameters of one survey run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParams {
    /// Number of fields (or raw integers, see [`Sizing`]) to process.
    pub total_fields: u64,
    /// First raw integer considered.
    #[serde(default = "RunParams::default_start")]
    pub start: u64,
    /// Worker pool size; the host's available parallelism when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Batch size contributed by each worker.
    #[serde(default = "RunParams::default_batch_size_per_worker")]
    pub batch_size_per_worker: u64,
    /// Indices handed to a worker per scheduling unit.
    #[serde(default = "RunParams::default_dispatch_chunk_size")]
    pub dispatch_chunk_size: usize,
    /// Counting mode for `total_fields` and batch sizes.
    #[serde(default)]
    pub sizing: Sizing,
    /// Extra oracle attempts per index.
    #[serde(default)]
    pub max_retries: u32,
    /// Reaction to oracle failures.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Oracle used to compute invariants.
    #[serde(default)]
    pub oracle: OracleSpec,
    /// Output configuration.
    #[serde(default)]
    pub output: OutputSpec,
}

impl RunParams {
    /// Default batch size per worker.
    pub const DEFAULT_BATCH_SIZE_PER_WORKER: u64 = 10_000;
    /// Default dispatch chunk size.
    pub const DEFAULT_DISPATCH_CHUNK_SIZE: usize = 1_000;
    /// Largest accepted per-index retry count.
    pub const MAX_RETRIES: u32 = 5;

    fn default_start() -> u64 {
        2
    }

    fn default_batch_size_per_worker() -> u64 {
        Self::DEFAULT_BATCH_SIZE_PER_WORKER
    }

    fn default_dispatch_chunk_size() -> usize {
        Self::DEFAULT_DISPATCH_CHUNK_SIZE
    }

    /// Parameters for `total_fields` with every other value defaulted.
    pub fn new(total_fields: u64) -> Self {
        Self {
            total_fields,
            start: Self::default_start(),
            workers: None,
            batch_size_per_worker: Self::DEFAULT_BATCH_SIZE_PER_WORKER,
            dispatch_chunk_size: Self::DEFAULT_DISPATCH_CHUNK_SIZE,
            sizing: Sizing::default(),
            max_retries: 0,
            failure_policy: FailurePolicy::default(),
            oracle: OracleSpec::default(),
            output: OutputSpec::default(),
        }
    }

    /// Worker count, resolving the host default.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        })
    }

    /// Copy with `workers` pinned to [`Self::worker_count`].
    pub fn resolved(&self) -> Self {
        Self {
            workers: Some(self.worker_count()),
            ..self.clone()
        }
    }

    /// Batch size `B = W * batch_size_per_worker`.
    pub fn batch_size(&self) -> u64 {
        (self.worker_count() as u64).saturating_mul(self.batch_size_per_worker)
    }

    /// Dispatcher options derived from these parameters.
    pub fn dispatch_opts(&self) -> DispatchOpts {
        DispatchOpts {
            workers: self.worker_count(),
            chunk_size: self.dispatch_chunk_size,
            max_retries: self.max_retries,
            failure_policy: self.failure_policy,
        }
    }

    /// Rejects parameters that cannot describe a run before any work starts.
    pub fn validate(&self) -> Result<(), QfError> {
        if self.total_fields == 0 {
            return Err(range_error(
                "total-fields",
                "total number of fields must be positive",
                "total_fields",
                self.total_fields,
            ));
        }
        if self.start < 2 {
            return Err(range_error(
                "start",
                "enumeration starts at 2 or later",
                "start",
                self.start,
            ));
        }
        let last = self
            .start
            .checked_add(self.total_fields - 1)
            .filter(|last| *last <= FieldIndex::MAX);
        if last.is_none() {
            return Err(QfError::Range(
                ErrorInfo::new("range-overflow", "requested range exceeds supported indices")
                    .with_context("start", self.start.to_string())
                    .with_context("total_fields", self.total_fields.to_string())
                    .with_context("max", FieldIndex::MAX.to_string()),
            ));
        }
        if self.workers == Some(0) {
            return Err(config_error(
                "workers",
                "worker count must be at least 1",
                "workers",
                0,
            ));
        }
        if self.batch_size_per_worker == 0 {
            return Err(config_error(
                "batch-size",
                "batch size per worker must be at least 1",
                "batch_size_per_worker",
                0,
            ));
        }
        if self.dispatch_chunk_size == 0 {
            return Err(config_error(
                "chunk-size",
                "dispatch chunk size must be at least 1",
                "dispatch_chunk_size",
                0,
            ));
        }
        if self.max_retries > Self::MAX_RETRIES {
            return Err(config_error(
                "max-retries",
                "retry count is bounded",
                "max_retries",
                self.max_retries,
            ));
        }
        if self.output.prefix.is_empty() || self.output.prefix.contains(['/', '\\']) {
            return Err(config_error(
                "output-prefix",
                "output prefix must be a plain file name",
                "prefix",
                &self.output.prefix,
            ));
        }
        Ok(())
    }

    /// Canonical hash of the parameters.
    pub fn params_hash(&self) -> Result<String, QfError> {
        stable_hash_string(self)
    }

    /// YAML representation suitable for `load_params`.
    pub fn to_yaml_string(&self) -> Result<String, QfError> {
        to_yaml_string(self)
    }
}

/// Loads run parameters from a YAML file.
pub fn load_params<P: AsRef<Path>>(path: P) -> Result<RunParams, QfError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|err| {
        QfError::Config(
            ErrorInfo::new("params-read", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })?;
    from_yaml_slice(&bytes).map_err(|err| err.with_context("path", path.display().to_string()))
}
