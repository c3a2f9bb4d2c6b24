use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::{Args, ValueEnum};
use qf_batch::{load_params, FailurePolicy, OutputFormat, RunParams, Sizing};
use qf_core::errors::{ErrorInfo, QfError};
use tracing::info;

use super::OracleArgs;

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum SizingArg {
    Fields,
    Raw,
}

impl From<SizingArg> for Sizing {
    fn from(value: SizingArg) -> Self {
        match value {
            SizingArg::Fields => Sizing::Fields,
            SizingArg::Raw => Sizing::Raw,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum PolicyArg {
    Abort,
    Skip,
}

impl From<PolicyArg> for FailurePolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Abort => FailurePolicy::Abort,
            PolicyArg::Skip => FailurePolicy::Skip,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum FormatArg {
    Csv,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Csv => OutputFormat::Csv,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

/// Run parameters from an optional YAML file, overridden by flags.
#[derive(Args, Debug, Clone)]
pub struct ParamArgs {
    /// YAML parameter file; flags below override its values.
    #[arg(long)]
    pub params: Option<PathBuf>,
    /// Number of fields (raw integers with `--sizing raw`) to process.
    #[arg(long)]
    pub total_fields: Option<u64>,
    /// First raw integer considered.
    #[arg(long)]
    pub start: Option<u64>,
    /// Worker threads; defaults to the available parallelism.
    #[arg(long)]
    pub workers: Option<usize>,
    /// Batch size contributed by each worker.
    #[arg(long)]
    pub batch_size_per_worker: Option<u64>,
    /// Indices handed to a worker at a time.
    #[arg(long)]
    pub chunk_size: Option<usize>,
    /// Whether counts refer to fields or raw integers.
    #[arg(long, value_enum)]
    pub sizing: Option<SizingArg>,
    /// Reaction to oracle failures.
    #[arg(long, value_enum)]
    pub on_failure: Option<PolicyArg>,
    /// Extra oracle attempts per index.
    #[arg(long)]
    pub retries: Option<u32>,
    /// Output directory.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Batch file name prefix.
    #[arg(long)]
    pub prefix: Option<String>,
    /// Batch file format.
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,
    /// Sort rows by field index.
    #[arg(long, default_value_t = false)]
    pub sort: bool,
    #[command(flatten)]
    pub oracle: OracleArgs,
}

impl ParamArgs {
    /// Resolves the effective parameters.
    pub fn resolve(&self) -> Result<RunParams, QfError> {
        let mut params = match (&self.params, self.total_fields) {
            (Some(path), _) => load_params(path)?,
            (None, Some(total)) => RunParams::new(total),
            (None, None) => {
                return Err(QfError::Config(
                    ErrorInfo::new("total-fields", "number of fields is required")
                        .with_hint("pass --total-fields or --params"),
                ))
            }
        };
        if let Some(total) = self.total_fields {
            params.total_fields = total;
        }
        if let Some(start) = self.start {
            params.start = start;
        }
        if let Some(workers) = self.workers {
            params.workers = Some(workers);
        }
        if let Some(size) = self.batch_size_per_worker {
            params.batch_size_per_worker = size;
        }
        if let Some(chunk) = self.chunk_size {
            params.dispatch_chunk_size = chunk;
        }
        if let Some(sizing) = self.sizing {
            params.sizing = sizing.into();
        }
        if let Some(policy) = self.on_failure {
            params.failure_policy = policy.into();
        }
        if let Some(retries) = self.retries {
            params.max_retries = retries;
        }
        if let Some(out) = &self.out {
            params.output.dir = out.clone();
        }
        if let Some(prefix) = &self.prefix {
            params.output.prefix = prefix.clone();
        }
        if let Some(format) = self.format {
            params.output.format = format.into();
        }
        if self.sort {
            params.output.sort_rows = true;
        }
        if let Some(spec) = self.oracle.spec() {
            params.oracle = spec;
        }
        params.validate()?;
        Ok(params)
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub params: ParamArgs,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Destination of the parameter YAML file.
    #[arg(long = "write", value_name = "PATH")]
    pub output: PathBuf,
    #[command(flatten)]
    pub params: ParamArgs,
}

pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let params = args.params.resolve()?;
    let oracle = params.oracle.build()?;
    let report = qf_batch::run(&params, oracle.as_ref(), |batch| {
        println!("Batch {}/{} done", batch.index, batch.total);
    })?;
    info!(
        dir = %params.output.dir.display(),
        batches = report.batches.len(),
        records = report.total_records,
        failures = report.total_failures,
        "survey written"
    );
    Ok(())
}

pub fn plan(args: &PlanArgs) -> Result<(), Box<dyn Error>> {
    let params = args.params.resolve()?;
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&args.output, params.to_yaml_string()?)?;
    info!(
        path = %args.output.display(),
        params_hash = %params.params_hash()?,
        "parameters written"
    );
    Ok(())
}
