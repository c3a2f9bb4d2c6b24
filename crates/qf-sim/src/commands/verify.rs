use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use qf_batch::verify_run;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Output directory holding `run_report.json` and the batch files.
    #[arg(long)]
    pub dir: PathBuf,
}

pub fn run(args: &VerifyArgs) -> Result<(), Box<dyn Error>> {
    let summary = verify_run(&args.dir)?;
    println!(
        "verified {} batches: {} records, {} failures",
        summary.batches, summary.records, summary.failures
    );
    Ok(())
}
