use std::error::Error;
use std::io;

use clap::Args;
use qf_core::{FieldIndex, InvariantOracle, InvariantRecord};

use super::OracleArgs;

#[derive(Args, Debug)]
pub struct FieldArgs {
    /// Squarefree integer d >= 2 naming Q(sqrt(d)).
    #[arg(long)]
    pub d: u64,
    #[command(flatten)]
    pub oracle: OracleArgs,
}

pub fn run(args: &FieldArgs) -> Result<(), Box<dyn Error>> {
    let d = FieldIndex::new(args.d)?;
    let oracle = args.oracle.spec().unwrap_or_default().build()?;
    let record = InvariantRecord::new(d, oracle.invariants(d)?);
    let mut wtr = csv::Writer::from_writer(io::stdout());
    wtr.write_record(InvariantRecord::HEADER)?;
    wtr.write_record(record.to_row())?;
    wtr.flush()?;
    Ok(())
}
