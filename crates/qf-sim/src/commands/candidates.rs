use std::error::Error;
use std::io::{self, BufWriter, Write};

use clap::Args;
use qf_batch::candidates;

#[derive(Args, Debug)]
pub struct CandidatesArgs {
    /// Inclusive lower bound.
    #[arg(long, default_value_t = 2)]
    pub from: u64,
    /// Exclusive upper bound.
    #[arg(long)]
    pub to: u64,
}

pub fn run(args: &CandidatesArgs) -> Result<(), Box<dyn Error>> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for d in candidates(args.from, args.to) {
        writeln!(out, "{d}")?;
    }
    out.flush()?;
    Ok(())
}
