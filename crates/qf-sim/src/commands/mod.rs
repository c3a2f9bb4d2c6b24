pub mod candidates;
pub mod field;
pub mod run;
pub mod verify;

use std::path::PathBuf;

use clap::Args;
use qf_oracle::OracleSpec;

/// Oracle selection shared by the commands that compute invariants.
#[derive(Args, Debug, Clone, Default)]
pub struct OracleArgs {
    /// External program printing `dK,hK,fu,rK,mb` for the index given as its last argument.
    #[arg(long, value_name = "PROG")]
    pub oracle_cmd: Option<PathBuf>,
    /// Arguments passed to the oracle program before the index.
    #[arg(last = true, value_name = "ARGS")]
    pub oracle_args: Vec<String>,
}

impl OracleArgs {
    /// The oracle named on the command line, if any.
    pub fn spec(&self) -> Option<OracleSpec> {
        self.oracle_cmd.as_ref().map(|program| OracleSpec::Command {
            program: program.clone(),
            args: self.oracle_args.clone(),
        })
    }
}
