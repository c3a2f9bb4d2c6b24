use std::error::Error;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{
    candidates::{self, CandidatesArgs},
    field::{self, FieldArgs},
    run::{self, PlanArgs, RunArgs},
    verify::{self, VerifyArgs},
};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "qf-sim", about = "Real quadratic field invariant survey CLI")]
struct Cli {
    /// Log debug events from the survey crates.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute invariants for the first N fields, one file per batch.
    Run(RunArgs),
    /// Write a validated parameter file without running it.
    Plan(PlanArgs),
    /// Print the admissible field indices of a raw range.
    Candidates(CandidatesArgs),
    /// Compute and print the invariants of a single field.
    Field(FieldArgs),
    /// Check an output directory against its run report.
    Verify(VerifyArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    match cli.command {
        Command::Run(args) => run::run(&args),
        Command::Plan(args) => run::plan(&args),
        Command::Candidates(args) => candidates::run(&args),
        Command::Field(args) => field::run(&args),
        Command::Verify(args) => verify::run(&args),
    }
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("qf=debug,warn")
        } else {
            EnvFilter::new("qf=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
