use std::path::PathBuf;
use std::sync::Arc;

use qf_core::errors::{ErrorInfo, QfError};
use qf_core::InvariantOracle;
use serde::{Deserialize, Serialize};

use crate::command::CommandOracle;
use crate::native::NativeOracle;

/// Oracle selection as it appears in run parameter files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum OracleSpec {
    /// Exact in-process arithmetic.
    #[default]
    Native,
    /// External program invoked once per field.
    Command {
        /// Program to execute.
        program: PathBuf,
        /// Arguments placed before the field index.
        #[serde(default)]
        args: Vec<String>,
    },
}

impl OracleSpec {
    /// Instantiates the configured oracle.
    pub fn build(&self) -> Result<Arc<dyn InvariantOracle>, QfError> {
        match self {
            OracleSpec::Native => Ok(Arc::new(NativeOracle::new())),
            OracleSpec::Command { program, args } => {
                if program.as_os_str().is_empty() {
                    return Err(QfError::Config(
                        ErrorInfo::new("oracle-program", "command oracle needs a program")
                            .with_hint("set oracle.program in the parameter file"),
                    ));
                }
                Ok(Arc::new(CommandOracle::new(program.clone(), args.clone())))
            }
        }
    }
}
