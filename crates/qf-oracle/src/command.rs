use std::path::PathBuf;
use std::process::Command;

use qf_core::errors::{ErrorInfo, QfError};
use qf_core::{FieldIndex, InvariantOracle, Invariants};
use tracing::debug;

/// Oracle backed by an external program invoked once per field.
///
/// The program receives `d` as its last argument and must print one CSV line
/// `dK,hK,fu,rK,mb` (optionally prefixed by `d`) on stdout.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: PathBuf,
    args: Vec<String>,
    label: String,
}

impl CommandOracle {
    /// Creates an oracle running `program args... <d>`.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        let program = program.into();
        let label = format!("command:{}", program.display());
        Self {
            program,
            args,
            label,
        }
    }

    fn failure(&self, d: FieldIndex, code: &str, message: impl Into<String>) -> ErrorInfo {
        ErrorInfo::new(code, message)
            .with_context("d", d.to_string())
            .with_context("program", self.program.display().to_string())
    }
}

impl InvariantOracle for CommandOracle {
    fn name(&self) -> &str {
        &self.label
    }

    fn invariants(&self, d: FieldIndex) -> Result<Invariants, QfError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(d.to_string())
            .output()
            .map_err(|err| QfError::Oracle(self.failure(d, "oracle-spawn", err.to_string())))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(QfError::Oracle(
                self.failure(d, "oracle-exit", "oracle process failed")
                    .with_context("status", output.status.to_string())
                    .with_context("stderr", stderr),
            ));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| QfError::Oracle(self.failure(d, "oracle-empty", "no output")))?;
        debug!(d = d.get(), line, "oracle output");
        parse_line(d, line).map_err(|info| {
            QfError::Oracle(
                info.with_context("d", d.to_string())
                    .with_context("program", self.program.display().to_string()),
            )
        })
    }
}

/// Parses `dK,hK,fu,rK,mb`, accepting a leading `d` column that must match.
pub fn parse_line(d: FieldIndex, line: &str) -> Result<Invariants, ErrorInfo> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(line.as_bytes());
    let record = reader
        .records()
        .next()
        .ok_or_else(|| ErrorInfo::new("oracle-parse", "empty line"))?
        .map_err(|err| ErrorInfo::new("oracle-parse", err.to_string()))?;
    let fields: Vec<&str> = record.iter().collect();
    let fields = match fields.len() {
        5 => fields,
        6 => {
            if fields[0] != d.to_string() {
                return Err(ErrorInfo::new("oracle-echo", "oracle echoed another field")
                    .with_context("echoed", fields[0]));
            }
            fields[1..].to_vec()
        }
        other => {
            return Err(ErrorInfo::new("oracle-parse", "expected five columns")
                .with_context("columns", other.to_string()))
        }
    };
    let bad = |column: &str, value: &str| {
        ErrorInfo::new("oracle-parse", "malformed value")
            .with_context("column", column)
            .with_context("value", value)
    };
    Ok(Invariants {
        discriminant: fields[0].parse().map_err(|_| bad("dK", fields[0]))?,
        class_number: fields[1].parse().map_err(|_| bad("hK", fields[1]))?,
        fundamental_unit: fields[2].to_string(),
        regulator: fields[3].parse().map_err(|_| bad("rK", fields[3]))?,
        minkowski_bound: fields[4].parse().map_err(|_| bad("mb", fields[4]))?,
    })
}
