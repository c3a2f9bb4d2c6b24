use std::fs;
use std::path::Path;

use qf_core::errors::{ErrorInfo, QfError};
use qf_core::{FieldIndex, InvariantRecord, Invariants};
use serde::{Deserialize, Serialize};

use crate::dispatch::OracleFailure;
use crate::hash::sha256_hex;
use crate::serde::{from_json_slice, to_canonical_json_bytes};

fn io_error(code: &str, path: &Path, err: impl ToString) -> QfError {
    QfError::Io(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
    )
}

fn csv_error(code: &str, err: impl ToString) -> QfError {
    QfError::Serde(ErrorInfo::new(code, err.to_string()))
}

/// Serialization format of batch files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Comma separated values with a `d,dK,hK,fu,rK,mb` header.
    #[default]
    Csv,
    /// Canonical JSON array of row objects.
    Json,
}

impl OutputFormat {
    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

/// Options for [`write_batch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOpts {
    /// Output format.
    pub format: OutputFormat,
    /// Sort rows by `d` instead of keeping the given order.
    pub sort_rows: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonRow {
    d: FieldIndex,
    defining_polynomial: String,
    #[serde(rename = "dK")]
    discriminant: i64,
    #[serde(rename = "hK")]
    class_number: u64,
    fu: String,
    #[serde(rename = "rK")]
    regulator: f64,
    mb: f64,
}

impl JsonRow {
    fn from_record(record: &InvariantRecord) -> Self {
        let inv = &record.invariants;
        Self {
            d: record.d,
            defining_polynomial: format!("x^2 - {}", record.d),
            discriminant: inv.discriminant,
            class_number: inv.class_number,
            fu: inv.fundamental_unit.clone(),
            regulator: inv.regulator,
            mb: inv.minkowski_bound,
        }
    }

    fn into_record(self) -> InvariantRecord {
        InvariantRecord::new(
            self.d,
            Invariants {
                discriminant: self.discriminant,
                class_number: self.class_number,
                fundamental_unit: self.fu,
                regulator: self.regulator,
                minkowski_bound: self.mb,
            },
        )
    }
}

/// Name of the `index`-th batch file out of `total`, e.g. `invariants_0007.csv`.
pub fn batch_file_name(prefix: &str, index: usize, total: usize, format: OutputFormat) -> String {
    let width = total.to_string().len().max(4);
    format!("{prefix}_{index:0width$}.{}", format.extension())
}

/// Name of the failures file accompanying a batch file.
pub fn failures_file_name(prefix: &str, index: usize, total: usize) -> String {
    let width = total.to_string().len().max(4);
    format!("{prefix}_{index:0width$}.failures.csv")
}

/// Renders records in the requested format.
pub fn render_batch<'a, I>(records: I, opts: &WriteOpts) -> Result<Vec<u8>, QfError>
where
    I: IntoIterator<Item = &'a InvariantRecord>,
{
    let mut rows: Vec<&InvariantRecord> = records.into_iter().collect();
    if opts.sort_rows {
        rows.sort_by_key(|record| record.d);
    }
    match opts.format {
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(Vec::new());
            wtr.write_record(InvariantRecord::HEADER)
                .map_err(|err| csv_error("csv-write", err))?;
            for record in rows {
                wtr.write_record(record.to_row())
                    .map_err(|err| csv_error("csv-write", err))?;
            }
            wtr.into_inner()
                .map_err(|err| csv_error("csv-write", err.error()))
        }
        OutputFormat::Json => {
            let rows: Vec<JsonRow> = rows.into_iter().map(JsonRow::from_record).collect();
            to_canonical_json_bytes(&rows)
        }
    }
}

/// Writes one batch file, replacing any existing file, and returns its SHA256.
pub fn write_batch<'a, I>(path: &Path, records: I, opts: &WriteOpts) -> Result<String, QfError>
where
    I: IntoIterator<Item = &'a InvariantRecord>,
{
    let bytes = render_batch(records, opts)?;
    fs::write(path, &bytes).map_err(|err| io_error("batch-write", path, err))?;
    Ok(sha256_hex(&bytes))
}

/// Writes the indices skipped under the skip policy as `d,attempts,code,error`.
pub fn write_failures(path: &Path, failures: &[OracleFailure]) -> Result<(), QfError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(["d", "attempts", "code", "error"])
        .map_err(|err| csv_error("csv-write", err))?;
    for failure in failures {
        let info = failure.error.info();
        wtr.write_record([
            failure.d.to_string(),
            failure.attempts.to_string(),
            info.code.clone(),
            info.message.clone(),
        ])
        .map_err(|err| csv_error("csv-write", err))?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|err| csv_error("csv-write", err.error()))?;
    fs::write(path, bytes).map_err(|err| io_error("failures-write", path, err))
}

/// Reads a CSV batch file back into records, in file order.
pub fn read_batch_csv(path: &Path) -> Result<Vec<InvariantRecord>, QfError> {
    let bytes = fs::read(path).map_err(|err| io_error("batch-read", path, err))?;
    let mut rdr = csv::Reader::from_reader(bytes.as_slice());
    let header = rdr
        .headers()
        .map_err(|err| csv_error("csv-read", err))?
        .clone();
    if header.iter().ne(InvariantRecord::HEADER) {
        return Err(QfError::Serde(
            ErrorInfo::new("batch-header", "unexpected batch file header")
                .with_context("path", path.display().to_string())
                .with_context("header", header.iter().collect::<Vec<_>>().join(",")),
        ));
    }
    rdr.records()
        .map(|row| {
            let row = row.map_err(|err| csv_error("csv-read", err))?;
            let fields: Vec<&str> = row.iter().collect();
            InvariantRecord::from_row(&fields)
                .map_err(|err| err.with_context("path", path.display().to_string()))
        })
        .collect()
}

/// Reads a batch file in either format.
pub fn read_batch(path: &Path, format: OutputFormat) -> Result<Vec<InvariantRecord>, QfError> {
    match format {
        OutputFormat::Csv => read_batch_csv(path),
        OutputFormat::Json => {
            let bytes = fs::read(path).map_err(|err| io_error("batch-read", path, err))?;
            let rows: Vec<JsonRow> = from_json_slice(&bytes)
                .map_err(|err| err.with_context("path", path.display().to_string()))?;
            Ok(rows.into_iter().map(JsonRow::into_record).collect())
        }
    }
}
