//! Errors raised while enumerating, evaluating and writing quadratic fields.
//!
//! Every variant wraps the same [`ErrorInfo`] payload. Callers match on the
//! variant for the failure family and on [`ErrorInfo::code`] for the exact
//! cause; batch drivers add `batch` and `d` context as errors travel up.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Code, message and context of a [`QfError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Kebab-case cause, e.g. `field-index-square` or `batch-write`.
    pub code: String,
    /// What went wrong, without the context entries.
    pub message: String,
    /// Where it went wrong: field index `d`, batch label, file path.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Suggested fix, usually naming a CLI flag or parameter key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Payload without context or hint.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Records `key=value`, replacing an earlier value for the same key.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attaches a suggested fix.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        let mut entries = self.context.iter();
        if let Some((key, value)) = entries.next() {
            write!(f, " ({key}={value}")?;
            for (key, value) in entries {
                write!(f, ", {key}={value}")?;
            }
            f.write_str(")")?;
        }
        match &self.hint {
            Some(hint) => write!(f, "; hint: {hint}"),
            None => Ok(()),
        }
    }
}

/// Failure families of the field survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum QfError {
    /// Field index or integer range outside what can be enumerated.
    #[error("range: {0}")]
    Range(ErrorInfo),
    /// Invariant computation failed or panicked for some `d`.
    #[error("oracle: {0}")]
    Oracle(ErrorInfo),
    /// Batch files, failure files or run reports could not be read or written.
    #[error("io: {0}")]
    Io(ErrorInfo),
    /// Run parameters or oracle settings rejected before any work starts.
    #[error("config: {0}")]
    Config(ErrorInfo),
    /// Rows, reports or parameter files that do not decode, or a run
    /// directory that fails verification.
    #[error("serde: {0}")]
    Serde(ErrorInfo),
}

impl QfError {
    /// Payload shared by every family.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            QfError::Range(info)
            | QfError::Oracle(info)
            | QfError::Io(info)
            | QfError::Config(info)
            | QfError::Serde(info) => info,
        }
    }

    fn info_mut(&mut self) -> &mut ErrorInfo {
        match self {
            QfError::Range(info)
            | QfError::Oracle(info)
            | QfError::Io(info)
            | QfError::Config(info)
            | QfError::Serde(info) => info,
        }
    }

    /// Same family and code with one more context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.info_mut().context.insert(key.into(), value.into());
        self
    }
}
