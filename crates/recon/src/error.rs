use std::fmt;

use crate::model::Side;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad threshold, empty channel list, etc.).
    ConfigValidation(String),
    /// Missing required column in an input relation.
    MissingColumn { side: Side, column: String },
    /// Amount parse error.
    AmountParse { side: Side, row: usize, value: String },
    /// Timestamp parse error.
    TimestampParse { side: Side, row: usize, value: String },
    /// Duplicate transaction id under `duplicate_policy = "reject"`.
    DuplicateKey { side: Side, transaction_id: String },
    /// IO error (file read, CSV framing, etc.).
    Io(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::MissingColumn { side, column } => {
                write!(f, "{side} relation: missing column '{column}'")
            }
            Self::AmountParse { side, row, value } => {
                write!(f, "{side} relation, row {row}: cannot parse amount '{value}'")
            }
            Self::TimestampParse { side, row, value } => {
                write!(f, "{side} relation, row {row}: cannot parse timestamp '{value}'")
            }
            Self::DuplicateKey { side, transaction_id } => {
                write!(
                    f,
                    "{side} relation: duplicate transaction id '{transaction_id}' (duplicate_policy = reject)"
                )
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}

impl From<csv::Error> for ReconError {
    fn from(err: csv::Error) -> Self {
        Self::Io(err.to_string())
    }
}
