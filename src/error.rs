use std::io;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

/// Failure to turn one record's bytes into an `ExpressionRecord`.
#[derive(Debug, Error, Diagnostic)]
pub enum DecodeError {
    #[error("record truncated at {field}: need {needed} bytes, {available} available")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("pair region of {len} bytes is not a multiple of 8")]
    MisalignedPairs { len: usize },

    #[error("invalid UTF-8 in {field}")]
    Utf8 {
        field: &'static str,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("malformed self-describing record: {0}")]
    Malformed(String),

    #[error("cell index {0} is not an exact integer below 2^24")]
    CellIndex(f32),
}

#[derive(Debug, Error, Diagnostic)]
pub enum EncodeError {
    #[error("record has {indices} indices but {values} values")]
    LengthMismatch { indices: usize, values: usize },

    #[error("{field} is {len} bytes, longer than the 65535 byte limit")]
    FieldTooLong { field: &'static str, len: usize },

    #[error("cell index {0} cannot be stored exactly as float32")]
    CellIndexRange(u32),

    #[error("record of {0} bytes does not fit a 32-bit size prefix")]
    RecordTooLarge(usize),

    #[error("msgpack encoding failed: {0}")]
    Msgpack(String),
}

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("not allowed to view dataset: {0}")]
    PermissionDenied(String),

    #[error("I/O error on {path} at offset {offset}")]
    Io {
        path: Utf8PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("corrupt record in {path} at offset {offset}")]
    Corrupt {
        path: Utf8PathBuf,
        offset: u64,
        #[source]
        #[diagnostic_source]
        source: DecodeError,
    },

    #[error("invalid gene locator: {0}")]
    InvalidLocator(String),

    #[error("unknown format version: {0}")]
    UnknownFormatVersion(String),

    #[error("invalid shard header in {path}: {detail}")]
    InvalidShardHeader { path: Utf8PathBuf, detail: String },

    #[error("invalid gene pattern: {0}")]
    InvalidPattern(String),

    #[error("missing config file kira-gex.json")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read catalog manifest at {0}")]
    CatalogRead(PathBuf),

    #[error("failed to parse catalog manifest: {0}")]
    CatalogParse(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Encode(#[from] EncodeError),
}

impl KiraError {
    pub fn io(path: impl Into<Utf8PathBuf>, offset: u64, source: io::Error) -> Self {
        KiraError::Io {
            path: path.into(),
            offset,
            source,
        }
    }

    pub fn corrupt(path: impl Into<Utf8PathBuf>, offset: u64, source: DecodeError) -> Self {
        KiraError::Corrupt {
            path: path.into(),
            offset,
            source,
        }
    }
}
