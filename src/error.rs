use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EdfError {
    #[error("Cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid value for {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("{field} is {len} bytes long, the header allows 80")]
    IdentityTooLong { field: &'static str, len: usize },

    #[error("Signal {signal} expected {expected} samples per record, got {actual}")]
    SampleCountMismatch {
        signal: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Expected sample data for {expected} signals, got {actual}")]
    SignalCountMismatch { expected: usize, actual: usize },

    #[error("Signal index {0} out of range")]
    InvalidSignalIndex(usize),

    #[error("Data record {index} out of range (file has {count} records)")]
    RecordOutOfRange { index: usize, count: usize },

    #[error("Sample range {start}..{end} out of range (signal has {available} samples)")]
    SampleOutOfRange {
        start: usize,
        end: usize,
        available: usize,
    },

    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error("Unknown header field: {0}")]
    UnknownHeaderField(String),

    #[error("The files contain more than one recording")]
    MultipleRecordings,
}

impl EdfError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        EdfError::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        EdfError::Write {
            path: path.into(),
            source,
        }
    }

    /// Permission failures are often transient OS or session locks; callers
    /// may retry those with backoff. Format errors never succeed on retry.
    pub fn is_retryable(&self) -> bool {
        let source = match self {
            EdfError::Read { source, .. } | EdfError::Write { source, .. } => source,
            EdfError::Io(source) => source,
            _ => return false,
        };
        source.kind() == io::ErrorKind::PermissionDenied
    }
}

pub type Result<T> = std::result::Result<T, EdfError>;
