use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A query arrived before any mount completed.
    #[error("no data folder is mounted")]
    NotMounted,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not a file: {0}")]
    NotAFile(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    /// The entry has no containing archive to read its bytes from.
    #[error("parent container unavailable for {0}")]
    ParentUnavailable(String),
    /// Single-file reads inside a compacted container nested in a compacted
    /// archive are not supported; preload the container instead.
    #[error("cannot open {0}: compacted container nested inside a compacted archive")]
    UnsupportedCompactedNestedRead(String),
    #[error("truncated decode of {name}: expected {expected} bytes, got {actual}")]
    TruncatedDecode {
        name: String,
        expected: u64,
        actual: u64,
    },
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<std::num::TryFromIntError> for Error {
    fn from(_error: std::num::TryFromIntError) -> Self {
        Error::InvalidFormat("length out of bounds".to_string())
    }
}

impl Error {
    /// True for failures caused by the path not naming the expected node,
    /// as opposed to failures reading a node that does exist.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            Error::NotMounted | Error::NotFound(_) | Error::NotAFile(_) | Error::NotADirectory(_)
        )
    }
}
