use std::path::PathBuf;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum QmDataError {
    #[error("invalid dataset name: {0}")]
    InvalidDatasetName(String),

    #[error("missing config file qmdata.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("download failed for {url}: {message}")]
    Http { url: String, message: String },

    #[error("{url} returned status {status}")]
    HttpStatus { status: u16, url: String },

    #[error("corrupt archive {path}: {message}")]
    CorruptArchive { path: Utf8PathBuf, message: String },

    #[error("malformed record {record}: {message}")]
    MalformedRecord { record: usize, message: String },

    #[error("inconsistent field table: {0}")]
    InconsistentFieldTable(String),

    #[error("dataset cache not found at {0}")]
    CacheMiss(Utf8PathBuf),

    #[error("dataset cache unreadable at {path}: {message}")]
    CacheCorrupt { path: Utf8PathBuf, message: String },

    #[error("index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
