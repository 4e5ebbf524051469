//! Error types for geoannotate.

use thiserror::Error;

/// Error type for geoannotate operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The IP address string could not be parsed
    #[error("invalid IP address: {0}")]
    InvalidIp(String),

    /// Invalid CIDR notation in a dataset row
    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    /// No interval covers the address
    #[error("no interval contains {0}")]
    NodeNotFound(String),

    /// The annotation field was already filled by another annotator
    #[error("annotation field {0} already populated")]
    AlreadyPopulated(&'static str),

    /// The dataset is being loaded in the background
    #[error("dataset is loading")]
    Loading,

    /// The dataset is not resident in memory
    #[error("dataset is not loaded")]
    Unloaded,

    /// Caller does not own the loading reservation of a cache entry
    #[error("cache entry is not reserved by caller")]
    NotOwner,

    /// A dataset load failed; the failure is sticky until the entry is unloaded
    #[error("dataset {name} failed to load: {reason}")]
    LoadFailed { name: String, reason: String },

    /// The requested dataset is not known to the cache
    #[error("unknown dataset: {0}")]
    UnknownDataset(String),

    /// No annotator can serve the requested date
    #[error("no annotator available")]
    NoAnnotator,

    /// Too many malformed rows while building a dataset
    #[error("too many bad records: {count} errors, last: {last}")]
    TooManyBadRecords { count: usize, last: String },

    /// A single malformed dataset row
    #[error("bad record: {0}")]
    BadRecord(String),

    /// The dataset date could not be derived from the object name
    #[error("could not extract date from {0}")]
    DateExtraction(String),

    /// Malformed annotation request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Outbound request failed before a response was received
    #[error("transport error: {0}")]
    Transport(String),

    /// Outbound request did not complete before the deadline
    #[error("request timed out")]
    Timeout,

    /// Remote service answered with a non-success status
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// ZIP archive error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Short label used for metrics and sampled logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidIp(_) => "invalid_ip",
            Error::InvalidCidr(_) => "invalid_cidr",
            Error::NodeNotFound(_) => "node_not_found",
            Error::AlreadyPopulated(_) => "already_populated",
            Error::Loading => "loading",
            Error::Unloaded => "unloaded",
            Error::NotOwner => "not_owner",
            Error::LoadFailed { .. } => "load_failed",
            Error::UnknownDataset(_) => "unknown_dataset",
            Error::NoAnnotator => "no_annotator",
            Error::TooManyBadRecords { .. } => "too_many_bad_records",
            Error::BadRecord(_) => "bad_record",
            Error::DateExtraction(_) => "date_extraction",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Transport(_) => "transport",
            Error::Timeout => "timeout",
            Error::HttpStatus { .. } => "http_status",
            Error::Io(_) => "io",
            Error::Csv(_) => "csv",
            Error::Zip(_) => "zip",
            Error::Json(_) => "json",
            Error::Config(_) => "config",
        }
    }
}

/// Result type alias for geoannotate operations.
pub type Result<T> = std::result::Result<T, Error>;
