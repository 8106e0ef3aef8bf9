//! Error types for drivechat.
//!
//! Two tiers: [`ExtractError`] covers one file's download/decode and is
//! absorbed by the ingestion pipeline; [`Error`] covers whole operations and
//! is surfaced to the caller.

use drivechat_core::index::IndexError;
use thiserror::Error;

/// Failures reported by the remote storage provider.
#[derive(Error, Debug)]
pub enum DriveError {
    /// Transport-level failure (connection, TLS, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The provider rejected the access token.
    #[error("remote API rejected the credentials (status {status})")]
    Unauthorized { status: u16 },

    #[error("remote API error (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode remote response: {0}")]
    Decode(String),
}

/// Failure to turn one remote file into text.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("download failed: {0}")]
    Remote(#[from] DriveError),

    #[error("file is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("spreadsheet extraction failed: {0}")]
    Spreadsheet(String),
}

/// Errors surfaced by the service operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The folder URL has no `/folders/<id>` segment.
    #[error("malformed folder URL: {0}")]
    MalformedUrl(String),

    #[error("remote API error: {0}")]
    RemoteApi(#[from] DriveError),

    /// Wraps whatever aborted an ingestion, keeping the cause.
    #[error("can't load data from drive folder: {source}")]
    Ingestion {
        #[source]
        source: Box<Error>,
    },

    #[error("no index found for owner {0}")]
    NotIndexed(String),

    #[error("invalid owner id: {0:?}")]
    InvalidOwner(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("record store error: {0}")]
    Records(#[from] sqlx::Error),

    #[error("answer generation failed: {0}")]
    Answer(String),
}

impl Error {
    pub fn ingestion(cause: impl Into<Error>) -> Self {
        Error::Ingestion {
            source: Box::new(cause.into()),
        }
    }

    /// Short machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::MalformedUrl(_) => "malformed_url",
            Error::RemoteApi(_) => "remote_api",
            Error::Ingestion { .. } => "ingestion_failed",
            Error::NotIndexed(_) => "not_indexed",
            Error::InvalidOwner(_) => "bad_request",
            Error::Answer(_) => "answer_failed",
            Error::Storage(_) | Error::Index(_) | Error::Records(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
