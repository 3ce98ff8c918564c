use thiserror::Error;

use crate::model::ProductId;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Request to {url} failed with status {status}")]
    Status { status: u16, url: String },
    #[error("Product {0} not found")]
    NotFound(ProductId),
    #[error("Malformed image payload: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Parsing error")]
    Parse,
    #[error("Storage error: {0} {1}")]
    Storage(String, String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification used to decide how a failure is recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Catalog list, detail or image fetch failed. Recovered with
    /// placeholders or the last known good state.
    TransientFetch,
    /// Durable storage could not be read or written. Recovered by treating
    /// storage as empty.
    Persistence,
    /// The requested product has no record upstream.
    NotFound,
    /// Settings could not be used; fixed by the operator, not retried.
    Configuration,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Config(_) => ErrorKind::Configuration,
            StoreError::Io(_) | StoreError::Storage(_, _) | StoreError::Parse => {
                ErrorKind::Persistence
            }
            _ => ErrorKind::TransientFetch,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(_: serde_json::Error) -> Self {
        Self::Parse
    }
}
