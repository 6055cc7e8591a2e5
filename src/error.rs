//! Error taxonomy shared by the sources, the store, the renderer, and the facade.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of one of the upstream providers.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("GET {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("GET {url}: request failed with HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("GET {url}: decode json: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected payload: {0}")]
    Payload(String),
    #[error("upstream reported failure: {0}")]
    Upstream(String),
}

/// Failure of the snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot file {path}: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate country name in batch: {0}")]
    DuplicateName(String),
    #[error("export: {0}")]
    Export(#[from] csv::Error),
}

/// Failure while drawing or publishing the summary artifact.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("draw summary: {0}")]
    Draw(String),
    #[error("publish {path}: {source}")]
    Publish {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a facade operation that the boundary layer must translate.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("a refresh is already in progress")]
    RefreshInProgress,
    #[error(transparent)]
    Upstream(#[from] FetchError),
    #[error(transparent)]
    Persistence(#[from] StoreError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl ServiceError {
    /// HTTP status code the boundary layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::NotFound(_) => 404,
            ServiceError::InvalidQuery(_) => 400,
            ServiceError::RefreshInProgress => 409,
            ServiceError::Upstream(_) | ServiceError::Persistence(_) | ServiceError::Render(_) => {
                500
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }

    /// Client-facing text; internals stay in the logged diagnostic.
    pub fn public_message(&self, operation: Operation) -> String {
        match self {
            ServiceError::NotFound(what) => format!("{what} not found"),
            ServiceError::InvalidQuery(why) => why.clone(),
            ServiceError::RefreshInProgress => "Refresh already in progress".to_string(),
            _ => format!("Failed to {}", operation.describe()),
        }
    }

    pub fn body(&self, operation: Operation) -> ErrorBody {
        ErrorBody {
            error: self.public_message(operation),
        }
    }
}

/// Facade operation names, used for generic failure messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Refresh,
    List,
    Get,
    Delete,
    Status,
    Summary,
    Export,
}

impl Operation {
    fn describe(self) -> &'static str {
        match self {
            Operation::Refresh => "refresh countries",
            Operation::List => "get countries",
            Operation::Get => "get country",
            Operation::Delete => "delete country",
            Operation::Status => "get status",
            Operation::Summary => "get summary image",
            Operation::Export => "export countries",
        }
    }
}

/// JSON error payload: `{"error": "..."}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}
