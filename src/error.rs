use thiserror::Error;

use crate::transfer::ImportError;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("path error: {0}")]
    Path(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store error: {0}")]
    Store(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("import rejected: {0}")]
    Import(#[from] ImportError),
    #[error("provider '{0}' not found")]
    ProviderNotFound(String),
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),
    #[error("{0}")]
    Upstream(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;
