use thiserror::Error;

use crate::archive::ExtractError;
use crate::install::InstallError;
use crate::registry::ResolveError;
use crate::source::error::SourceError;

#[derive(Error, Debug)]
pub enum KegError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("{tool} {version} is not installed")]
    NotInstalled { tool: String, version: String },

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Install error: {0}")]
    Install(#[from] InstallError),

    #[error("API request failed: {0}")]
    Api(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, KegError>;
