use std::path::PathBuf;

use keypin_core::ConfigError;
use keypin_core::pin::HashDecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("policy rejected: {0}")]
    Config(#[from] ConfigError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid pin `{value}`: {source}")]
    InvalidPin {
        value: String,
        #[source]
        source: HashDecodeError,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{path}: {errors} structured log violation(s)")]
    LogValidation { path: PathBuf, errors: usize },
}

impl HarnessError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
