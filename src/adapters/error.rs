use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error(transparent)]
    Container(#[from] crate::runtime::ContainerError),

    #[error(transparent)]
    Scm(#[from] crate::scm::ScmError),

    #[error(transparent)]
    Buildroot(#[from] crate::buildroot::BuildrootError),

    #[error("init command failed: {0:?}")]
    InitCommandFailed(Vec<String>),

    #[error("no SRPM file found in result directory: {0}")]
    NoSrpmProduced(String),

    #[error("SRPM name mismatch: expected {expected}, got {actual}")]
    NvrMismatch { expected: String, actual: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AdapterResult<T> = Result<T, AdapterError>;
