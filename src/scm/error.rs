use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScmError {
    #[error("unsupported SCM URL: {0}")]
    UnsupportedScm(String),

    #[error("checkout failed: {0}")]
    CheckoutFailed(String),

    #[error(transparent)]
    Container(#[from] crate::runtime::ContainerError),
}

pub type ScmResult<T> = Result<T, ScmError>;
