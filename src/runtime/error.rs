//! Error taxonomy for the container runtime port

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("image unavailable and pull policy forbids fetching it: {0}")]
    ImageUnavailable(String),

    #[error("timed out pulling image {image} after {elapsed_secs}s")]
    ImagePullTimeout { image: String, elapsed_secs: u64 },

    #[error("container {0} did not reach a start state in time")]
    ContainerStartTimeout(String),

    #[error("failed to remove container {0}: {1}")]
    ContainerRemoveFailed(String, String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("build step failed: {0}")]
    BuildStepFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ContainerResult<T> = Result<T, ContainerError>;
