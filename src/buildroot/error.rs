use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildrootError {
    #[error("failed to generate repo configuration: {0}")]
    RepoConfig(String),

    #[error("failed to extract BuildRequires from SRPM: {0}")]
    SrpmInspect(String),

    #[error("hub query failed: {0}")]
    Hub(#[from] crate::hub::HubError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BuildrootResult<T> = Result<T, BuildrootError>;
