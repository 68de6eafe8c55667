use finstat_core::{CoreError, FetchError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] finstat_core::ValidationError),

    #[error(transparent)]
    Upstream(#[from] FetchError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Upstream(_) => 3,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
            Self::Core(core) => match core {
                CoreError::Validation(_) => 2,
                CoreError::Fetch(_) => 3,
                CoreError::Serialization(_) | CoreError::Csv(_) => 4,
                CoreError::Io(_) | CoreError::EmptyExport => 10,
            },
        }
    }
}
