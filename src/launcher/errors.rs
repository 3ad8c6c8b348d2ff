use thiserror::Error;

use crate::server::ServerError;

/// Exit status for anything the option parser rejects.
pub const USAGE_EXIT_CODE: i32 = 2;

#[derive(Debug, Error)]
#[error("Invalid command line: {0}")]
pub struct UsageError(#[from] clap::Error);

impl UsageError {
    pub fn kind(&self) -> clap::error::ErrorKind {
        self.0.kind()
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Usage(#[from] UsageError),
    #[error("Camera server stopped: {0}")]
    Server(#[from] ServerError),
    #[error("Error writing usage: {0}")]
    Output(#[from] std::io::Error),
}

impl LaunchError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => USAGE_EXIT_CODE,
            Self::Server(_) | Self::Output(_) => 1,
        }
    }
}
