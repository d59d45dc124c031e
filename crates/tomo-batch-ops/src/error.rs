use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tomo_batch_config::ConfigError;

use crate::template::TemplateError;

/// Process exit status of a batch command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Success = 0,
    BatchFailures = 1,
    InvalidInput = 2,
    NoInputFiles = 3,
    MissingCenterEntry = 4,
    CenterIndex = 5,
    Config = 6,
    Io = 7,
}

impl ExitCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Success),
            1 => Some(Self::BatchFailures),
            2 => Some(Self::InvalidInput),
            3 => Some(Self::NoInputFiles),
            4 => Some(Self::MissingCenterEntry),
            5 => Some(Self::CenterIndex),
            6 => Some(Self::Config),
            7 => Some(Self::Io),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Fatal errors that stop a batch before or instead of per-file dispatch.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("input {path} does not exist")]
    InputNotFound { path: PathBuf },

    #[error("no data files found for {path}")]
    NoInputFiles { path: PathBuf },

    #[error("no rotation center for '{basename}' in {mapping}")]
    MissingCenterEntry { basename: String, mapping: PathBuf },

    #[error("invalid rotation center document {path}: {message}")]
    CenterIndex { path: PathBuf, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("i/o error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to render output: {0}")]
    Render(#[from] serde_json::Error),
}

impl OperationError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) | Self::Template(_) => ExitCode::InvalidInput,
            Self::InputNotFound { .. } => ExitCode::InvalidInput,
            Self::NoInputFiles { .. } => ExitCode::NoInputFiles,
            Self::MissingCenterEntry { .. } => ExitCode::MissingCenterEntry,
            Self::CenterIndex { .. } => ExitCode::CenterIndex,
            Self::Config(_) => ExitCode::Config,
            Self::Io { .. } | Self::Render(_) => ExitCode::Io,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
