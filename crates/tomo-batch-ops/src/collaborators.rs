//! Seams to the reconstruction and center-detection programs.

use std::io;
use std::path::Path;

use thiserror::Error;
use tomo_batch_config::Configuration;

use crate::template::TemplateError;

/// One reconstruction job.
#[derive(Clone, Copy, Debug)]
pub struct ReconRequest<'a> {
    pub file: &'a Path,
    pub center: f64,
    pub output: &'a Path,
    pub configuration: &'a Configuration,
}

/// Reconstructs one data file with a known center.
pub trait Reconstructor: Send + Sync {
    fn reconstruct(&self, request: &ReconRequest<'_>) -> Result<(), CollaboratorError>;
}

/// Computes the rotation center of one data file.
pub trait CenterDetector: Send + Sync {
    fn detect(&self, file: &Path, configuration: &Configuration) -> Result<f64, CollaboratorError>;
}

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{0}")]
    Failed(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("failed to launch {program}: {source}")]
    Launch { program: String, source: io::Error },

    #[error("{program} exited with {status}: {stderr}")]
    ExitStatus {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("cannot read a center from output {output:?}")]
    InvalidOutput { output: String },
}

/// Placeholder collaborator used when no program is wired in.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unconfigured;

impl Reconstructor for Unconfigured {
    fn reconstruct(&self, _request: &ReconRequest<'_>) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::NotConfigured("reconstructor"))
    }
}

impl CenterDetector for Unconfigured {
    fn detect(&self, _file: &Path, _configuration: &Configuration) -> Result<f64, CollaboratorError> {
        Err(CollaboratorError::NotConfigured("center detector"))
    }
}
