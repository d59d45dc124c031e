//! Core orchestration layer for tomo-batch.

use std::sync::Arc;

use tomo_batch_config::ConfigStore;
use tomo_batch_ops::{CenterDetector, Operations, Reconstructor};

pub mod commands;

pub use commands::{CommandDetector, CommandReconstructor};

/// Entry point for higher-level consumers (CLI, beamline scripts, etc.).
pub struct TomoBatch {
    ops: Operations,
}

impl TomoBatch {
    /// Bootstrap the engine with the command-line collaborators configured
    /// through `recon-command` and `find-center-command`.
    pub fn bootstrap(store: ConfigStore) -> Self {
        Self::with_collaborators(
            store,
            Arc::new(CommandReconstructor),
            Arc::new(CommandDetector),
        )
    }

    /// Bootstrap with in-process collaborators.
    pub fn with_collaborators(
        store: ConfigStore,
        reconstructor: Arc<dyn Reconstructor>,
        detector: Arc<dyn CenterDetector>,
    ) -> Self {
        Self {
            ops: Operations::new(store, reconstructor, detector),
        }
    }

    /// Access the operation bundle.
    pub fn operations(&self) -> &Operations {
        &self.ops
    }
}
