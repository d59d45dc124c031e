//! Shared test harness utilities for tomo-batch crates.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tomo_batch_config::{ConfigStore, Configuration, LoadOptions};
use tomo_batch_ops::{
    CenterDetector, CenterIndex, CollaboratorError, Operations, ReconRequest, Reconstructor,
};

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// What a [`RecordingReconstructor`] saw for one call.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRecon {
    pub file: PathBuf,
    pub center: f64,
    pub output: PathBuf,
}

/// Reconstructor that records every request and fails for chosen basenames.
#[derive(Debug, Default)]
pub struct RecordingReconstructor {
    calls: Mutex<Vec<RecordedRecon>>,
    failing: HashSet<String>,
}

impl RecordingReconstructor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_for(basenames: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failing: basenames.iter().map(|name| name.to_string()).collect(),
        })
    }

    pub fn calls(&self) -> Vec<RecordedRecon> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

impl Reconstructor for RecordingReconstructor {
    fn reconstruct(&self, request: &ReconRequest<'_>) -> Result<(), CollaboratorError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedRecon {
                file: request.file.to_path_buf(),
                center: request.center,
                output: request.output.to_path_buf(),
            });
        }
        let name = basename(request.file);
        if self.failing.contains(&name) {
            return Err(CollaboratorError::Failed(format!("scripted failure for {name}")));
        }
        Ok(())
    }
}

/// Detector answering from a per-basename script.
#[derive(Debug, Default)]
pub struct ScriptedDetector {
    centers: HashMap<String, Result<f64, String>>,
    calls: Mutex<Vec<PathBuf>>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn center(mut self, basename: &str, center: f64) -> Self {
        self.centers.insert(basename.to_string(), Ok(center));
        self
    }

    pub fn failure(mut self, basename: &str, message: &str) -> Self {
        self.centers
            .insert(basename.to_string(), Err(message.to_string()));
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

impl CenterDetector for ScriptedDetector {
    fn detect(&self, file: &Path, _configuration: &Configuration) -> Result<f64, CollaboratorError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(file.to_path_buf());
        }
        let name = basename(file);
        match self.centers.get(&name) {
            Some(Ok(center)) => Ok(*center),
            Some(Err(message)) => Err(CollaboratorError::Failed(message.clone())),
            None => Err(CollaboratorError::Failed(format!("no scripted center for {name}"))),
        }
    }
}

/// Temporary workspace holding a data directory and a sticky config path.
pub struct Workspace {
    temp: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().expect("tempdir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Directory the data files live in.
    pub fn data_dir(&self) -> PathBuf {
        let dir = self.temp.path().join("scan");
        fs::create_dir_all(&dir).expect("create data dir");
        dir
    }

    /// Create empty data files inside [`Workspace::data_dir`].
    pub fn with_data_files(self, names: &[&str]) -> Self {
        let dir = self.data_dir();
        for name in names {
            fs::write(dir.join(name), b"").expect("write data file");
        }
        self
    }

    /// Write a rotation center document into the data directory.
    pub fn write_centers(&self, name: &str, centers: &[(&str, f64)]) -> PathBuf {
        let mut index = CenterIndex::new();
        for (basename, center) in centers {
            index.push(*basename, *center);
        }
        let path = self.data_dir().join(name);
        index.write(&path).expect("write centers");
        path
    }

    pub fn config_path(&self) -> PathBuf {
        self.temp.path().join("home").join("tomo-batch.toml")
    }

    pub fn store(&self) -> ConfigStore {
        ConfigStore::open(LoadOptions::default().with_default_path(self.config_path()))
            .expect("open store")
    }

    pub fn operations(
        &self,
        reconstructor: Arc<dyn Reconstructor>,
        detector: Arc<dyn CenterDetector>,
    ) -> Operations {
        Operations::new(self.store(), reconstructor, detector)
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}
