//! Rotation center sources, per-file resolution and the indexed JSON document.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;
use tomo_batch_config::{registry, Configuration};
use tomo_batch_utils::{atomic_write, map_maybe_parallel};
use tracing::debug;

use crate::collaborators::{CenterDetector, CollaboratorError};
use crate::fileset::{FileSet, FileSetSource};
use crate::paths;
use crate::OperationError;

/// Where the centers of a batch come from.
#[derive(Clone, Debug, PartialEq)]
pub enum RotationCenterSpec {
    Scalar(f64),
    JsonMapping(PathBuf),
    Auto,
}

impl fmt::Display for RotationCenterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationCenterSpec::Scalar(value) => write!(f, "scalar {value}"),
            RotationCenterSpec::JsonMapping(path) => write!(f, "mapping {}", path.display()),
            RotationCenterSpec::Auto => f.write_str("auto"),
        }
    }
}

/// Values accepted by `rotation-axis-auto`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CenterMode {
    ReadAuto,
    Manual,
    Auto,
}

impl CenterMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "read_auto" => Some(CenterMode::ReadAuto),
            "manual" => Some(CenterMode::Manual),
            "auto" => Some(CenterMode::Auto),
            _ => None,
        }
    }
}

/// Center sources requested explicitly for this invocation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CenterSelection {
    pub rotation_axis: Option<f64>,
    pub rotation_axis_file: Option<PathBuf>,
    pub mode: Option<CenterMode>,
}

fn checked_scalar(value: f64) -> Result<f64, OperationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(OperationError::InvalidInput(format!(
            "rotation axis must be a non-negative pixel position (got {value})"
        )))
    }
}

/// Pick the center source: explicit scalar, then explicit mapping document,
/// then explicit auto or manual, then the document the batch was listed
/// from, then the configured `rotation-axis-auto` mode.
pub fn select_spec(
    selection: &CenterSelection,
    config: &Configuration,
    input_dir: &Path,
    source: &FileSetSource,
) -> Result<RotationCenterSpec, OperationError> {
    if let Some(value) = selection.rotation_axis {
        return Ok(RotationCenterSpec::Scalar(checked_scalar(value)?));
    }
    if let Some(path) = &selection.rotation_axis_file {
        return Ok(RotationCenterSpec::JsonMapping(input_dir.join(path)));
    }
    if selection.mode == Some(CenterMode::Auto) {
        return Ok(RotationCenterSpec::Auto);
    }
    if let FileSetSource::Mapping(document) = source {
        if selection.mode != Some(CenterMode::Manual) {
            debug!(path = %document.display(), "reading centers from the listing document");
            return Ok(RotationCenterSpec::JsonMapping(document.clone()));
        }
    }

    let mode = match selection.mode {
        Some(mode) => mode,
        None => {
            let raw = config
                .get_str(registry::ROTATION_AXIS_AUTO)
                .unwrap_or("read_auto");
            CenterMode::parse(raw).ok_or_else(|| {
                OperationError::InvalidInput(format!(
                    "unknown {} mode '{raw}'",
                    registry::ROTATION_AXIS_AUTO
                ))
            })?
        }
    };

    match mode {
        CenterMode::Manual => {
            let value = config.get_f64(registry::ROTATION_AXIS).ok_or_else(|| {
                OperationError::InvalidInput(format!(
                    "{} is manual but {} is not set",
                    registry::ROTATION_AXIS_AUTO,
                    registry::ROTATION_AXIS
                ))
            })?;
            Ok(RotationCenterSpec::Scalar(checked_scalar(value)?))
        }
        CenterMode::Auto => Ok(RotationCenterSpec::Auto),
        CenterMode::ReadAuto => {
            let document = index_path(config, input_dir)?;
            if document.is_file() {
                Ok(RotationCenterSpec::JsonMapping(document))
            } else {
                debug!(path = %document.display(), "no rotation center document, computing centers");
                Ok(RotationCenterSpec::Auto)
            }
        }
    }
}

/// `<input dir>/<rotation-axis-file>`.
pub fn index_path(config: &Configuration, input_dir: &Path) -> Result<PathBuf, OperationError> {
    let name = config
        .get_str(registry::ROTATION_AXIS_FILE)
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| {
            OperationError::InvalidInput(format!("{} is not set", registry::ROTATION_AXIS_FILE))
        })?;
    Ok(input_dir.join(name))
}

/// Outcome of resolving one file's center.
pub type CenterOutcome = Result<f64, CollaboratorError>;

/// Turns a [`RotationCenterSpec`] into one center per member of a file set.
pub struct CenterResolver<'a> {
    detector: &'a dyn CenterDetector,
    config: &'a Configuration,
    parallel: bool,
}

impl<'a> CenterResolver<'a> {
    pub fn new(detector: &'a dyn CenterDetector, config: &'a Configuration) -> Self {
        let parallel = config
            .get_bool(registry::PARALLEL_DETECTION)
            .unwrap_or(false);
        CenterResolver {
            detector,
            config,
            parallel,
        }
    }

    /// Resolve centers in file set order. Fatal errors (unreadable document,
    /// missing entry) surface before any per-file work; detection failures
    /// are returned per file.
    pub fn resolve(
        &self,
        spec: &RotationCenterSpec,
        files: &FileSet,
    ) -> Result<Vec<CenterOutcome>, OperationError> {
        match spec {
            RotationCenterSpec::Scalar(value) => Ok(files.iter().map(|_| Ok(*value)).collect()),
            RotationCenterSpec::JsonMapping(path) => {
                let index = CenterIndex::load(path)?;
                let lookup = index.lookup();
                files
                    .iter()
                    .map(|file| {
                        let basename = paths::basename(file).unwrap_or_default();
                        lookup.get(basename.as_str()).map(|center| Ok(*center)).ok_or_else(
                            || OperationError::MissingCenterEntry {
                                basename,
                                mapping: path.clone(),
                            },
                        )
                    })
                    .collect()
            }
            RotationCenterSpec::Auto => Ok(self.detect_all(files)),
        }
    }

    /// Run the detector once per file, on the rayon pool when
    /// `parallel-detection` is set. Results keep file set order.
    pub fn detect_all(&self, files: &FileSet) -> Vec<CenterOutcome> {
        let detector = self.detector;
        let config = self.config;
        map_maybe_parallel(files.files().to_vec(), self.parallel, |file| {
            let center = detector.detect(&file, config)?;
            if center.is_finite() {
                debug!(file = %file.display(), center, "detected rotation center");
                Ok(center)
            } else {
                Err(CollaboratorError::Failed(format!(
                    "detector returned a non-finite center ({center})"
                )))
            }
        })
    }
}

/// Indexed rotation center document: `{"0": {"a.h5": 1024.5}, "1": ...}`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CenterIndex {
    entries: Vec<(String, f64)>,
}

impl CenterIndex {
    pub fn new() -> Self {
        CenterIndex::default()
    }

    /// Append an entry at the next index.
    pub fn push(&mut self, basename: impl Into<String>, center: f64) {
        self.entries.push((basename.into(), center));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries
            .iter()
            .map(|(basename, center)| (basename.as_str(), *center))
    }

    pub fn basenames(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(basename, _)| basename.as_str())
    }

    pub fn get(&self, basename: &str) -> Option<f64> {
        self.lookup().get(basename).copied()
    }

    /// Basename to center. A basename listed twice resolves to its later index.
    fn lookup(&self) -> HashMap<&str, f64> {
        self.iter().collect()
    }

    /// Parse a document, ordering entries by numeric index.
    pub fn from_json_str(contents: &str, path: &Path) -> Result<Self, OperationError> {
        let invalid = |message: String| OperationError::CenterIndex {
            path: path.to_path_buf(),
            message,
        };

        let value: Value =
            serde_json::from_str(contents).map_err(|err| invalid(err.to_string()))?;
        let Value::Object(map) = value else {
            return Err(invalid("expected an object keyed by index".into()));
        };

        let mut indexed = Vec::with_capacity(map.len());
        for (key, entry) in map {
            let index: usize = key
                .trim()
                .parse()
                .map_err(|_| invalid(format!("index '{key}' is not a non-negative integer")))?;
            let Value::Object(inner) = entry else {
                return Err(invalid(format!("entry '{key}' must map a file name to a center")));
            };
            if inner.len() != 1 {
                return Err(invalid(format!(
                    "entry '{key}' must hold exactly one file (found {})",
                    inner.len()
                )));
            }
            for (basename, center) in inner {
                let center = center
                    .as_f64()
                    .ok_or_else(|| invalid(format!("center for '{basename}' is not a number")))?;
                indexed.push((index, basename, center));
            }
        }

        indexed.sort_by_key(|(index, _, _)| *index);
        if let Some(pair) = indexed.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(invalid(format!("index {} appears more than once", pair[0].0)));
        }

        Ok(CenterIndex {
            entries: indexed
                .into_iter()
                .map(|(_, basename, center)| (basename, center))
                .collect(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, OperationError> {
        let contents = fs::read_to_string(path).map_err(|source| OperationError::io(path, source))?;
        Self::from_json_str(&contents, path)
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Atomically replace the document at `path`.
    pub fn write(&self, path: &Path) -> Result<(), OperationError> {
        let mut rendered = self
            .to_json_string()
            .map_err(|err| OperationError::CenterIndex {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        rendered.push('\n');
        atomic_write(path, &rendered).map_err(|source| OperationError::io(path, source))
    }
}

impl Serialize for CenterIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Entry<'a>(&'a str, f64);

        impl Serialize for Entry<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(self.0, &self.1)?;
                map.end()
            }
        }

        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (index, (basename, center)) in self.entries.iter().enumerate() {
            map.serialize_entry(&index.to_string(), &Entry(basename, *center))?;
        }
        map.end()
    }
}
