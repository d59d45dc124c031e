//! Batch operations behind the tomo-batch commands.
//!
//! [`Operations`] owns the configuration store and the two collaborators. Each
//! command loads the sticky configuration, layers the invocation's overrides on
//! top, expands the input into a [`FileSet`], resolves rotation centers and
//! dispatches per-file work, collecting failures into a [`BatchReport`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tomo_batch_config::{merge, registry, ConfigError, ConfigStore, Configuration, Overrides};
use tomo_batch_format::{
    BatchReport, FailureStage, FileReport, JobKind, Renderer, SummaryFormat,
};
use tracing::{info, warn};

pub mod center;
pub mod collaborators;
mod error;
pub mod fileset;
pub mod paths;
pub mod template;

pub use center::{
    select_spec, CenterIndex, CenterMode, CenterOutcome, CenterResolver, CenterSelection,
    RotationCenterSpec,
};
pub use collaborators::{CenterDetector, CollaboratorError, ReconRequest, Reconstructor, Unconfigured};
pub use error::{ExitCode, OperationError};
pub use fileset::{expand_file_set, FileSet, FileSetSource};
pub use template::{TemplateContext, TemplateError};

/// Options for `find_center`.
#[derive(Clone, Debug, Default)]
pub struct FindCenterOptions {
    pub overrides: Overrides,
    pub format: SummaryFormat,
}

/// Options for `recon`.
#[derive(Clone, Debug, Default)]
pub struct ReconOptions {
    pub overrides: Overrides,
    pub center: CenterSelection,
    pub format: SummaryFormat,
}

/// Options for `status`.
#[derive(Clone, Debug, Default)]
pub struct StatusOptions {
    pub overrides: Overrides,
    pub format: SummaryFormat,
}

/// Result of a batch command.
#[derive(Debug)]
pub struct BatchOutcome {
    pub report: BatchReport,
    pub rendered: String,
    pub exit_code: ExitCode,
}

/// Result of `status`.
#[derive(Debug)]
pub struct StatusOutcome {
    pub configuration: Configuration,
    pub rendered: String,
}

/// Operation bundle shared by the CLI commands.
pub struct Operations {
    store: ConfigStore,
    reconstructor: Arc<dyn Reconstructor>,
    detector: Arc<dyn CenterDetector>,
}

impl Operations {
    pub fn new(
        store: ConfigStore,
        reconstructor: Arc<dyn Reconstructor>,
        detector: Arc<dyn CenterDetector>,
    ) -> Self {
        Self {
            store,
            reconstructor,
            detector,
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Stored configuration with `overrides` applied and validated.
    pub fn configuration(&self, overrides: &Overrides) -> Result<Configuration, OperationError> {
        let base = self.store.load()?;
        let merged = merge(&base, overrides);
        merged.validate().map_err(ConfigError::Validation)?;
        Ok(merged)
    }

    /// Write a fresh defaults document.
    pub fn init(&self) -> Result<PathBuf, OperationError> {
        let path = self.store.init()?;
        info!(path = %path.display(), "created configuration");
        Ok(path)
    }

    /// Resolved configuration, grouped by section. Nothing is persisted.
    pub fn status(&self, options: StatusOptions) -> Result<StatusOutcome, OperationError> {
        let configuration = self.configuration(&options.overrides)?;
        let rendered = Renderer::new(options.format)
            .render_status(&configuration, Some(self.store.document_path()))?;
        Ok(StatusOutcome {
            configuration,
            rendered,
        })
    }

    /// Detect the center of every file in the batch and write the indexed
    /// rotation center document next to the data.
    pub fn find_center(&self, options: FindCenterOptions) -> Result<BatchOutcome, OperationError> {
        let config = self.configuration(&options.overrides)?;
        let files = self.expand(&config)?;
        let index_path = center::index_path(&config, files.input_dir())?;

        let mut report = BatchReport::new(
            JobKind::FindCenter,
            files.input(),
            RotationCenterSpec::Auto.to_string(),
        );

        let resolver = CenterResolver::new(self.detector.as_ref(), &config);
        let mut index = CenterIndex::new();
        for (file, outcome) in files.iter().zip(resolver.detect_all(&files)) {
            match outcome {
                Ok(center) => {
                    info!(file = %file.display(), center, "rotation center found");
                    index.push(paths::basename(file).unwrap_or_default(), center);
                    report.push(FileReport::succeeded(file.clone(), center, None));
                }
                Err(err) => {
                    warn!(file = %file.display(), error = %err, "center detection failed");
                    report.push(FileReport::failed(
                        file.clone(),
                        None,
                        FailureStage::Detection,
                        err.to_string(),
                    ));
                }
            }
        }

        if index.is_empty() {
            warn!(path = %index_path.display(), "no centers detected, document left untouched");
        } else {
            index.write(&index_path)?;
            info!(path = %index_path.display(), entries = index.len(), "wrote rotation centers");
            report.artifact = Some(index_path);
        }

        report.config_written = self.store.persist(&config)?;
        self.finish(report, options.format)
    }

    /// Reconstruct every file in the batch.
    ///
    /// Fixed centers are resolved, and the configuration persisted, before
    /// any collaborator runs; a missing mapping entry or an unwritable
    /// configuration therefore aborts the whole batch.
    pub fn recon(&self, options: ReconOptions) -> Result<BatchOutcome, OperationError> {
        let config = self.configuration(&options.overrides)?;
        let files = self.expand(&config)?;
        let spec = select_spec(&options.center, &config, files.input_dir(), files.source())?;
        let output_template = required_text(&config, registry::OUTPUT_FOLDER)?.to_string();
        info!(files = files.len(), centers = %spec, "starting reconstruction batch");

        let resolver = CenterResolver::new(self.detector.as_ref(), &config);
        let fixed = match spec {
            RotationCenterSpec::Auto => None,
            _ => Some(resolver.resolve(&spec, &files)?),
        };

        let mut report = BatchReport::new(JobKind::Recon, files.input(), spec.to_string());
        report.config_written = self.store.persist(&config)?;

        let centers = match fixed {
            Some(centers) => centers,
            None => resolver.resolve(&spec, &files)?,
        };
        let full = config.get_str(registry::RECONSTRUCTION_TYPE) == Some("full");

        for (file, center) in files.iter().zip(centers) {
            let entry = self.reconstruct_one(&config, &output_template, file, center, full);
            report.push(entry);
        }

        self.finish(report, options.format)
    }

    fn expand(&self, config: &Configuration) -> Result<FileSet, OperationError> {
        let file_name = required_text(config, registry::FILE_NAME)?;
        let patterns = config
            .get_str(registry::DATA_FILE_PATTERNS)
            .unwrap_or_default();
        expand_file_set(Path::new(file_name), patterns)
    }

    fn reconstruct_one(
        &self,
        config: &Configuration,
        output_template: &str,
        file: &Path,
        center: CenterOutcome,
        full: bool,
    ) -> FileReport {
        let center = match center {
            Ok(center) => center,
            Err(err) => {
                warn!(file = %file.display(), error = %err, "center detection failed");
                return FileReport::failed(
                    file.to_path_buf(),
                    None,
                    FailureStage::Detection,
                    err.to_string(),
                );
            }
        };

        let file_name = file.to_string_lossy();
        let output = match template::expand(output_template, config, &file_name) {
            Ok(output) => PathBuf::from(output),
            Err(err) => {
                warn!(file = %file.display(), error = %err, "cannot resolve output folder");
                return FileReport::failed(
                    file.to_path_buf(),
                    Some(center),
                    FailureStage::OutputPath,
                    err.to_string(),
                );
            }
        };
        if let Err(err) = fs::create_dir_all(&output) {
            warn!(output = %output.display(), error = %err, "cannot create output folder");
            return FileReport::failed(
                file.to_path_buf(),
                Some(center),
                FailureStage::OutputPath,
                format!("cannot create {}: {err}", output.display()),
            );
        }

        info!(file = %file.display(), center, output = %output.display(), "reconstructing");
        let request = ReconRequest {
            file,
            center,
            output: &output,
            configuration: config,
        };
        if let Err(err) = self.reconstructor.reconstruct(&request) {
            warn!(file = %file.display(), error = %err, "reconstruction failed");
            return FileReport::failed(
                file.to_path_buf(),
                Some(center),
                FailureStage::Reconstruction,
                err.to_string(),
            );
        }

        if full {
            write_snapshot(config, file, center, &output);
        }
        FileReport::succeeded(file.to_path_buf(), center, Some(output))
    }

    fn finish(
        &self,
        mut report: BatchReport,
        format: SummaryFormat,
    ) -> Result<BatchOutcome, OperationError> {
        report.finish();
        let exit_code = if report.has_failures() {
            ExitCode::BatchFailures
        } else {
            ExitCode::Success
        };
        let rendered = Renderer::new(format).render_report(&report)?;
        Ok(BatchOutcome {
            report,
            rendered,
            exit_code,
        })
    }
}

fn required_text<'c>(config: &'c Configuration, key: &str) -> Result<&'c str, OperationError> {
    config
        .get_str(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| OperationError::InvalidInput(format!("{key} is not set")))
}

/// Save the configuration that reproduces one full reconstruction next to
/// its output. Failures are logged only.
fn write_snapshot(config: &Configuration, file: &Path, center: f64, output: &Path) {
    let mut overrides = Overrides::default();
    overrides
        .set(registry::FILE_NAME, file.to_string_lossy().into_owned())
        .set(registry::ROTATION_AXIS, center)
        .set(registry::ROTATION_AXIS_AUTO, "manual");
    let snapshot = merge(config, &overrides);

    let path = output.join(format!("{}_rec.toml", paths::file_stem(file)));
    match tomo_batch_config::persist(&snapshot, &path) {
        Ok(()) => info!(
            config = %path.display(),
            "repeat this reconstruction with: tomo-batch --config {} recon",
            path.display()
        ),
        Err(err) => warn!(config = %path.display(), error = %err, "cannot save reconstruction config"),
    }
}
