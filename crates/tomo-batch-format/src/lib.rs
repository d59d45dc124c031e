//! Batch reports and output formatters for tomo-batch commands.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tomo_batch_config::registry::{self, EXTRA_SECTION, SECTIONS};
use tomo_batch_config::Configuration;

/// Output format for command summaries.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SummaryFormat {
    #[default]
    Plain,
    Json,
}

/// Kind of batch job a report describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    FindCenter,
    Recon,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::FindCenter => "find_center",
            JobKind::Recon => "recon",
        }
    }
}

/// Step of the per-file pipeline that failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Detection,
    OutputPath,
    Reconstruction,
}

impl FailureStage {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureStage::Detection => "detection",
            FailureStage::OutputPath => "output path",
            FailureStage::Reconstruction => "reconstruction",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Succeeded,
    Failed { stage: FailureStage, message: String },
}

/// Outcome for one member of the batch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub center: Option<f64>,
    pub output: Option<PathBuf>,
    #[serde(flatten)]
    pub status: FileStatus,
}

impl FileReport {
    pub fn succeeded(path: PathBuf, center: f64, output: Option<PathBuf>) -> Self {
        FileReport {
            path,
            center: Some(center),
            output,
            status: FileStatus::Succeeded,
        }
    }

    pub fn failed(
        path: PathBuf,
        center: Option<f64>,
        stage: FailureStage,
        message: impl Into<String>,
    ) -> Self {
        FileReport {
            path,
            center,
            output: None,
            status: FileStatus::Failed {
                stage,
                message: message.into(),
            },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, FileStatus::Failed { .. })
    }
}

/// Summary of one batch run. Partial failure is a normal outcome.
#[derive(Clone, Debug, Serialize)]
pub struct BatchReport {
    pub job: JobKind,
    pub input: PathBuf,
    pub center_source: String,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub files: Vec<FileReport>,
    pub artifact: Option<PathBuf>,
    pub config_written: Option<PathBuf>,
}

impl BatchReport {
    pub fn new(job: JobKind, input: impl Into<PathBuf>, center_source: impl Into<String>) -> Self {
        BatchReport {
            job,
            input: input.into(),
            center_source: center_source.into(),
            started_at: Local::now(),
            finished_at: None,
            files: Vec::new(),
            artifact: None,
            config_written: None,
        }
    }

    pub fn push(&mut self, file: FileReport) {
        self.files.push(file);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Local::now());
    }

    pub fn failed_count(&self) -> usize {
        self.files.iter().filter(|file| file.is_failed()).count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.files.len() - self.failed_count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count() > 0
    }
}

/// Renders reports and configuration listings.
#[derive(Clone, Copy, Debug, Default)]
pub struct Renderer {
    format: SummaryFormat,
}

impl Renderer {
    pub fn new(format: SummaryFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> SummaryFormat {
        self.format
    }

    pub fn render_report(&self, report: &BatchReport) -> serde_json::Result<String> {
        match self.format {
            SummaryFormat::Json => serde_json::to_string_pretty(report),
            SummaryFormat::Plain => Ok(render_report_plain(report)),
        }
    }

    pub fn render_status(
        &self,
        config: &Configuration,
        document: Option<&Path>,
    ) -> serde_json::Result<String> {
        match self.format {
            SummaryFormat::Json => serde_json::to_string_pretty(&status_json(config, document)),
            SummaryFormat::Plain => Ok(render_status_plain(config, document)),
        }
    }
}

fn render_report_plain(report: &BatchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} (centers: {})",
        report.job.as_str(),
        report.input.display(),
        report.center_source
    );

    for (index, file) in report.files.iter().enumerate() {
        let center = file
            .center
            .map(|center| format!("center={center:.2}"))
            .unwrap_or_else(|| "center=-".to_string());
        match &file.status {
            FileStatus::Succeeded => {
                let _ = write!(out, "  [{index}] {}  {center}  ok", file.path.display());
                if let Some(output) = &file.output {
                    let _ = write!(out, " -> {}", output.display());
                }
                out.push('\n');
            }
            FileStatus::Failed { stage, message } => {
                let _ = writeln!(
                    out,
                    "  [{index}] {}  {center}  FAILED ({}): {message}",
                    file.path.display(),
                    stage.as_str()
                );
            }
        }
    }

    if let Some(artifact) = &report.artifact {
        let _ = writeln!(out, "wrote {}", artifact.display());
    }
    if let Some(config) = &report.config_written {
        let _ = writeln!(out, "saved configuration to {}", config.display());
    }
    let _ = write!(
        out,
        "{} files: {} succeeded, {} failed",
        report.files.len(),
        report.succeeded_count(),
        report.failed_count()
    );
    out
}

fn section_title(section: &str) -> String {
    let spaced = section.replace('-', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn render_status_plain(config: &Configuration, document: Option<&Path>) -> String {
    let mut out = String::new();
    if let Some(path) = document {
        let _ = writeln!(out, "configuration: {}", path.display());
    }

    for section in SECTIONS {
        let entries: Vec<_> = registry::section_options(section)
            .filter_map(|spec| config.get(spec.name).map(|value| (spec.name, value)))
            .collect();
        if entries.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{}", section_title(section));
        for (name, value) in entries {
            let _ = writeln!(out, "  {name:<26} {value}");
        }
    }

    let extra: Vec<_> = config
        .iter()
        .filter(|(name, _)| registry::lookup(name).is_none())
        .collect();
    if !extra.is_empty() {
        let _ = writeln!(out, "{}", section_title(EXTRA_SECTION));
        for (name, value) in extra {
            let _ = writeln!(out, "  {name:<26} {value}");
        }
    }

    let cleared: Vec<_> = config.cleared().collect();
    if !cleared.is_empty() {
        let _ = writeln!(out, "Cleared");
        for name in cleared {
            let _ = writeln!(out, "  {name}");
        }
    }
    out
}

fn status_json(config: &Configuration, document: Option<&Path>) -> Value {
    let mut sections = Map::new();
    for (name, value) in config.iter() {
        let section = registry::section_of(name);
        let entry = sections
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = entry {
            map.insert(name.to_string(), json!(value));
        }
    }
    json!({
        "document": document,
        "sections": sections,
        "unset": config.cleared().collect::<Vec<_>>(),
    })
}
