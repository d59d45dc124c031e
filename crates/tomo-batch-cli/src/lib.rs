use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tomo_batch_config::{registry, ConfigStore, LoadOptions, Overrides};
use tomo_batch_core::TomoBatch;
use tomo_batch_format::SummaryFormat;
use tomo_batch_ops::{
    paths, BatchOutcome, CenterMode, CenterSelection, FindCenterOptions, OperationError,
    Operations, ReconOptions, StatusOptions,
};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Entry point for CLI execution. Returns the desired exit code.
pub fn run() -> Result<i32> {
    let cli = Cli::parse();

    let store = match ConfigStore::open(LoadOptions {
        default_path: None,
        override_path: cli.config.clone(),
    }) {
        Ok(store) => store,
        Err(err) => {
            init_logging(cli.verbose);
            return Ok(report_error(err.into()));
        }
    };

    let verbose = cli.verbose
        || store
            .load()
            .ok()
            .and_then(|config| config.get_bool(registry::VERBOSE))
            .unwrap_or(false);
    init_logging(verbose);

    let engine = TomoBatch::bootstrap(store);
    let ops = engine.operations();

    match cli.command {
        Command::Init => handle_init(ops),
        Command::Recon(args) => handle_recon(ops, args),
        Command::FindCenter(args) => handle_find_center(ops, args),
        Command::Status(args) => handle_status(ops, args),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}

fn report_error(err: OperationError) -> i32 {
    error!("{err}");
    err.exit_code().code()
}

fn handle_init(ops: &Operations) -> Result<i32> {
    match ops.init() {
        Ok(path) => {
            emit(&format!("wrote {}", path.display()))?;
            Ok(0)
        }
        Err(err) => Ok(report_error(err)),
    }
}

fn handle_status(ops: &Operations, args: StatusArgs) -> Result<i32> {
    let options = StatusOptions {
        overrides: Overrides::default(),
        format: args.format.unwrap_or_default().into(),
    };
    match ops.status(options) {
        Ok(outcome) => {
            emit(&outcome.rendered)?;
            Ok(0)
        }
        Err(err) => Ok(report_error(err)),
    }
}

fn handle_recon(ops: &Operations, args: BatchArgs) -> Result<i32> {
    let (overrides, center, format) = match args.into_parts() {
        Ok(parts) => parts,
        Err(err) => return Ok(report_error(err)),
    };
    let options = ReconOptions {
        overrides,
        center,
        format,
    };
    finish_batch(ops.recon(options))
}

fn handle_find_center(ops: &Operations, args: BatchArgs) -> Result<i32> {
    let (overrides, _, format) = match args.into_parts() {
        Ok(parts) => parts,
        Err(err) => return Ok(report_error(err)),
    };
    let options = FindCenterOptions { overrides, format };
    finish_batch(ops.find_center(options))
}

fn finish_batch(result: Result<BatchOutcome, OperationError>) -> Result<i32> {
    match result {
        Ok(BatchOutcome {
            rendered,
            exit_code,
            ..
        }) => {
            emit(&rendered)?;
            Ok(exit_code.code())
        }
        Err(err) => Ok(report_error(err)),
    }
}

fn emit(content: &str) -> Result<()> {
    print!("{}", content);
    if !content.ends_with('\n') {
        println!();
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Batch driver for tomographic reconstructions",
    propagate_version = true
)]
struct Cli {
    /// Read this configuration document for this run only (it is never rewritten)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Log resolution details
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the default configuration document
    Init,
    /// Reconstruct one data file or every data file of a directory
    Recon(BatchArgs),
    /// Compute rotation centers and write the rotation axis document
    #[command(name = "find_center")]
    FindCenter(BatchArgs),
    /// Show the resolved configuration grouped by section
    Status(StatusArgs),
}

#[derive(Args)]
struct BatchArgs {
    /// Data file, directory of data files, or rotation axis document
    #[arg(long = "file-name", value_name = "PATH")]
    file_name: Option<PathBuf>,
    /// Rotation axis location used for every file
    #[arg(long = "rotation-axis", value_name = "PIXEL", allow_negative_numbers = true)]
    rotation_axis: Option<f64>,
    /// How to obtain the rotation axis
    #[arg(long = "rotation-axis-auto", value_enum)]
    rotation_axis_auto: Option<CenterModeValue>,
    /// Rotation axis document, relative to the data directory
    #[arg(long = "rotation-axis-file", value_name = "FILE")]
    rotation_axis_file: Option<PathBuf>,
    /// Output folder template, e.g. "{file_name_parent}_rec"
    #[arg(long = "output-folder", value_name = "TEMPLATE")]
    output_folder: Option<String>,
    /// Reconstruct a trial slice or the full data set
    #[arg(long = "reconstruction-type", value_enum)]
    reconstruction_type: Option<ReconstructionTypeValue>,
    /// Command line run once per file to reconstruct it (split on whitespace, no quoting)
    #[arg(long = "recon-command", value_name = "COMMAND", allow_hyphen_values = true)]
    recon_command: Option<String>,
    /// Command line run once per file that prints its rotation center (split on whitespace, no quoting)
    #[arg(long = "find-center-command", value_name = "COMMAND", allow_hyphen_values = true)]
    find_center_command: Option<String>,
    /// Set any configuration option for this and later runs
    #[arg(long = "set", value_name = "KEY=VALUE", action = ArgAction::Append)]
    set: Vec<String>,
    /// Remove a configuration option for this and later runs
    #[arg(long = "unset", value_name = "KEY", action = ArgAction::Append)]
    unset: Vec<String>,
    /// Summary format
    #[arg(long, value_enum)]
    format: Option<FormatValue>,
}

impl BatchArgs {
    /// Explicit flags become sticky overrides; `--set`/`--unset` apply first
    /// so a named flag wins over a generic one.
    fn into_parts(self) -> Result<(Overrides, CenterSelection, SummaryFormat), OperationError> {
        let mut overrides = Overrides::default();
        for entry in &self.set {
            let (key, raw) = entry.split_once('=').ok_or_else(|| {
                OperationError::InvalidInput(format!("expected KEY=VALUE, got '{entry}'"))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(OperationError::InvalidInput(format!(
                    "missing option name in '{entry}'"
                )));
            }
            let value = registry::parse_value(key, raw.trim())
                .map_err(|message| OperationError::InvalidInput(format!("{key}: {message}")))?;
            overrides.set(key, value);
        }
        for key in &self.unset {
            overrides.unset(key.trim());
        }

        if let Some(path) = &self.file_name {
            let absolute = paths::absolutize(path).map_err(|source| OperationError::Io {
                path: path.clone(),
                source,
            })?;
            overrides.set(registry::FILE_NAME, absolute.to_string_lossy().into_owned());
        }
        if let Some(value) = self.rotation_axis {
            overrides.set(registry::ROTATION_AXIS, value);
        }
        if let Some(mode) = self.rotation_axis_auto {
            overrides.set(registry::ROTATION_AXIS_AUTO, mode.as_str());
        }
        if let Some(path) = &self.rotation_axis_file {
            overrides.set(
                registry::ROTATION_AXIS_FILE,
                path.to_string_lossy().into_owned(),
            );
        }
        if let Some(template) = &self.output_folder {
            overrides.set(registry::OUTPUT_FOLDER, template.as_str());
        }
        if let Some(kind) = self.reconstruction_type {
            overrides.set(registry::RECONSTRUCTION_TYPE, kind.as_str());
        }
        if let Some(command) = &self.recon_command {
            overrides.set(registry::RECON_COMMAND, command.as_str());
        }
        if let Some(command) = &self.find_center_command {
            overrides.set(registry::FIND_CENTER_COMMAND, command.as_str());
        }

        let center = CenterSelection {
            rotation_axis: self.rotation_axis,
            rotation_axis_file: self.rotation_axis_file,
            mode: self.rotation_axis_auto.map(CenterModeValue::into_mode),
        };
        let format = self.format.unwrap_or_default().into();
        Ok((overrides, center, format))
    }
}

#[derive(Args)]
struct StatusArgs {
    /// Output format
    #[arg(long, value_enum)]
    format: Option<FormatValue>,
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum FormatValue {
    #[default]
    Plain,
    Json,
}

impl From<FormatValue> for SummaryFormat {
    fn from(value: FormatValue) -> Self {
        match value {
            FormatValue::Plain => SummaryFormat::Plain,
            FormatValue::Json => SummaryFormat::Json,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CenterModeValue {
    #[value(name = "read_auto")]
    ReadAuto,
    Manual,
    Auto,
}

impl CenterModeValue {
    fn as_str(self) -> &'static str {
        match self {
            CenterModeValue::ReadAuto => "read_auto",
            CenterModeValue::Manual => "manual",
            CenterModeValue::Auto => "auto",
        }
    }

    fn into_mode(self) -> CenterMode {
        match self {
            CenterModeValue::ReadAuto => CenterMode::ReadAuto,
            CenterModeValue::Manual => CenterMode::Manual,
            CenterModeValue::Auto => CenterMode::Auto,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ReconstructionTypeValue {
    Try,
    Slice,
    Full,
}

impl ReconstructionTypeValue {
    fn as_str(self) -> &'static str {
        match self {
            ReconstructionTypeValue::Try => "try",
            ReconstructionTypeValue::Slice => "slice",
            ReconstructionTypeValue::Full => "full",
        }
    }
}
