//! Collaborators that shell out to the programs named in the configuration.

use std::path::Path;
use std::process::{Command, Output};

use tomo_batch_config::{registry, Configuration};
use tomo_batch_ops::{
    CenterDetector, CollaboratorError, ReconRequest, Reconstructor, TemplateContext,
};
use tracing::debug;

/// Split `command_line` on whitespace and expand each argument as a template.
///
/// Quotes are not interpreted; a program path or literal argument containing
/// spaces has to go through a wrapper script. Expanded placeholder values are
/// never split, so `{file}` may contain spaces.
fn build_argv(
    key: &'static str,
    command_line: Option<&str>,
    context: &TemplateContext<'_>,
) -> Result<Vec<String>, CollaboratorError> {
    let command_line = command_line
        .filter(|line| !line.trim().is_empty())
        .ok_or(CollaboratorError::NotConfigured(key))?;
    command_line
        .split_whitespace()
        .map(|arg| context.expand(arg).map_err(CollaboratorError::from))
        .collect()
}

fn run(argv: &[String]) -> Result<Output, CollaboratorError> {
    let (program, args) = argv
        .split_first()
        .ok_or(CollaboratorError::NotConfigured("command"))?;
    debug!(command = ?argv, "running collaborator");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| CollaboratorError::Launch {
            program: program.clone(),
            source,
        })?;
    if output.status.success() {
        Ok(output)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(CollaboratorError::ExitStatus {
            program: program.clone(),
            status: output.status.to_string(),
            stderr: stderr.trim().lines().last().unwrap_or_default().to_string(),
        })
    }
}

/// Runs `recon-command` once per file. Arguments may use `{file}`,
/// `{center}`, `{output}` and any configuration key.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommandReconstructor;

impl Reconstructor for CommandReconstructor {
    fn reconstruct(&self, request: &ReconRequest<'_>) -> Result<(), CollaboratorError> {
        let file = request.file.to_string_lossy();
        let context = TemplateContext::new(request.configuration, &file)
            .with("file", &*file)
            .with("center", request.center.to_string())
            .with("output", request.output.to_string_lossy());
        let argv = build_argv(
            registry::RECON_COMMAND,
            request.configuration.get_str(registry::RECON_COMMAND),
            &context,
        )?;
        run(&argv).map(|_| ())
    }
}

/// Runs `find-center-command` once per file and reads the center from the
/// last non-empty line of its standard output.
#[derive(Clone, Copy, Debug, Default)]
pub struct CommandDetector;

impl CenterDetector for CommandDetector {
    fn detect(&self, file: &Path, configuration: &Configuration) -> Result<f64, CollaboratorError> {
        let file = file.to_string_lossy();
        let context = TemplateContext::new(configuration, &file).with("file", &*file);
        let argv = build_argv(
            registry::FIND_CENTER_COMMAND,
            configuration.get_str(registry::FIND_CENTER_COMMAND),
            &context,
        )?;
        let output = run(&argv)?;
        parse_center(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_center(stdout: &str) -> Result<f64, CollaboratorError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .unwrap_or_default();
    line.parse::<f64>()
        .ok()
        .filter(|center| center.is_finite())
        .ok_or_else(|| CollaboratorError::InvalidOutput {
            output: line.to_string(),
        })
}
