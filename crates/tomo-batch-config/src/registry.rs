//! Declared options, grouped into the sections used by the persisted document.

use crate::value::{ConfigValue, ValueKind};

pub const ROTATION_AXIS_FILE: &str = "rotation-axis-file";
pub const VERBOSE: &str = "verbose";
pub const ROTATION_AXIS: &str = "rotation-axis";
pub const ROTATION_AXIS_AUTO: &str = "rotation-axis-auto";
pub const CENTER_SEARCH_WIDTH: &str = "center-search-width";
pub const PARALLEL_DETECTION: &str = "parallel-detection";
pub const FILE_NAME: &str = "file-name";
pub const DATA_FILE_PATTERNS: &str = "data-file-patterns";
pub const FILE_FORMAT: &str = "file-format";
pub const FILE_TYPE: &str = "file-type";
pub const BINNING: &str = "binning";
pub const RECONSTRUCTION_TYPE: &str = "reconstruction-type";
pub const RECONSTRUCTION_ALGORITHM: &str = "reconstruction-algorithm";
pub const OUTPUT_FOLDER: &str = "output-folder";
pub const RECON_COMMAND: &str = "recon-command";
pub const FIND_CENTER_COMMAND: &str = "find-center-command";

/// Table name for keys the registry does not declare.
pub const EXTRA_SECTION: &str = "extra";

/// Section order used when persisting and when rendering status output.
pub const SECTIONS: &[&str] = &[
    "general",
    "find-rotation-axis",
    "file-reading",
    "reconstruction",
    "collaborators",
];

/// Compile-time default for a declared option.
#[derive(Clone, Copy, Debug)]
pub enum OptionDefault {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(&'static str),
}

impl OptionDefault {
    pub fn to_value(self) -> ConfigValue {
        match self {
            OptionDefault::Bool(value) => ConfigValue::Bool(value),
            OptionDefault::Integer(value) => ConfigValue::Integer(value),
            OptionDefault::Float(value) => ConfigValue::Float(value),
            OptionDefault::Text(value) => ConfigValue::Text(value.to_owned()),
        }
    }
}

/// Declaration of one option.
#[derive(Clone, Copy, Debug)]
pub struct OptionSpec {
    pub name: &'static str,
    pub section: &'static str,
    pub kind: ValueKind,
    pub default: OptionDefault,
    pub choices: &'static [&'static str],
    pub help: &'static str,
}

pub const OPTIONS: &[OptionSpec] = &[
    OptionSpec {
        name: ROTATION_AXIS_FILE,
        section: "general",
        kind: ValueKind::Text,
        default: OptionDefault::Text("rotation_axis.json"),
        choices: &[],
        help: "File name of the rotation axis locations document",
    },
    OptionSpec {
        name: VERBOSE,
        section: "general",
        kind: ValueKind::Bool,
        default: OptionDefault::Bool(false),
        choices: &[],
        help: "Verbose output",
    },
    OptionSpec {
        name: ROTATION_AXIS,
        section: "find-rotation-axis",
        kind: ValueKind::Float,
        default: OptionDefault::Float(-1.0),
        choices: &[],
        help: "Location of rotation axis",
    },
    OptionSpec {
        name: ROTATION_AXIS_AUTO,
        section: "find-rotation-axis",
        kind: ValueKind::Text,
        default: OptionDefault::Text("read_auto"),
        choices: &["read_auto", "manual", "auto"],
        help: "How to get the rotation axis: read the mapping document, use the configured value, or compute it",
    },
    OptionSpec {
        name: CENTER_SEARCH_WIDTH,
        section: "find-rotation-axis",
        kind: ValueKind::Float,
        default: OptionDefault::Float(10.0),
        choices: &[],
        help: "+/- center search width (pixel)",
    },
    OptionSpec {
        name: PARALLEL_DETECTION,
        section: "find-rotation-axis",
        kind: ValueKind::Bool,
        default: OptionDefault::Bool(false),
        choices: &[],
        help: "Run center detection for all files of a batch in parallel",
    },
    OptionSpec {
        name: FILE_NAME,
        section: "file-reading",
        kind: ValueKind::Text,
        default: OptionDefault::Text("."),
        choices: &[],
        help: "Name of the last used data file or directory containing multiple data files",
    },
    OptionSpec {
        name: DATA_FILE_PATTERNS,
        section: "file-reading",
        kind: ValueKind::Text,
        default: OptionDefault::Text("*.h5, *.hdf, *.hdf5"),
        choices: &[],
        help: "Comma separated glob patterns recognised as data files inside a directory",
    },
    OptionSpec {
        name: FILE_FORMAT,
        section: "file-reading",
        kind: ValueKind::Text,
        default: OptionDefault::Text("dx"),
        choices: &[],
        help: "Input file format",
    },
    OptionSpec {
        name: FILE_TYPE,
        section: "file-reading",
        kind: ValueKind::Text,
        default: OptionDefault::Text("standard"),
        choices: &["standard", "flip_and_stich", "mosaic"],
        help: "Input file type",
    },
    OptionSpec {
        name: BINNING,
        section: "file-reading",
        kind: ValueKind::Integer,
        default: OptionDefault::Integer(0),
        choices: &[],
        help: "Reconstruction binning factor as power(2, choice)",
    },
    OptionSpec {
        name: RECONSTRUCTION_TYPE,
        section: "reconstruction",
        kind: ValueKind::Text,
        default: OptionDefault::Text("try"),
        choices: &["try", "slice", "full"],
        help: "Reconstruct slice or full data set",
    },
    OptionSpec {
        name: RECONSTRUCTION_ALGORITHM,
        section: "reconstruction",
        kind: ValueKind::Text,
        default: OptionDefault::Text("gridrec"),
        choices: &[],
        help: "Reconstruction algorithm",
    },
    OptionSpec {
        name: OUTPUT_FOLDER,
        section: "reconstruction",
        kind: ValueKind::Text,
        default: OptionDefault::Text("{file_name_parent}_rec"),
        choices: &[],
        help: "Output folder template; may reference other options and {file_name_parent}",
    },
    OptionSpec {
        name: RECON_COMMAND,
        section: "collaborators",
        kind: ValueKind::Text,
        default: OptionDefault::Text(""),
        choices: &[],
        help: "Command line run once per file to reconstruct it ({file}, {center}, {output}); \
               split on whitespace with no quoting, so arguments cannot contain spaces",
    },
    OptionSpec {
        name: FIND_CENTER_COMMAND,
        section: "collaborators",
        kind: ValueKind::Text,
        default: OptionDefault::Text(""),
        choices: &[],
        help: "Command line run once per file that prints the detected center ({file}); \
               split on whitespace with no quoting, so arguments cannot contain spaces",
    },
];

/// Look up the declaration for `name`.
pub fn lookup(name: &str) -> Option<&'static OptionSpec> {
    OPTIONS.iter().find(|spec| spec.name == name)
}

/// Options declared in `section`, in declaration order.
pub fn section_options(section: &str) -> impl Iterator<Item = &'static OptionSpec> + '_ {
    OPTIONS.iter().filter(move |spec| spec.section == section)
}

/// Section a key is persisted under.
pub fn section_of(name: &str) -> &'static str {
    lookup(name).map(|spec| spec.section).unwrap_or(EXTRA_SECTION)
}

/// Parse a raw command-line value for `name`, using the declared kind when known.
pub fn parse_value(name: &str, raw: &str) -> Result<ConfigValue, String> {
    match lookup(name) {
        Some(spec) => ConfigValue::parse_as(spec.kind, raw),
        None => Ok(ConfigValue::infer(raw)),
    }
}
