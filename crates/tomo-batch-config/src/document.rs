//! TOML rendering of a [`Configuration`].

use std::path::Path;

use toml::{Table, Value};

use crate::registry::{self, EXTRA_SECTION, SECTIONS};
use crate::value::ConfigValue;
use crate::{ConfigError, ConfigValidationError, ConfigValidationErrors, Configuration};

/// Top-level array listing keys cleared with an explicit unset.
pub(crate) const UNSET_KEY: &str = "unset";

const HEADER: &str = "# tomo-batch configuration.\n# Rewritten after every successful run; edit freely between runs.\n\n";

pub(crate) fn parse_document(contents: &str, path: &Path) -> Result<Configuration, ConfigError> {
    let table: Table = contents.parse().map_err(|source| ConfigError::Parse {
        path: path.into(),
        source,
    })?;

    let mut errors = Vec::new();
    let mut config = Configuration::empty();

    for (key, value) in table {
        match value {
            Value::Table(section) => {
                for (name, inner) in section {
                    insert_scalar(&mut config, path, &format!("{key}.{name}"), name, inner, &mut errors);
                }
            }
            Value::Array(items) if key == UNSET_KEY => {
                for item in items {
                    match item {
                        Value::String(name) => config.mark_cleared(name),
                        other => errors.push(ConfigValidationError::new(
                            Some(path.into()),
                            format!("entries of '{UNSET_KEY}' must be option names (found {other})"),
                        )),
                    }
                }
            }
            other => {
                let context = key.clone();
                insert_scalar(&mut config, path, &context, key, other, &mut errors);
            }
        }
    }

    if errors.is_empty() {
        Ok(config)
    } else {
        Err(ConfigError::Validation(ConfigValidationErrors(errors)))
    }
}

fn insert_scalar(
    config: &mut Configuration,
    path: &Path,
    context: &str,
    name: String,
    value: Value,
    errors: &mut Vec<ConfigValidationError>,
) {
    let Some(value) = ConfigValue::from_toml(value) else {
        errors.push(
            ConfigValidationError::new(
                Some(path.into()),
                "only strings, numbers and booleans are supported".into(),
            )
            .with_key(context),
        );
        return;
    };

    let value = match registry::lookup(&name) {
        Some(spec) => {
            let found = value.kind();
            match value.coerce(spec.kind) {
                Some(value) => value,
                None => {
                    errors.push(
                        ConfigValidationError::new(
                            Some(path.into()),
                            format!("expected {} (found {found})", spec.kind),
                        )
                        .with_key(context),
                    );
                    return;
                }
            }
        }
        None => value,
    };

    config.insert(name, value);
}

pub(crate) fn render_document(config: &Configuration) -> Result<String, ConfigError> {
    let mut root = Table::new();

    let cleared: Vec<Value> = config
        .cleared()
        .map(|name| Value::String(name.to_owned()))
        .collect();
    if !cleared.is_empty() {
        root.insert(UNSET_KEY.into(), Value::Array(cleared));
    }

    for section in SECTIONS {
        let mut table = Table::new();
        for spec in registry::section_options(section) {
            if let Some(value) = config.get(spec.name) {
                table.insert(spec.name.into(), value.to_toml());
            }
        }
        if !table.is_empty() {
            root.insert((*section).into(), Value::Table(table));
        }
    }

    let mut extra = Table::new();
    for (name, value) in config.iter() {
        if registry::lookup(name).is_none() {
            extra.insert(name.to_owned(), value.to_toml());
        }
    }
    if !extra.is_empty() {
        root.insert(EXTRA_SECTION.into(), Value::Table(extra));
    }

    let body = toml::to_string(&root)?;
    Ok(format!("{HEADER}{body}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn flattens_sections_and_reads_unset_list() {
        let doc = r#"
            unset = ["output-folder"]

            [find-rotation-axis]
            rotation-axis = 1024

            [extra]
            beamline = "32-ID"
        "#;
        let config = parse_document(doc, Path::new("tomo.toml")).expect("parse");
        assert_eq!(config.get_f64(registry::ROTATION_AXIS), Some(1024.0));
        assert_eq!(config.get("beamline"), Some(&ConfigValue::Text("32-ID".into())));
        assert!(config.is_cleared(registry::OUTPUT_FOLDER));
    }

    #[test]
    fn rejects_wrong_kinds_and_nested_tables() {
        let doc = r#"
            [file-reading]
            binning = "two"

            [reconstruction.deeper]
            value = 1
        "#;
        let err = parse_document(doc, Path::new("tomo.toml")).expect_err("invalid");
        let message = err.to_string();
        assert!(message.contains("file-reading.binning"), "{message}");
        assert!(message.contains("expected integer"), "{message}");
        assert!(message.contains("reconstruction.deeper"), "{message}");
    }

    #[test]
    fn renders_sections_in_declared_order() {
        let config = Configuration::defaults().with_value("beamline", "2-BM");
        let rendered = render_document(&config).expect("render");

        let general = rendered.find("[general]").expect("general");
        let reconstruction = rendered.find("[reconstruction]").expect("reconstruction");
        let extra = rendered.find("[extra]").expect("extra");
        assert!(general < reconstruction && reconstruction < extra);

        let reparsed = parse_document(&rendered, Path::new("tomo.toml")).expect("reparse");
        assert_eq!(reparsed, config);
    }
}
