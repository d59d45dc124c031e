use std::fs;
use std::io::Write;
use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tomo_batch_config::{
    merge, registry, ConfigError, ConfigSourceKind, ConfigStore, Configuration, LoadOptions,
    Overrides,
};

fn write_file(path: impl AsRef<Path>, contents: &str) {
    let mut file = fs::File::create(path).expect("create config");
    file.write_all(contents.as_bytes()).expect("write config");
}

fn store_in(dir: &TempDir) -> ConfigStore {
    ConfigStore::open(LoadOptions::default().with_default_path(dir.path().join("tomo-batch.toml")))
        .expect("open store")
}

#[test]
fn loads_defaults_when_no_document_present() {
    let temp = TempDir::new().expect("tempdir");
    let store = store_in(&temp);

    let config = store.load().expect("load defaults");

    assert_eq!(config, Configuration::defaults());
    assert_eq!(config.get_str(registry::ROTATION_AXIS_FILE), Some("rotation_axis.json"));
    assert_eq!(config.get_f64(registry::ROTATION_AXIS), Some(-1.0));
    assert_eq!(store.source_kind(), ConfigSourceKind::Default);
    assert!(!store.default_path().exists());
}

#[test]
fn persisted_values_become_next_run_defaults() {
    let temp = TempDir::new().expect("tempdir");
    let store = store_in(&temp);

    let mut overrides = Overrides::default();
    overrides
        .set(registry::ROTATION_AXIS, 1024.0)
        .set(registry::FILE_NAME, "/data/sample_001.h5")
        .set(registry::BINNING, 2_i64)
        .set("beamline", "2-BM");
    let first = merge(&store.load().expect("load"), &overrides);
    let written = store.persist(&first).expect("persist");
    assert_eq!(written.as_deref(), Some(store.default_path()));

    let second = store_in(&temp).load().expect("reload");
    assert_eq!(second, first);
    assert_eq!(second.get_f64(registry::ROTATION_AXIS), Some(1024.0));
    assert_eq!(second.get_i64(registry::BINNING), Some(2));
    assert_eq!(second.get_str("beamline"), Some("2-BM"));
}

#[test]
fn cleared_keys_stay_cleared_across_runs() {
    let temp = TempDir::new().expect("tempdir");
    let store = store_in(&temp);

    let mut overrides = Overrides::default();
    overrides.unset(registry::OUTPUT_FOLDER);
    let config = merge(&store.load().expect("load"), &overrides);
    store.persist(&config).expect("persist");

    let contents = fs::read_to_string(store.default_path()).expect("read document");
    assert!(contents.contains("unset = [\"output-folder\"]"), "{contents}");

    let reloaded = store_in(&temp).load().expect("reload");
    assert_eq!(reloaded.get(registry::OUTPUT_FOLDER), None);
    assert!(reloaded.is_cleared(registry::OUTPUT_FOLDER));
}

#[test]
fn alternate_document_is_read_only() {
    let temp = TempDir::new().expect("tempdir");
    let alternate = temp.path().join("beamtime.toml");
    write_file(
        &alternate,
        r#"
        [find-rotation-axis]
        rotation-axis = 990.5
        "#,
    );

    let store = ConfigStore::open(
        LoadOptions::default()
            .with_default_path(temp.path().join("tomo-batch.toml"))
            .with_override_path(&alternate),
    )
    .expect("open store");

    let config = store.load().expect("load alternate");
    assert_eq!(config.get_f64(registry::ROTATION_AXIS), Some(990.5));
    assert_eq!(store.source_kind(), ConfigSourceKind::Alternate);
    assert_eq!(store.persist(&config).expect("persist"), None);
    assert!(!temp.path().join("tomo-batch.toml").exists());
}

#[test]
fn missing_alternate_document_is_an_error() {
    let temp = TempDir::new().expect("tempdir");
    let store = ConfigStore::open(
        LoadOptions::default()
            .with_default_path(temp.path().join("tomo-batch.toml"))
            .with_override_path(temp.path().join("missing.toml")),
    )
    .expect("open store");

    let err = store.load().expect_err("expected missing override");
    assert!(matches!(err, ConfigError::OverrideNotFound { .. }), "{err}");
}

#[test]
fn persistence_failure_is_surfaced() {
    let temp = TempDir::new().expect("tempdir");
    let blocker = temp.path().join("not-a-dir");
    write_file(&blocker, "plain file");

    let store = ConfigStore::open(
        LoadOptions::default().with_default_path(blocker.join("tomo-batch.toml")),
    )
    .expect("open store");

    let err = store
        .persist(&Configuration::defaults())
        .expect_err("expected persistence failure");
    assert!(matches!(err, ConfigError::Persistence { .. }), "{err}");
}

#[test]
fn invalid_choice_in_document_surfaces_validation_error() {
    let temp = TempDir::new().expect("tempdir");
    let store = store_in(&temp);
    write_file(
        store.default_path(),
        r#"
        [reconstruction]
        reconstruction-type = "everything"
        "#,
    );

    let err = store.load().expect_err("expected validation failure");
    match err {
        ConfigError::Validation(errors) => {
            let joined = errors.to_string();
            assert!(
                joined.contains("reconstruction-type: invalid choice 'everything'"),
                "unexpected error output: {joined}"
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn init_writes_defaults_once() {
    let temp = TempDir::new().expect("tempdir");
    let store = store_in(&temp);

    let path = store.init().expect("init");
    let contents = fs::read_to_string(&path).expect("read document");
    assert!(contents.contains("[find-rotation-axis]"));
    assert!(contents.contains("rotation-axis-auto = \"read_auto\""));

    let err = store.init().expect_err("second init");
    assert!(matches!(err, ConfigError::AlreadyExists { .. }), "{err}");
}
