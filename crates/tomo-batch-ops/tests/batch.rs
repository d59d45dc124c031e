use std::fs;

use pretty_assertions::assert_eq;
use tomo_batch_config::{registry, ConfigError, Overrides};
use tomo_batch_format::{FailureStage, FileStatus};
use tomo_batch_ops::{
    CenterIndex, CenterMode, CenterSelection, ExitCode, FindCenterOptions, OperationError,
    ReconOptions,
};
use tomo_batch_test_support::{RecordingReconstructor, ScriptedDetector, Workspace};

fn file_name_override(workspace: &Workspace) -> Overrides {
    let mut overrides = Overrides::default();
    overrides.set(
        registry::FILE_NAME,
        workspace.data_dir().to_string_lossy().into_owned(),
    );
    overrides
}

#[test]
fn find_center_indexes_every_file_in_sorted_order() {
    let workspace = Workspace::new().with_data_files(&["c.h5", "a.h5", "b.hdf", "notes.txt"]);
    let detector = ScriptedDetector::new()
        .center("a.h5", 1001.0)
        .center("b.hdf", 1002.5)
        .center("c.h5", 1003.0)
        .build();
    let ops = workspace.operations(RecordingReconstructor::new(), detector.clone());

    let outcome = ops
        .find_center(FindCenterOptions {
            overrides: file_name_override(&workspace),
            ..FindCenterOptions::default()
        })
        .expect("find_center");

    assert_eq!(outcome.exit_code, ExitCode::Success);
    let artifact = workspace.data_dir().join("rotation_axis.json");
    assert_eq!(outcome.report.artifact.as_deref(), Some(artifact.as_path()));

    let index = CenterIndex::load(&artifact).expect("load index");
    let entries: Vec<_> = index.iter().map(|(name, center)| (name.to_string(), center)).collect();
    assert_eq!(
        entries,
        vec![
            ("a.h5".to_string(), 1001.0),
            ("b.hdf".to_string(), 1002.5),
            ("c.h5".to_string(), 1003.0),
        ]
    );

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&artifact).unwrap()).unwrap();
    assert_eq!(raw["0"]["a.h5"], 1001.0);
    assert_eq!(raw["2"]["c.h5"], 1003.0);
    assert_eq!(detector.calls().len(), 3);
}

#[test]
fn find_center_omits_failed_detections_and_keeps_indices_contiguous() {
    let workspace = Workspace::new().with_data_files(&["a.h5", "b.h5", "c.h5"]);
    let detector = ScriptedDetector::new()
        .center("a.h5", 990.0)
        .failure("b.h5", "no sinogram signal")
        .center("c.h5", 995.0)
        .build();
    let ops = workspace.operations(RecordingReconstructor::new(), detector);

    let outcome = ops
        .find_center(FindCenterOptions {
            overrides: file_name_override(&workspace),
            ..FindCenterOptions::default()
        })
        .expect("find_center");

    assert_eq!(outcome.exit_code, ExitCode::BatchFailures);
    assert_eq!(outcome.report.failed_count(), 1);
    assert!(matches!(
        outcome.report.files[1].status,
        FileStatus::Failed {
            stage: FailureStage::Detection,
            ..
        }
    ));

    let index = CenterIndex::load(&workspace.data_dir().join("rotation_axis.json")).unwrap();
    assert_eq!(index.basenames().collect::<Vec<_>>(), ["a.h5", "c.h5"]);
    let rendered = index.to_json_string().unwrap();
    assert!(rendered.contains("\"1\""), "{rendered}");
    assert!(!rendered.contains("\"2\""), "{rendered}");
}

#[test]
fn find_center_runs_detection_in_parallel_when_configured() {
    let names: Vec<String> = (0..16).map(|n| format!("scan_{n:02}.h5")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let workspace = Workspace::new().with_data_files(&refs);
    let mut detector = ScriptedDetector::new();
    for (n, name) in names.iter().enumerate() {
        detector = detector.center(name, 1000.0 + n as f64);
    }
    let ops = workspace.operations(RecordingReconstructor::new(), detector.build());

    let mut overrides = file_name_override(&workspace);
    overrides.set(registry::PARALLEL_DETECTION, true);
    ops.find_center(FindCenterOptions {
        overrides,
        ..FindCenterOptions::default()
    })
    .expect("find_center");

    let index = CenterIndex::load(&workspace.data_dir().join("rotation_axis.json")).unwrap();
    for (n, (name, center)) in index.iter().enumerate() {
        assert_eq!(name, names[n]);
        assert_eq!(center, 1000.0 + n as f64);
    }
}

#[test]
fn explicit_scalar_applies_to_every_file_without_detection() {
    let workspace = Workspace::new().with_data_files(&["a.h5", "b.h5"]);
    let reconstructor = RecordingReconstructor::new();
    let detector = ScriptedDetector::new().build();
    let ops = workspace.operations(reconstructor.clone(), detector.clone());

    let outcome = ops
        .recon(ReconOptions {
            overrides: file_name_override(&workspace),
            center: CenterSelection {
                rotation_axis: Some(1024.0),
                ..CenterSelection::default()
            },
            ..ReconOptions::default()
        })
        .expect("recon");

    assert_eq!(outcome.exit_code, ExitCode::Success);
    let calls = reconstructor.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|call| call.center == 1024.0));
    assert!(detector.calls().is_empty());

    let expected_output = workspace.root().join("scan_rec");
    assert!(calls.iter().all(|call| call.output == expected_output));
    assert!(expected_output.is_dir());
}

#[test]
fn missing_mapping_entry_fails_before_any_reconstruction() {
    let workspace = Workspace::new().with_data_files(&["a.h5", "b.h5"]);
    workspace.write_centers("rotation_axis.json", &[("a.h5", 1010.0)]);
    let reconstructor = RecordingReconstructor::new();
    let ops = workspace.operations(reconstructor.clone(), ScriptedDetector::new().build());

    let err = ops
        .recon(ReconOptions {
            overrides: file_name_override(&workspace),
            ..ReconOptions::default()
        })
        .expect_err("missing entry");

    match &err {
        OperationError::MissingCenterEntry { basename, .. } => assert_eq!(basename, "b.h5"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.exit_code(), ExitCode::MissingCenterEntry);
    assert!(reconstructor.calls().is_empty());
    assert!(!workspace.config_path().exists());
}

#[test]
fn mapping_with_extra_entries_is_accepted() {
    let workspace = Workspace::new().with_data_files(&["a.h5"]);
    workspace.write_centers(
        "rotation_axis.json",
        &[("old.h5", 900.0), ("a.h5", 1010.0), ("other.h5", 1020.0)],
    );
    let reconstructor = RecordingReconstructor::new();
    let ops = workspace.operations(reconstructor.clone(), ScriptedDetector::new().build());

    let outcome = ops
        .recon(ReconOptions {
            overrides: file_name_override(&workspace),
            ..ReconOptions::default()
        })
        .expect("recon");

    assert_eq!(outcome.exit_code, ExitCode::Success);
    assert_eq!(reconstructor.calls()[0].center, 1010.0);
}

#[test]
fn persistence_failure_aborts_before_reconstruction() {
    let workspace = Workspace::new().with_data_files(&["a.h5"]);
    fs::write(workspace.root().join("home"), "not a directory").unwrap();
    let reconstructor = RecordingReconstructor::new();
    let ops = workspace.operations(reconstructor.clone(), ScriptedDetector::new().build());

    let err = ops
        .recon(ReconOptions {
            overrides: file_name_override(&workspace),
            center: CenterSelection {
                rotation_axis: Some(1024.0),
                ..CenterSelection::default()
            },
            ..ReconOptions::default()
        })
        .expect_err("persistence failure");

    assert!(
        matches!(err, OperationError::Config(ConfigError::Persistence { .. })),
        "{err}"
    );
    assert_eq!(err.exit_code(), ExitCode::Config);
    assert!(reconstructor.calls().is_empty());
}

#[test]
fn per_file_failures_do_not_stop_the_batch() {
    let workspace = Workspace::new().with_data_files(&["a.h5", "b.h5", "c.h5"]);
    let reconstructor = RecordingReconstructor::failing_for(&["b.h5"]);
    let detector = ScriptedDetector::new()
        .failure("a.h5", "detector crashed")
        .center("b.h5", 1000.0)
        .center("c.h5", 1001.0)
        .build();
    let ops = workspace.operations(reconstructor.clone(), detector);

    let mut overrides = file_name_override(&workspace);
    overrides.set(registry::ROTATION_AXIS_AUTO, "auto");
    let outcome = ops
        .recon(ReconOptions {
            overrides,
            ..ReconOptions::default()
        })
        .expect("recon");

    assert_eq!(outcome.exit_code, ExitCode::BatchFailures);
    let stages: Vec<_> = outcome
        .report
        .files
        .iter()
        .map(|file| match &file.status {
            FileStatus::Succeeded => None,
            FileStatus::Failed { stage, .. } => Some(*stage),
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            Some(FailureStage::Detection),
            Some(FailureStage::Reconstruction),
            None
        ]
    );
    assert_eq!(reconstructor.calls().len(), 2);
}

#[test]
fn read_auto_without_document_detects_centers() {
    let workspace = Workspace::new().with_data_files(&["a.h5"]);
    let reconstructor = RecordingReconstructor::new();
    let detector = ScriptedDetector::new().center("a.h5", 1234.5).build();
    let ops = workspace.operations(reconstructor.clone(), detector.clone());

    let outcome = ops
        .recon(ReconOptions {
            overrides: file_name_override(&workspace),
            center: CenterSelection {
                mode: Some(CenterMode::ReadAuto),
                ..CenterSelection::default()
            },
            ..ReconOptions::default()
        })
        .expect("recon");

    assert_eq!(outcome.report.center_source, "auto");
    assert_eq!(detector.calls().len(), 1);
    assert_eq!(reconstructor.calls()[0].center, 1234.5);
}

#[test]
fn recon_from_a_center_document_uses_its_centers() {
    let workspace = Workspace::new().with_data_files(&["a.h5", "b.h5", "c.h5"]);
    let document = workspace.write_centers("centers.json", &[("b.h5", 1020.0), ("a.h5", 1010.0)]);
    workspace.write_centers("rotation_axis.json", &[("c.h5", 999.0)]);
    let reconstructor = RecordingReconstructor::new();
    let detector = ScriptedDetector::new().build();
    let ops = workspace.operations(reconstructor.clone(), detector.clone());

    let mut overrides = Overrides::default();
    overrides.set(registry::FILE_NAME, document.to_string_lossy().into_owned());
    let outcome = ops
        .recon(ReconOptions {
            overrides,
            ..ReconOptions::default()
        })
        .expect("recon");

    assert_eq!(outcome.exit_code, ExitCode::Success);
    assert_eq!(
        outcome.report.center_source,
        format!("mapping {}", document.display())
    );
    assert!(detector.calls().is_empty());
    let calls: Vec<_> = reconstructor
        .calls()
        .into_iter()
        .map(|call| (call.file, call.center))
        .collect();
    assert_eq!(
        calls,
        vec![
            (workspace.data_dir().join("b.h5"), 1020.0),
            (workspace.data_dir().join("a.h5"), 1010.0),
        ]
    );
}

#[test]
fn forced_auto_ignores_the_listing_document_centers() {
    let workspace = Workspace::new().with_data_files(&["a.h5"]);
    let document = workspace.write_centers("centers.json", &[("a.h5", 1010.0)]);
    let reconstructor = RecordingReconstructor::new();
    let detector = ScriptedDetector::new().center("a.h5", 1011.5).build();
    let ops = workspace.operations(reconstructor.clone(), detector.clone());

    let mut overrides = Overrides::default();
    overrides.set(registry::FILE_NAME, document.to_string_lossy().into_owned());
    let outcome = ops
        .recon(ReconOptions {
            overrides,
            center: CenterSelection {
                mode: Some(CenterMode::Auto),
                ..CenterSelection::default()
            },
            ..ReconOptions::default()
        })
        .expect("recon");

    assert_eq!(outcome.report.center_source, "auto");
    assert_eq!(detector.calls().len(), 1);
    assert_eq!(reconstructor.calls()[0].center, 1011.5);
}

#[test]
fn configuration_is_sticky_between_runs() {
    let workspace = Workspace::new().with_data_files(&["a.h5"]);
    let reconstructor = RecordingReconstructor::new();
    let ops = workspace.operations(reconstructor.clone(), ScriptedDetector::new().build());

    let mut overrides = file_name_override(&workspace);
    overrides
        .set(registry::ROTATION_AXIS, 1111.0)
        .set(registry::ROTATION_AXIS_AUTO, "manual")
        .set(registry::OUTPUT_FOLDER, "{file_name_parent}/{reconstruction_algorithm}");
    ops.recon(ReconOptions {
        overrides,
        ..ReconOptions::default()
    })
    .expect("first run");

    // Second run without any overrides reuses everything from the first.
    ops.recon(ReconOptions::default()).expect("second run");

    let calls = reconstructor.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].center, 1111.0);
    assert_eq!(calls[1].output, workspace.data_dir().join("gridrec"));
}

#[test]
fn full_reconstruction_writes_a_repeatable_config_snapshot() {
    let workspace = Workspace::new().with_data_files(&["a.h5"]);
    let ops = workspace.operations(RecordingReconstructor::new(), ScriptedDetector::new().build());

    let mut overrides = file_name_override(&workspace);
    overrides.set(registry::RECONSTRUCTION_TYPE, "full");
    ops.recon(ReconOptions {
        overrides,
        center: CenterSelection {
            rotation_axis: Some(1050.0),
            ..CenterSelection::default()
        },
        ..ReconOptions::default()
    })
    .expect("recon");

    let snapshot = workspace.root().join("scan_rec").join("a_rec.toml");
    let contents = fs::read_to_string(&snapshot).expect("snapshot written");
    assert!(contents.contains("rotation-axis = 1050.0"), "{contents}");
    assert!(contents.contains("rotation-axis-auto = \"manual\""), "{contents}");
    assert!(contents.contains("a.h5"), "{contents}");
}

#[test]
fn unresolved_output_placeholder_fails_per_file() {
    let workspace = Workspace::new().with_data_files(&["a.h5"]);
    let reconstructor = RecordingReconstructor::new();
    let ops = workspace.operations(reconstructor.clone(), ScriptedDetector::new().build());

    let mut overrides = file_name_override(&workspace);
    overrides.set(registry::OUTPUT_FOLDER, "/scratch/{operator}");
    let outcome = ops
        .recon(ReconOptions {
            overrides,
            center: CenterSelection {
                rotation_axis: Some(1000.0),
                ..CenterSelection::default()
            },
            ..ReconOptions::default()
        })
        .expect("recon");

    assert_eq!(outcome.exit_code, ExitCode::BatchFailures);
    match &outcome.report.files[0].status {
        FileStatus::Failed { stage, message } => {
            assert_eq!(*stage, FailureStage::OutputPath);
            assert!(message.contains("operator"), "{message}");
        }
        other => panic!("unexpected status: {other:?}"),
    }
    assert!(reconstructor.calls().is_empty());
}

#[test]
fn missing_input_is_reported() {
    let workspace = Workspace::new();
    let ops = workspace.operations(RecordingReconstructor::new(), ScriptedDetector::new().build());

    let mut overrides = Overrides::default();
    overrides.set(
        registry::FILE_NAME,
        workspace.root().join("nowhere").to_string_lossy().into_owned(),
    );
    let err = ops
        .find_center(FindCenterOptions {
            overrides,
            ..FindCenterOptions::default()
        })
        .expect_err("missing input");
    assert!(matches!(err, OperationError::InputNotFound { .. }), "{err}");
}
