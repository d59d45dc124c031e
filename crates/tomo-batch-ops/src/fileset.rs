//! Expansion of a `file-name` value into the ordered files of a batch.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;
use walkdir::WalkDir;

use crate::center::CenterIndex;
use crate::paths;
use crate::OperationError;

/// How the batch members were discovered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileSetSource {
    SingleFile,
    Directory,
    Mapping(PathBuf),
}

/// Ordered, absolute data file paths of one batch.
#[derive(Clone, Debug, PartialEq)]
pub struct FileSet {
    input: PathBuf,
    files: Vec<PathBuf>,
    input_dir: PathBuf,
    source: FileSetSource,
}

impl FileSet {
    /// The expanded `file-name`, made absolute.
    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Directory holding the batch and its rotation center document.
    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn source(&self) -> &FileSetSource {
        &self.source
    }
}

/// Build a matcher from a comma separated list such as `*.h5, *.hdf`.
pub fn build_patterns(patterns: &str) -> Result<GlobSet, OperationError> {
    let mut builder = GlobSetBuilder::new();
    let mut count = 0;
    for pattern in patterns.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let glob = Glob::new(pattern).map_err(|err| {
            OperationError::InvalidInput(format!("invalid data file pattern '{pattern}': {err}"))
        })?;
        builder.add(glob);
        count += 1;
    }
    if count == 0 {
        return Err(OperationError::InvalidInput(
            "no data file patterns configured".into(),
        ));
    }
    builder
        .build()
        .map_err(|err| OperationError::InvalidInput(format!("invalid data file patterns: {err}")))
}

fn is_mapping_document(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Expand `file_name` into a file set.
///
/// A directory yields its direct children matching `patterns`, sorted by path.
/// A `.json` rotation center document yields the files it lists, in index
/// order, relative to the document's directory. Any other file is a batch of
/// one.
pub fn expand_file_set(file_name: &Path, patterns: &str) -> Result<FileSet, OperationError> {
    let absolute =
        paths::absolutize(file_name).map_err(|source| OperationError::io(file_name, source))?;
    if !absolute.exists() {
        return Err(OperationError::InputNotFound { path: absolute });
    }

    let set = if absolute.is_dir() {
        let matcher = build_patterns(patterns)?;
        let mut files = Vec::new();
        for entry in WalkDir::new(&absolute)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|err| {
                let path = err.path().unwrap_or(&absolute).to_path_buf();
                OperationError::io(path, err.into())
            })?;
            if entry.file_type().is_file() && matcher.is_match(entry.file_name()) {
                files.push(entry.into_path());
            }
        }
        files.sort();
        FileSet {
            input: absolute.clone(),
            files,
            input_dir: absolute.clone(),
            source: FileSetSource::Directory,
        }
    } else if is_mapping_document(&absolute) {
        let index = CenterIndex::load(&absolute)?;
        let input_dir = absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        FileSet {
            input: absolute.clone(),
            files: index
                .basenames()
                .map(|basename| input_dir.join(basename))
                .collect(),
            input_dir,
            source: FileSetSource::Mapping(absolute.clone()),
        }
    } else {
        let input_dir = absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        FileSet {
            input: absolute.clone(),
            files: vec![absolute.clone()],
            input_dir,
            source: FileSetSource::SingleFile,
        }
    };

    if set.is_empty() {
        return Err(OperationError::NoInputFiles { path: absolute });
    }
    debug!(
        input = %absolute.display(),
        files = set.len(),
        source = ?set.source,
        "expanded file set"
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn directory_members_are_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        for name in ["b.h5", "a.hdf", "notes.txt", "c.H5"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("nested.h5")).unwrap();
        fs::write(dir.path().join("nested.h5").join("d.h5"), b"").unwrap();

        let set = expand_file_set(dir.path(), "*.h5, *.hdf").unwrap();
        let names: Vec<_> = set
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.hdf", "b.h5"]);
        assert_eq!(set.source(), &FileSetSource::Directory);
    }

    #[test]
    fn single_file_is_a_batch_of_one() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("scan.h5");
        fs::write(&file, b"").unwrap();

        let set = expand_file_set(&file, "*.hdf").unwrap();
        assert_eq!(set.files(), [file]);
        assert_eq!(set.input_dir(), dir.path());
    }

    #[test]
    fn mapping_document_lists_its_files_in_index_order() {
        let dir = tempdir().unwrap();
        for name in ["a.h5", "b.h5", "unlisted.h5"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let document = dir.path().join("centers.json");
        fs::write(
            &document,
            r#"{"10": {"a.h5": 1010.0}, "2": {"b.h5": 1020.0}}"#,
        )
        .unwrap();

        let set = expand_file_set(&document, "*.h5").unwrap();
        assert_eq!(
            set.files(),
            [dir.path().join("b.h5"), dir.path().join("a.h5")]
        );
        assert_eq!(set.input_dir(), dir.path());
        assert_eq!(set.source(), &FileSetSource::Mapping(document));
    }

    #[test]
    fn missing_and_empty_inputs_are_distinct_errors() {
        let dir = tempdir().unwrap();
        let err = expand_file_set(&dir.path().join("gone"), "*.h5").unwrap_err();
        assert!(matches!(err, OperationError::InputNotFound { .. }), "{err}");

        let err = expand_file_set(dir.path(), "*.h5").unwrap_err();
        assert!(matches!(err, OperationError::NoInputFiles { .. }), "{err}");
    }

    #[test]
    fn blank_pattern_list_is_invalid() {
        let err = build_patterns(" , ").unwrap_err();
        assert!(matches!(err, OperationError::InvalidInput(_)), "{err}");
    }
}
