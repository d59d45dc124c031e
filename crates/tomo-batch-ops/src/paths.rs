use std::env;
use std::io;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

/// Canonicalise `.` and `..` path segments without touching the filesystem.
pub fn normalize_path(path: PathBuf) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }
    normalized
}

/// Join `path` onto the working directory when relative, then normalise.
pub fn absolutize(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize_path(path.to_path_buf()));
    }
    Ok(normalize_path(env::current_dir()?.join(path)))
}

fn ends_with_separator(value: &str) -> bool {
    value.ends_with('/') || value.ends_with(MAIN_SEPARATOR)
}

/// Directory a `file-name` value refers to: the value itself when it names an
/// existing directory or ends with a separator, otherwise its parent.
pub fn file_name_parent(file_name: &str) -> String {
    if ends_with_separator(file_name) {
        let trimmed = file_name.trim_end_matches(['/', MAIN_SEPARATOR]);
        return if trimmed.is_empty() {
            MAIN_SEPARATOR.to_string()
        } else {
            trimmed.to_string()
        };
    }
    let path = Path::new(file_name);
    if path.is_dir() {
        return file_name.to_string();
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_string_lossy().into_owned(),
        _ => ".".to_string(),
    }
}

/// File name including its extension, as used for rotation center lookups.
pub fn basename(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// File name without its final extension.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data".to_string())
}
