//! Path normalization: every key in the store has one canonical form.
//!
//! - backslashes become `/`
//! - leading `./` and `/` are stripped, repeated `/` collapse
//! - `.` segments are dropped
//! - `..` segments and empty paths are rejected

/// Error returned when a path cannot be normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("Path is empty")]
    Empty,

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },
}

/// Normalize a user- or model-supplied path to its canonical store key.
pub fn normalize_path(path: &str) -> Result<String, PathError> {
    let unified = path.trim().replace('\\', "/");

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(PathError::PathTraversal { path: path.into() });
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(PathError::Empty);
    }

    Ok(segments.join("/"))
}
