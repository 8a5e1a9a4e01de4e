//! Path resolution utilities.

use crate::error::CliError;
use std::path::{Path, PathBuf};

/// Get the current working directory.
pub fn current_dir() -> Result<PathBuf, CliError> {
    std::env::current_dir().map_err(CliError::Io)
}

/// Resolve a path relative to the current directory.
pub fn resolve_path<P: AsRef<Path>>(path: P) -> Result<PathBuf, CliError> {
    let path = path.as_ref();
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(current_dir()?.join(path))
    }
}

/// Normalize a path for display, relative to the current directory when
/// possible.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();
    if let Ok(cwd) = std::env::current_dir()
        && let Ok(rel) = path.strip_prefix(&cwd)
    {
        return rel.display().to_string();
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path() {
        let result = resolve_path("Cargo.toml").unwrap();
        assert!(result.ends_with("Cargo.toml"));
    }

    #[test]
    fn test_resolve_absolute_path_unchanged() {
        let abs = if cfg!(windows) { "C:\\tmp\\x" } else { "/tmp/x" };
        let result = resolve_path(abs).unwrap();
        assert_eq!(result, Path::new(abs));
    }
}
