//! Real-disk [`FileSystem`] implementation for the CLI.

use std::path::{Path, PathBuf};

use elfhex_core::error::CoreError;
use elfhex_core::loader::FileSystem;

/// A [`FileSystem`] backed by `std::fs`.
#[derive(Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn resolve(&self, include_path: &str, search_path: &[PathBuf]) -> Result<PathBuf, CoreError> {
        for dir in search_path {
            let candidate = dir.join(include_path);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        let direct = PathBuf::from(include_path);
        if direct.is_file() {
            return Ok(direct);
        }
        Err(CoreError::FileNotFound {
            include_path: include_path.to_owned(),
        })
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, CoreError> {
        std::fs::canonicalize(path).map_err(|source| CoreError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    fn read_to_string(&self, path: &Path) -> Result<String, CoreError> {
        std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}
