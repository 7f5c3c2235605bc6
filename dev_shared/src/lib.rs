use std::fs;
use std::path::Path;

use tempfile::{NamedTempFile, TempDir};

/// Creates a new temporary file that gets cleaned up when dropped.
pub fn create_temp_file() -> NamedTempFile {
  NamedTempFile::new().expect("failed to create temporary file")
}

/// Creates a new temporary directory that gets cleaned up when dropped.
pub fn create_temp_dir() -> TempDir {
  TempDir::new().expect("failed to create temporary directory")
}

/// Writes `contents` to the file at `path`, creating parent directories first.
pub fn write_file(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<(), std::io::Error> {
  let path = path.as_ref();
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }
  fs::write(path, contents)
}
