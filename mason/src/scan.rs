//! Filesystem scanning: resolves a resource path to its current status and
//! content fingerprint.

use std::fs::{self, File, Metadata};
use std::io::{self, BufReader};

use sha2::{Digest, Sha256};

use crate::resource::ResourceStatus;

/// Produces the (status, checksum) observation for a resource path. The
/// checksum is empty unless the path is a file.
///
/// The syncer and executor take a scanner by reference, so tests can
/// substitute an implementation that does not touch the filesystem.
pub trait Scan {
  fn scan(&self, path: &str) -> Result<(ResourceStatus, Vec<u8>), io::Error>;
}

/// Scanner over the real filesystem, fingerprinting file contents with
/// SHA-256.
#[derive(Default, Copy, Clone, Debug)]
pub struct FsScanner;

impl Scan for FsScanner {
  fn scan(&self, path: &str) -> Result<(ResourceStatus, Vec<u8>), io::Error> {
    let Some(metadata) = metadata(path)? else {
      return Ok((ResourceStatus::Missing, Vec::new()));
    };
    if metadata.is_dir() {
      return Ok((ResourceStatus::Directory, Vec::new()));
    }
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok((ResourceStatus::File, hasher.finalize().to_vec()))
  }
}

/// Fingerprints a byte string with the same digest the scanner uses for file
/// contents. Used for the build description.
pub fn fingerprint(bytes: &[u8]) -> Vec<u8> {
  Sha256::digest(bytes).to_vec()
}

/// Gets the metadata for given `path`, returning:
/// - `Ok(Some(metadata))` if a file or directory exists at given path,
/// - `Ok(None)` if no file or directory exists at given path,
/// - `Err(e)` if there was an error getting the metadata for given path.
fn metadata(path: &str) -> Result<Option<Metadata>, io::Error> {
  match fs::metadata(path) {
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e),
    Ok(m) => Ok(Some(m)),
  }
}
