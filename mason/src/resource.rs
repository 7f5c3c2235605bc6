/// What a resource path resolved to the last time it was scanned.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Debug)]
pub enum ResourceStatus {
  /// Never scanned.
  #[default]
  Unknown,
  File,
  Directory,
  Missing,
}

impl ResourceStatus {
  pub(crate) fn to_i64(self) -> i64 {
    match self {
      ResourceStatus::Unknown => 0,
      ResourceStatus::File => 1,
      ResourceStatus::Directory => 2,
      ResourceStatus::Missing => 3,
    }
  }

  pub(crate) fn from_i64(value: i64) -> Self {
    match value {
      1 => ResourceStatus::File,
      2 => ResourceStatus::Directory,
      3 => ResourceStatus::Missing,
      _ => ResourceStatus::Unknown,
    }
  }
}

/// An externally observable artifact tracked by path and content fingerprint.
///
/// The checksum is an opaque byte string; it is empty whenever the status is
/// not [`ResourceStatus::File`].
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Resource {
  pub path: String,
  pub status: ResourceStatus,
  pub checksum: Vec<u8>,
}

impl Resource {
  /// A resource that has never been scanned.
  pub fn new(path: impl Into<String>) -> Self {
    Self { path: path.into(), status: ResourceStatus::Unknown, checksum: Vec::new() }
  }
}
