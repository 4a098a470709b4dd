//! Remote object keys derived from local file paths.

use crate::errors::{DeployError, DeployResult};
use std::{
    fmt,
    path::{Component, Path},
};

/// OSS accepts keys of 1 to 1023 bytes.
const MAX_OBJECT_KEY_LEN: usize = 1023;

/// Key under which a local file is stored in the bucket.
///
/// A key is the file's path relative to the deploy root, with components
/// joined by `/` whatever the host separator is. It never contains the root
/// folder itself and never starts with `/`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Strip `root` from `path` and turn the remainder into a key.
    ///
    /// Fails when `path` is not below `root`, when a component is not plain
    /// UTF-8 text, or when the result is empty or too long.
    pub fn from_path(root: &Path, path: &Path) -> DeployResult<Self> {
        let invalid = || DeployError::InvalidObjectKey(path.to_path_buf());
        let relative = path.strip_prefix(root).map_err(|_| invalid())?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => segments.push(part.to_str().ok_or_else(invalid)?),
                Component::CurDir => continue,
                _ => return Err(invalid()),
            }
        }

        let key = segments.join("/");
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(invalid());
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
