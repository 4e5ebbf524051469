//! Object storage holding the dataset snapshots.
//!
//! Object names follow the bucket layout, e.g.
//! `Maxmind/2017/08/15/20170815T200728Z-GeoLite2-City-CSV.zip` or
//! `RouteViewIPv4/2019/01/routeviews-rv2-20190101-1200.pfx2as.gz`.

use flate2::read::GzDecoder;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Read-only access to a bucket of objects.
pub trait ObjectStore: Send + Sync {
    /// Names of all objects under `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Full content of one object.
    fn get(&self, name: &str) -> Result<Vec<u8>>;
}

/// Bucket backed by a local directory tree; object names are paths
/// relative to the root, with `/` separators.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn walk(&self, dir: &Path, names: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.walk(&path, names)?;
            } else if let Ok(relative) = path.strip_prefix(&self.root) {
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                names.push(name);
            }
        }
        Ok(())
    }
}

impl ObjectStore for LocalStore {
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        if self.root.is_dir() {
            self.walk(&self.root, &mut names)?;
        }
        names.retain(|name| name.starts_with(prefix));
        names.sort();
        Ok(names)
    }

    fn get(&self, name: &str) -> Result<Vec<u8>> {
        if name.split('/').any(|part| part == "..") {
            return Err(Error::Config(format!("invalid object name: {}", name)));
        }
        Ok(fs::read(self.root.join(name))?)
    }
}

/// In-memory bucket.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, data: Vec<u8>) {
        self.objects.write().insert(name.into(), data);
    }

    pub fn remove(&self, name: &str) -> Option<Vec<u8>> {
        self.objects.write().remove(name)
    }
}

impl ObjectStore for MemoryStore {
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .read()
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn get(&self, name: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("object not found: {}", name),
                ))
            })
    }
}

/// Check if data is gzip compressed.
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

/// Wrap object bytes in a reader, transparently decompressing gzip.
pub fn byte_stream(data: Vec<u8>) -> Box<dyn Read + Send> {
    if is_gzip(&data) {
        Box::new(GzDecoder::new(Cursor::new(data)))
    } else {
        Box::new(Cursor::new(data))
    }
}
