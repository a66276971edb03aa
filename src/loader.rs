//! Source image loading.
//!
//! The pipeline asks a [`Loader`] for the bytes behind an image identifier
//! (the source image, and every `watermark()` image). Two implementations
//! ship with the crate: [`FileLoader`] reads below a root directory, and
//! [`MemoryLoader`] serves a fixed map, which is what tests use.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("image not found: {0}")]
    NotFound(String),
    #[error("IO error loading {id}: {source}")]
    Io {
        id: String,
        #[source]
        source: io::Error,
    },
}

/// Fetches the encoded bytes of an image by identifier.
///
/// `Sync` so one loader can serve concurrent renders.
pub trait Loader: Sync {
    fn load(&self, id: &str) -> Result<Vec<u8>, LoadError>;
}

/// Reads identifiers as paths relative to `root`.
#[derive(Debug, Clone)]
pub struct FileLoader {
    root: PathBuf,
}

impl FileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map an identifier onto a path below the root. Absolute paths and any
    /// `..` component are refused.
    fn resolve(&self, id: &str) -> Option<PathBuf> {
        let relative = Path::new(id);
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        (clean && !id.is_empty()).then(|| self.root.join(relative))
    }
}

impl Loader for FileLoader {
    fn load(&self, id: &str) -> Result<Vec<u8>, LoadError> {
        let path = self
            .resolve(id)
            .ok_or_else(|| LoadError::NotFound(id.to_string()))?;
        fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => LoadError::NotFound(id.to_string()),
            _ => LoadError::Io {
                id: id.to_string(),
                source,
            },
        })
    }
}

/// In-memory map from identifier to bytes.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    images: HashMap<String, Vec<u8>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, bytes: Vec<u8>) {
        self.images.insert(id.into(), bytes);
    }

    pub fn with(mut self, id: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(id, bytes);
        self
    }
}

impl Loader for MemoryLoader {
    fn load(&self, id: &str) -> Result<Vec<u8>, LoadError> {
        self.images
            .get(id)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(id.to_string()))
    }
}
