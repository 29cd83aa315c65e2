//! Lookup of rule-set documents by reference name

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Cannot find rule-set '{0}'")]
    NotFound(String),

    #[error("Cannot read rule-set '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// A loaded rule-set document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Name the document was requested by
    pub name: String,
    /// Where the document was found, used in diagnostics
    pub location: PathBuf,
    pub content: String,
}

/// Resolves rule-set reference names to documents
pub trait ResourceLoader: Send + Sync {
    fn load(&self, name: &str) -> Result<Resource, ResourceError>;

    /// Whether `name` can be resolved, without reading it
    fn exists(&self, name: &str) -> bool {
        self.load(name).is_ok()
    }
}

/// Looks up names as paths, first as given and then under each search path
#[derive(Debug, Clone, Default)]
pub struct FileSystemResourceLoader {
    search_paths: Vec<PathBuf>,
}

impl FileSystemResourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn with_search_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search_paths.extend(paths);
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let direct = Path::new(name);
        if direct.is_file() {
            return Some(direct.to_path_buf());
        }
        if direct.is_absolute() {
            return None;
        }
        self.search_paths
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }
}

impl ResourceLoader for FileSystemResourceLoader {
    fn load(&self, name: &str) -> Result<Resource, ResourceError> {
        let path = self
            .resolve(name)
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))?;
        log::debug!("Reading rule-set {} from {}", name, path.display());
        let content = fs::read_to_string(&path).map_err(|source| ResourceError::Io {
            name: name.to_string(),
            source,
        })?;
        Ok(Resource {
            name: name.to_string(),
            location: path,
            content,
        })
    }

    fn exists(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }
}

/// Documents held in memory, keyed by name
#[derive(Debug, Clone, Default)]
pub struct InMemoryResourceLoader {
    resources: HashMap<String, String>,
}

impl InMemoryResourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.resources.insert(name.into(), content.into());
    }

    pub fn with_resource(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(name, content);
        self
    }
}

impl ResourceLoader for InMemoryResourceLoader {
    fn load(&self, name: &str) -> Result<Resource, ResourceError> {
        let content = self
            .resources
            .get(name)
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))?;
        Ok(Resource {
            name: name.to_string(),
            location: PathBuf::from(name),
            content: content.clone(),
        })
    }

    fn exists(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }
}
