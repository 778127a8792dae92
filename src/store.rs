//! Template lookup and loading for tmplgen.
//! Resolves template identifiers relative to the template root, refusing any
//! identifier that would leave it, and optionally caches loaded content.

use crate::error::{Error, Result};
use log::debug;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use walkdir::WalkDir;

/// Reads templates from a single root directory.
#[derive(Debug)]
pub struct TemplateStore {
    /// Canonical template root
    root: PathBuf,
    cache_enabled: bool,
    /// Loaded content keyed by canonical template path
    cache: Mutex<HashMap<PathBuf, Arc<str>>>,
}

impl TemplateStore {
    /// Creates a store rooted at `root`.
    ///
    /// # Errors
    /// * `Error::InvalidPath` if the root does not exist or is not a directory
    pub fn new<P: AsRef<Path>>(root: P, cache_enabled: bool) -> Result<Self> {
        let root = root.as_ref();
        let canonical = root.canonicalize().map_err(|e| Error::InvalidPath {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;
        if !canonical.is_dir() {
            return Err(Error::InvalidPath {
                path: root.display().to_string(),
                reason: "not a directory".to_string(),
            });
        }

        Ok(Self { root: canonical, cache_enabled, cache: Mutex::new(HashMap::new()) })
    }

    /// Canonical template root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a template identifier to the canonical path of its file.
    ///
    /// # Errors
    /// * `Error::Traversal` if the identifier is absolute or its `..` segments climb above the root
    /// * `Error::AccessDenied` if the file resolves outside the root through a link
    /// * `Error::NotFound` if no file exists at the resolved location
    pub fn resolve(&self, template: &str) -> Result<PathBuf> {
        let relative = normalize(template)?;
        if relative.as_os_str().is_empty() {
            return Err(Error::NotFound { template: template.to_string() });
        }

        let resolved = match self.root.join(&relative).canonicalize() {
            Ok(path) => path,
            Err(e) => return Err(map_read_error(template, e)),
        };

        if !resolved.starts_with(&self.root) {
            debug!("Template '{}' resolves outside the root: {}", template, resolved.display());
            return Err(Error::AccessDenied { template: template.to_string() });
        }
        if !resolved.is_file() {
            return Err(Error::NotFound { template: template.to_string() });
        }

        Ok(resolved)
    }

    /// Loads the content of a template.
    pub fn load(&self, template: &str) -> Result<Arc<str>> {
        let path = self.resolve(template)?;

        if self.cache_enabled {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(content) = cache.get(&path) {
                debug!("Using cached template: {}", path.display());
                return Ok(Arc::clone(content));
            }
        }

        debug!("Reading template: {}", path.display());
        let content: Arc<str> =
            fs::read_to_string(&path).map_err(|e| map_read_error(template, e))?.into();

        if self.cache_enabled {
            self.cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(path, Arc::clone(&content));
        }

        Ok(content)
    }

    /// Lists every template identifier under the root, sorted.
    pub fn templates(&self) -> Result<Vec<String>> {
        let mut templates = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&self.root).map_err(|_| {
                Error::AccessDenied { template: entry.path().display().to_string() }
            })?;
            let segments: Vec<_> =
                relative.components().map(|c| c.as_os_str().to_string_lossy()).collect();
            templates.push(segments.join("/"));
        }
        Ok(templates)
    }

    /// Number of cached templates.
    pub fn cached(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drops all cached content.
    pub fn clear(&self) {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

/// Lexically normalizes a template identifier relative to the root.
fn normalize(template: &str) -> Result<PathBuf> {
    let mut parts: Vec<&OsStr> = Vec::new();
    for component in Path::new(template).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(Error::Traversal { template: template.to_string() });
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::Traversal { template: template.to_string() });
            }
        }
    }
    Ok(parts.iter().collect())
}

fn map_read_error(template: &str, err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::NotFound => Error::NotFound { template: template.to_string() },
        io::ErrorKind::PermissionDenied => {
            Error::AccessDenied { template: template.to_string() }
        }
        _ => Error::Io(err),
    }
}
