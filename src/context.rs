//! Project context resolution for tmplgen.
//! Reads the project manifest and derives the values that fill template
//! placeholders.

use crate::constants::{MANIFEST_FILES, NAME_KEY, PROJECT_DIR_KEY, PROJECT_ROOT_KEY};
use crate::error::{Error, Result};
use cruet::Inflector;
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Placeholder names mapped to their values.
///
/// Keys are unique and keep insertion order: manifest entries first, then
/// derived entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: IndexMap<String, serde_json::Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `key`, replacing any previous value.
    pub fn insert<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Overlays `other` on top of this context; values from `other` win.
    pub fn merge(&mut self, other: &Context) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Converts the context into the JSON object handed to the renderer,
    /// keeping insertion order.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        )
    }

    /// Inserts `key` only when the manifest did not define it.
    fn insert_derived(&mut self, key: &str, value: String) {
        if !self.values.contains_key(key) {
            self.values.insert(key.to_string(), serde_json::Value::String(value));
        }
    }
}

impl From<IndexMap<String, serde_json::Value>> for Context {
    fn from(values: IndexMap<String, serde_json::Value>) -> Self {
        Self { values }
    }
}

/// Manifest formats, picked by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Toml,
    Json,
    Yaml,
}

impl ManifestFormat {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Some(Self::Toml),
            Some("json") => Some(Self::Json),
            Some("yml") | Some("yaml") => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// Parses manifest content into its top-level table.
///
/// # Errors
/// Returns the parser message when the content is malformed or its top level
/// is not a table.
pub fn parse_manifest(
    content: &str,
    format: ManifestFormat,
) -> std::result::Result<IndexMap<String, serde_json::Value>, String> {
    match format {
        ManifestFormat::Toml => {
            let table: toml::Table = toml::from_str(content).map_err(|e| e.to_string())?;
            Ok(table.into_iter().map(|(key, value)| (key, toml_to_json(value))).collect())
        }
        ManifestFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        ManifestFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
    }
}

/// Converts a TOML value to JSON; datetimes become their RFC 3339 text.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::Value::from(i),
        toml::Value::Float(f) => serde_json::Value::from(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table.into_iter().map(|(key, value)| (key, toml_to_json(value))).collect(),
        ),
    }
}

/// Derives the [`Context`] of one project directory.
#[derive(Debug, Clone)]
pub struct ContextResolver {
    project_root: PathBuf,
}

impl ContextResolver {
    pub fn new<P: AsRef<Path>>(project_root: P) -> Self {
        Self { project_root: project_root.as_ref().to_path_buf() }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Returns the first manifest found under the project root.
    ///
    /// # Errors
    /// * `Error::InvalidProject` if none of the manifest files exists
    pub fn find_manifest(&self) -> Result<PathBuf> {
        for file in MANIFEST_FILES {
            let manifest_path = self.project_root.join(file);
            if manifest_path.is_file() {
                debug!("Loading manifest from {}", manifest_path.display());
                return Ok(manifest_path);
            }
        }

        Err(self.invalid(format!(
            "no manifest found (tried: {})",
            MANIFEST_FILES.join(", ")
        )))
    }

    /// Reads the manifest and builds the context.
    ///
    /// # Errors
    /// * `Error::InvalidProject` if the manifest is missing, unreadable or malformed
    pub fn resolve(&self) -> Result<Context> {
        let manifest_path = self.find_manifest()?;
        let manifest_name = manifest_path.display().to_string();
        let format = ManifestFormat::from_path(&manifest_path)
            .ok_or_else(|| self.invalid(format!("unsupported manifest '{}'", manifest_name)))?;
        let content = std::fs::read_to_string(&manifest_path)
            .map_err(|e| self.invalid(format!("cannot read '{}': {}", manifest_name, e)))?;
        let values = parse_manifest(&content, format)
            .map_err(|e| self.invalid(format!("malformed '{}': {}", manifest_name, e)))?;

        let mut context = Context::from(values);
        self.derive(&mut context);

        debug!("Resolved {} context values", context.len());
        Ok(context)
    }

    fn derive(&self, context: &mut Context) {
        let root = self.project_root.canonicalize().unwrap_or_else(|_| self.project_root.clone());
        if let Some(dir_name) = root.file_name() {
            context.insert_derived(PROJECT_DIR_KEY, dir_name.to_string_lossy().into_owned());
        }
        context.insert_derived(PROJECT_ROOT_KEY, root.display().to_string());

        let name = match context.get(NAME_KEY).and_then(|v| v.as_str()) {
            Some(name) => name.to_string(),
            None => return,
        };
        context.insert_derived("name_snake_case", name.to_snake_case());
        context.insert_derived("name_kebab_case", name.to_kebab_case());
        context.insert_derived("name_pascal_case", name.to_pascal_case());
        context.insert_derived("name_camel_case", name.to_camel_case());
        context.insert_derived("name_screaming_snake_case", name.to_screaming_snake_case());
    }

    fn invalid(&self, reason: String) -> Error {
        Error::InvalidProject { project_dir: self.project_root.display().to_string(), reason }
    }
}
