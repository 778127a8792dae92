//! Generator options.
//! Options can be built in code or parsed from a JSON or YAML document.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Tunables of a [`crate::generator::Generator`]. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorOptions {
    /// Resolve the project context during construction instead of on first use.
    pub eager_context: bool,
    /// Cache template content for the lifetime of the generator.
    pub cache_templates: bool,
    /// Keep the final newline of template files in rendered output.
    pub keep_trailing_newline: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self { eager_context: false, cache_templates: true, keep_trailing_newline: true }
    }
}

impl GeneratorOptions {
    /// Parses options, trying JSON first and YAML second.
    ///
    /// # Errors
    /// * `Error::Config` if the content is neither valid JSON nor valid YAML options
    pub fn parse(content: &str) -> Result<Self> {
        match serde_json::from_str(content) {
            Ok(options) => Ok(options),
            Err(_) => serde_yaml::from_str(content)
                .map_err(|e| Error::Config(format!("Invalid options format: {}", e))),
        }
    }
}
