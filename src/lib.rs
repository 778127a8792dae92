//! tmplgen is a template-driven file generation engine.
//! A [`Generator`] is bound to a project directory, whose manifest supplies the
//! context, and to a template directory; each call renders one template and
//! writes one file.

/// Generator options
pub mod config;

/// Well-known file names and context keys
pub mod constants;

/// Project manifest loading and context derivation
/// Supports project.toml, project.json, project.yml, project.yaml
pub mod context;

/// Error types and handling
pub mod error;

/// The generation façade tying the other components together
pub mod generator;

/// Logger initialization for embedding binaries
pub mod logger;

/// Placeholder substitution
pub mod renderer;

/// Template lookup under the template root
pub mod store;

pub use config::GeneratorOptions;
pub use context::Context;
pub use error::{Error, ErrorKind, Result};
pub use generator::Generator;
