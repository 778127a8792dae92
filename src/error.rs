//! Error handling for tmplgen.
//! Defines the error taxonomy and result type shared by every component.

use std::io;
use thiserror::Error;

/// Custom error types for generation operations.
///
/// Every variant names the offending path, template or key so callers can
/// surface a precise diagnostic. Failures are local to a single call.
#[derive(Error, Debug)]
pub enum Error {
    /// A project or template root is missing, unreadable or not a directory.
    #[error("Invalid path '{path}': {reason}.")]
    InvalidPath { path: String, reason: String },

    /// The project manifest is missing or malformed.
    #[error("Invalid project '{project_dir}': {reason}.")]
    InvalidProject { project_dir: String, reason: String },

    /// No template file exists at the resolved location.
    #[error("Template '{template}' not found.")]
    NotFound { template: String },

    /// The template identifier climbs out of the template root.
    #[error("Template '{template}' escapes the template root.")]
    Traversal { template: String },

    /// The template resolves outside the root through a link, or cannot be read.
    #[error("Access denied to template '{template}'.")]
    AccessDenied { template: String },

    /// The template references a key the context does not bind.
    #[error("Unbound placeholder '{key}' in template '{template}'.")]
    UnboundPlaceholder { key: String, template: String },

    /// Writing the destination file failed.
    #[error("Failed to write '{path}': {source}.")]
    WriteFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Generator options could not be parsed.
    #[error("Configuration error: {0}.")]
    Config(String),

    /// The generator was used after `close`.
    #[error("Generator used after it was closed.")]
    UseAfterClose,

    /// Represents template syntax or evaluation errors
    #[error("Render error: {0}.")]
    Render(#[from] minijinja::Error),

    /// Represents errors that occur during file system operations
    #[error("IO error: {0}.")]
    Io(#[from] io::Error),
}

/// Category of an [`Error`], without the diagnostic payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidPath,
    InvalidProject,
    NotFound,
    Traversal,
    AccessDenied,
    UnboundPlaceholder,
    WriteFailed,
    Config,
    UseAfterClose,
    Render,
    Io,
}

impl Error {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidPath { .. } => ErrorKind::InvalidPath,
            Error::InvalidProject { .. } => ErrorKind::InvalidProject,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Traversal { .. } => ErrorKind::Traversal,
            Error::AccessDenied { .. } => ErrorKind::AccessDenied,
            Error::UnboundPlaceholder { .. } => ErrorKind::UnboundPlaceholder,
            Error::WriteFailed { .. } => ErrorKind::WriteFailed,
            Error::Config(_) => ErrorKind::Config,
            Error::UseAfterClose => ErrorKind::UseAfterClose,
            Error::Render(_) => ErrorKind::Render,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

/// Convenience type alias for Results with [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
