//! Error types for the publishing pipeline.
//!
//! Each stage has its own error: [`DiscoveryError`], [`BuildError`], and the
//! schema crate's [`ValidationError`]. [`Error`] is the catch-all used by
//! publish and by callers driving the whole pipeline. The CLI wraps these
//! with `color-eyre`.

use std::path::{Path, PathBuf};

pub use coursepub_schema::{ValidationError, ValidationReason};

use crate::types::KeyPath;

// ---------------------------------------------------------------------------
// DiscoveryError
// ---------------------------------------------------------------------------

/// Filesystem or parse problem while reading a source tree.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// A directory that must be a collection or publication has no declaration file.
    #[error("no {expected} found in {dir:?}")]
    MissingDeclaration { dir: PathBuf, expected: String },

    /// A declaration file is not valid YAML, or does not have the expected shape.
    #[error("malformed declaration file {path:?}: {message}")]
    Malformed { path: PathBuf, message: String },

    /// A publication does not satisfy its collection's schema.
    #[error("invalid publication {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        source: ValidationError,
    },

    /// A collection directory was found inside another collection.
    #[error("nested collection found at {path:?}")]
    NestedCollection { path: PathBuf },

    /// Two nodes would share a key.
    #[error("duplicate key {key:?} at {path:?}")]
    DuplicateKey { key: String, path: PathBuf },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl DiscoveryError {
    /// Create a malformed-file error from any displayable message.
    pub fn malformed(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The file or directory the error is about.
    pub fn path(&self) -> &Path {
        match self {
            Self::MissingDeclaration { dir, .. } => dir,
            Self::Malformed { path, .. }
            | Self::Invalid { path, .. }
            | Self::NestedCollection { path }
            | Self::DuplicateKey { path, .. }
            | Self::Io { path, .. } => path,
        }
    }
}

// ---------------------------------------------------------------------------
// BuildError
// ---------------------------------------------------------------------------

/// Why building a single artifact failed.
#[derive(Debug, thiserror::Error)]
pub enum BuildFailure {
    /// The recipe command ran but exited unsuccessfully.
    #[error("recipe `{command}` failed with {status}: {stderr}")]
    RecipeFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// The recipe command could not be started.
    #[error("could not run recipe `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// The recipe finished but the artifact file is not there.
    #[error("output {path:?} does not exist")]
    MissingOutput { path: PathBuf },

    /// A caller-supplied recipe reported an error.
    #[error("{0}")]
    Recipe(String),

    /// The artifact has already been published; it cannot go back to built.
    #[error("artifact is already published")]
    AlreadyPublished,
}

/// A build recipe failed for the artifact at `key_path`.
#[derive(Debug, thiserror::Error)]
#[error("failed to build {key_path}: {cause}")]
pub struct BuildError {
    pub key_path: KeyPath,
    #[source]
    pub cause: BuildFailure,
}

impl BuildError {
    pub fn new(key_path: KeyPath, cause: BuildFailure) -> Self {
        Self { key_path, cause }
    }
}

// ---------------------------------------------------------------------------
// ErrorPolicy
// ---------------------------------------------------------------------------

/// What a stage does after reporting an error to its callbacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop the stage and return the error.
    #[default]
    Abort,
    /// Drop the failing node and keep going.
    Continue,
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Catch-all error for publishing and whole-pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Build(#[from] BuildError),

    /// Two artifacts resolve to the same public path.
    #[error("public path {path:?} claimed by both {first} and {second}")]
    Collision {
        path: PathBuf,
        first: KeyPath,
        second: KeyPath,
    },

    /// A key cannot be turned into a path segment under the destination.
    #[error("invalid key in {key_path}: {reason}")]
    InvalidKey { key_path: KeyPath, reason: String },

    /// A node is at the wrong lifecycle stage for the requested operation.
    #[error("{key_path}: {message}")]
    InvalidState { key_path: KeyPath, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Conversion to or from the plain JSON form failed.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a serialization error from any displayable message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
