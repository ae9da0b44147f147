//! Shared node model, error taxonomy, configuration and serialization for
//! coursepub.
//!
//! This crate is the foundation depended on by all other coursepub crates.
//! It provides:
//! - The materials tree ([`Universe`], [`Collection`], [`Publication`], [`Artifact`])
//!   and the [`TreeNode`] trait implemented by its internal nodes
//! - The error taxonomy ([`DiscoveryError`], [`BuildError`], [`ValidationError`], [`Error`])
//! - Configuration ([`PipelineConfig`], config loading)
//! - Round-trip serialization ([`serialize`], [`deserialize`])

pub mod config;
pub mod error;
pub mod serialize;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    BuildConfig, CONFIG_FILE_NAME, DiscoverConfig, LogFormat, LoggingConfig, PipelineConfig,
    PublishConfig, PublishMode, load_config, load_config_from,
};
pub use error::{
    BuildError, BuildFailure, DiscoveryError, Error, ErrorPolicy, Result, ValidationError,
    ValidationReason,
};
pub use serialize::{deserialize, from_plain, serialize, to_plain};
pub use types::{
    Artifact, BuiltArtifact, Collection, DEFAULT_COLLECTION, KeyPath, Metadata, Publication,
    PublicationSchema, PublishedArtifact, TreeNode, UnbuiltArtifact, Universe,
};

pub use coursepub_schema as schema;
