//! # fsgen Common Library
//!
//! Shared code for the fsgen crates:
//! - Version comparison for artifact staleness
//! - Artifact inspection (existence, authorship, staleness) and backup naming
//! - Bootstrap TOML configuration and logging initialization
//! - Batch event types and the broadcast EventBus
//! - Human-readable duration formatting

pub mod artifact;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod time;
pub mod version;

pub use artifact::{ArtifactInspector, VersionedArtifact};
pub use error::{Error, Result};
pub use version::{compare_versions, version_is_less_than};

/// Author tag written into every artifact this system generates.
pub const ARTIFACT_AUTHOR: &str = "fsgen";

/// Author tag used by artifacts from releases before the fsgen rename.
///
/// Still recognized so that older outputs are classified as ours.
pub const LEGACY_ARTIFACT_AUTHOR: &str = "script_generator";

/// Version stamped into generated artifacts.
///
/// Artifacts authored by us with a lower version are stale.
pub const ARTIFACT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version assumed when an artifact omits its `version` field.
pub const DEFAULT_ARTIFACT_VERSION: &str = "0.0.1";

/// File extension (without the dot) of generated artifacts.
pub const ARTIFACT_EXTENSION: &str = "funscript";
