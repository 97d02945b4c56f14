//! Existing artifact inspection
//!
//! Decides whether an output location already holds an artifact, whether we
//! wrote it, and whether it predates the current artifact version. The
//! batch classifier runs this for every candidate output path, so inspection
//! is a pure read: it never writes, renames or backs up anything.
//!
//! A file that exists but cannot be parsed is reported as existing and not
//! ours. That keeps corrupt or foreign files out of the rebuild set instead of
//! letting an optimistic guess overwrite them.

use crate::version::compare_versions;
use crate::{Error, Result, ARTIFACT_AUTHOR, ARTIFACT_VERSION, DEFAULT_ARTIFACT_VERSION, LEGACY_ARTIFACT_AUTHOR};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::cmp::Ordering;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Timestamp layout used in backup file names
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Snapshot of whatever sits at a candidate output path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionedArtifact {
    /// A file exists at the path
    pub exists: bool,
    /// The file declares one of our author tags
    pub authored: bool,
    /// Declared author, when the file parsed
    pub author: Option<String>,
    /// Declared version, or the default when an authored file omits it
    pub version: Option<String>,
    /// Ours, and older than the current artifact version
    pub stale: bool,
}

impl VersionedArtifact {
    /// Nothing at the path
    pub fn missing() -> Self {
        Self::default()
    }

    /// Something at the path that we did not write (or could not read)
    pub fn foreign(author: Option<String>) -> Self {
        Self {
            exists: true,
            author,
            ..Self::default()
        }
    }

    /// Ours and up to date
    pub fn is_current(&self) -> bool {
        self.exists && self.authored && !self.stale
    }

    /// Ours and outdated
    pub fn is_stale(&self) -> bool {
        self.exists && self.authored && self.stale
    }
}

/// Metadata fields read from an artifact document.
///
/// Every other field of the document is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtifactMetadata {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Load the metadata header of an artifact file.
///
/// # Errors
///
/// [`Error::ArtifactParse`] when the file cannot be read or is not a JSON
/// object whose `author`/`version` fields are strings.
pub fn load_metadata(path: &Path) -> Result<ArtifactMetadata> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::ArtifactParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    serde_json::from_str(&content).map_err(|e| Error::ArtifactParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Classifies existing artifacts by authorship and version
#[derive(Debug, Clone)]
pub struct ArtifactInspector {
    owner_tags: Vec<String>,
    current_version: String,
}

impl ArtifactInspector {
    /// Create an inspector recognizing `owner_tags` as ours.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] when no tag is given, [`Error::MalformedVersion`]
    /// when `current_version` is not a dotted numeric version.
    pub fn new<I, S>(owner_tags: I, current_version: impl Into<String>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let owner_tags: Vec<String> = owner_tags.into_iter().map(Into::into).collect();
        if owner_tags.is_empty() {
            return Err(Error::InvalidInput(
                "at least one owner tag is required".to_string(),
            ));
        }

        let current_version = current_version.into();
        // Validate once so per-file comparisons can only fail on the file's side
        compare_versions(&current_version, &current_version)?;

        Ok(Self {
            owner_tags,
            current_version,
        })
    }

    /// Inspector for this build: current and legacy author tags, current version
    pub fn for_current_build() -> Self {
        Self {
            owner_tags: vec![
                ARTIFACT_AUTHOR.to_string(),
                LEGACY_ARTIFACT_AUTHOR.to_string(),
            ],
            current_version: ARTIFACT_VERSION.to_string(),
        }
    }

    pub fn owner_tags(&self) -> &[String] {
        &self.owner_tags
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Inspect the file at `path`.
    pub fn inspect(&self, path: &Path) -> VersionedArtifact {
        // Only a definite "not found" counts as missing
        match std::fs::symlink_metadata(path) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return VersionedArtifact::missing(),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Cannot stat existing artifact, treating as foreign");
                return VersionedArtifact::foreign(None);
            }
        }

        let metadata = match load_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Existing artifact unreadable, treating as foreign");
                return VersionedArtifact::foreign(None);
            }
        };

        let authored = metadata
            .author
            .as_deref()
            .map(|author| self.owner_tags.iter().any(|tag| tag == author))
            .unwrap_or(false);

        if !authored {
            debug!(file = %path.display(), author = ?metadata.author, "Existing artifact has a foreign author");
            return VersionedArtifact::foreign(metadata.author);
        }

        let version = metadata
            .version
            .unwrap_or_else(|| DEFAULT_ARTIFACT_VERSION.to_string());

        let stale = match compare_versions(&version, &self.current_version) {
            Ok(ordering) => ordering == Ordering::Less,
            Err(e) => {
                warn!(
                    file = %path.display(),
                    error = %e,
                    "Cannot determine artifact staleness, treating as up to date"
                );
                false
            }
        };

        VersionedArtifact {
            exists: true,
            authored: true,
            author: metadata.author,
            version: Some(version),
            stale,
        }
    }
}

impl Default for ArtifactInspector {
    fn default() -> Self {
        Self::for_current_build()
    }
}

/// Derive the backup file name for an artifact.
///
/// `movie.funscript` backed up at 2026-10-14 17:05:09 becomes
/// `movie_2026-10-14_17-05-09.funscript.bak` in the same directory.
pub fn backup_path(artifact_path: &Path, timestamp: NaiveDateTime) -> PathBuf {
    let stem = artifact_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = artifact_path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| crate::ARTIFACT_EXTENSION.to_string());

    let name = format!(
        "{}_{}.{}.bak",
        stem,
        timestamp.format(BACKUP_TIMESTAMP_FORMAT),
        extension
    );

    match artifact_path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Copy an existing artifact to its timestamped backup location.
///
/// Returns the backup path.
pub fn create_backup(artifact_path: &Path, timestamp: NaiveDateTime) -> Result<PathBuf> {
    let target = backup_path(artifact_path, timestamp);
    std::fs::copy(artifact_path, &target)?;
    Ok(target)
}
