//! Idempotency classification of input videos
//!
//! Each video is checked at up to two artifact locations: beside the
//! video, and in an optional separate output directory. The per-location
//! results are merged into exactly one [`Bucket`]:
//!
//! 1. `Current` if any location holds our up-to-date artifact
//! 2. else `Stale` if any location holds our outdated artifact
//! 3. else `Foreign` if any location holds some other file
//! 4. else `None`
//!
//! Classification only reads the filesystem, so classifying the same
//! folder twice yields the same buckets.

use crate::worklist::BatchPolicy;
use fsgen_common::{ArtifactInspector, VersionedArtifact};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Classification of a video by its existing artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bucket {
    /// No artifact anywhere
    None,
    /// Our artifact, current version
    Current,
    /// Our artifact, older version
    Stale,
    /// An artifact we did not write (or could not read)
    Foreign,
}

/// Maps a video to the artifact path checked at one location.
///
/// `None` means the location does not apply (e.g. the output directory
/// does not exist).
pub trait OutputResolver: Send + Sync {
    fn resolve(&self, video: &Path) -> Option<PathBuf>;
}

impl<F> OutputResolver for F
where
    F: Fn(&Path) -> Option<PathBuf> + Send + Sync,
{
    fn resolve(&self, video: &Path) -> Option<PathBuf> {
        self(video)
    }
}

/// File stem of `video` plus the artifact extension
fn artifact_file_name(video: &Path, extension: &str) -> Option<PathBuf> {
    let stem = video.file_stem()?;
    let mut name = stem.to_os_string();
    name.push(".");
    name.push(extension);
    Some(PathBuf::from(name))
}

/// Artifact beside the video: `<folder>/<stem>.<ext>`
#[derive(Debug, Clone)]
pub struct SiblingOutput {
    extension: String,
}

impl SiblingOutput {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }
}

impl OutputResolver for SiblingOutput {
    fn resolve(&self, video: &Path) -> Option<PathBuf> {
        let name = artifact_file_name(video, &self.extension)?;
        Some(match video.parent() {
            Some(parent) => parent.join(name),
            None => name,
        })
    }
}

/// Artifact in a separate output directory: `<dir>/<stem>.<ext>`.
///
/// Applies only while the directory exists.
#[derive(Debug, Clone)]
pub struct DirectoryOutput {
    dir: PathBuf,
    extension: String,
}

impl DirectoryOutput {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }
}

impl OutputResolver for DirectoryOutput {
    fn resolve(&self, video: &Path) -> Option<PathBuf> {
        if !self.dir.is_dir() {
            return None;
        }
        artifact_file_name(video, &self.extension).map(|name| self.dir.join(name))
    }
}

/// One classified video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub video: PathBuf,
    pub bucket: Bucket,
    /// Locations holding our artifact (current or stale)
    pub our_artifacts: Vec<PathBuf>,
}

/// Videos grouped by bucket, each in scan order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buckets {
    pub none: Vec<Classified>,
    pub current: Vec<Classified>,
    pub stale: Vec<Classified>,
    pub foreign: Vec<Classified>,
}

impl Buckets {
    pub fn get(&self, bucket: Bucket) -> &[Classified] {
        match bucket {
            Bucket::None => &self.none,
            Bucket::Current => &self.current,
            Bucket::Stale => &self.stale,
            Bucket::Foreign => &self.foreign,
        }
    }

    /// Video paths in one bucket
    pub fn paths(&self, bucket: Bucket) -> Vec<PathBuf> {
        self.get(bucket).iter().map(|c| c.video.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.none.len() + self.current.len() + self.stale.len() + self.foreign.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, classified: Classified) {
        match classified.bucket {
            Bucket::None => self.none.push(classified),
            Bucket::Current => self.current.push(classified),
            Bucket::Stale => self.stale.push(classified),
            Bucket::Foreign => self.foreign.push(classified),
        }
    }

    /// Log every bucket with its files and whether the policy processes it
    pub fn log_summary(&self, policy: &BatchPolicy) {
        let categories = [
            ("Files with no artifact".to_string(), &self.none),
            (
                format!(
                    "Files with our current artifact (will {}be processed)",
                    if policy.replace_up_to_date() { "" } else { "NOT " }
                ),
                &self.current,
            ),
            (
                format!(
                    "Files with our outdated artifact (will {}be regenerated)",
                    if policy.replace_outdated() { "" } else { "NOT " }
                ),
                &self.stale,
            ),
            ("Files with a foreign artifact (ignored)".to_string(), &self.foreign),
        ];

        for (label, files) in categories {
            info!("{} ({}):", label, files.len());
            for file in files {
                info!(" - {}", file.video.display());
            }
        }
    }
}

/// Merge per-location inspections into one bucket
pub fn merge_locations(locations: &[VersionedArtifact]) -> Bucket {
    if locations.iter().any(VersionedArtifact::is_current) {
        Bucket::Current
    } else if locations.iter().any(VersionedArtifact::is_stale) {
        Bucket::Stale
    } else if locations.iter().any(|l| l.exists) {
        Bucket::Foreign
    } else {
        Bucket::None
    }
}

/// Classifies videos against a primary and an optional secondary location
pub struct Classifier {
    inspector: ArtifactInspector,
    primary: Box<dyn OutputResolver>,
    secondary: Option<Box<dyn OutputResolver>>,
}

impl Classifier {
    pub fn new(inspector: ArtifactInspector, primary: Box<dyn OutputResolver>) -> Self {
        Self {
            inspector,
            primary,
            secondary: None,
        }
    }

    pub fn with_secondary(mut self, secondary: Box<dyn OutputResolver>) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn inspector(&self) -> &ArtifactInspector {
        &self.inspector
    }

    /// Classify one video
    pub fn classify_one(&self, video: &Path) -> Classified {
        let candidates = std::iter::once(self.primary.resolve(video))
            .chain(self.secondary.as_ref().map(|s| s.resolve(video)))
            .flatten();

        let mut inspections = Vec::with_capacity(2);
        let mut our_artifacts = Vec::new();
        for path in candidates {
            let artifact = self.inspector.inspect(&path);
            if artifact.exists && artifact.authored {
                our_artifacts.push(path);
            }
            inspections.push(artifact);
        }

        Classified {
            video: video.to_path_buf(),
            bucket: merge_locations(&inspections),
            our_artifacts,
        }
    }

    /// Classify every video, keeping input order within each bucket
    pub fn classify(&self, videos: &[PathBuf]) -> Buckets {
        let mut buckets = Buckets::default();
        for video in videos {
            buckets.push(self.classify_one(video));
        }
        buckets
    }
}
