//! Video file scanner
//!
//! Lists the videos of an input folder, optionally descending into
//! subfolders. Results are sorted so classification and the worklist are
//! deterministic for a given folder.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Video extensions recognized by default (lowercase, without dot)
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "mov", "avi", "m4v", "webm", "wmv", "flv", "ts",
];

/// Video scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Video file scanner
pub struct VideoScanner {
    ignore_patterns: Vec<String>,
    extensions: Vec<String>,
    recursive: bool,
}

impl VideoScanner {
    /// Create new scanner with default ignore patterns and extensions.
    ///
    /// Ignores system files like .DS_Store, Thumbs.db, .git, etc.
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
                "@eaDir".to_string(),
            ],
            extensions: VIDEO_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            recursive: false,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Replace the recognized extensions (case-insensitive, without dot)
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Scan `root_path` for video files, sorted by path
    pub fn scan(&self, root_path: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !root_path.exists() {
            return Err(ScanError::PathNotFound(root_path.to_path_buf()));
        }

        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory(root_path.to_path_buf()));
        }

        let mut symlink_visited = HashSet::new();
        let max_depth = if self.recursive { usize::MAX } else { 1 };

        let walker = WalkDir::new(root_path)
            .follow_links(false)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited));

        let mut videos = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && self.is_video_file(entry.path()) {
                        videos.push(entry.path().to_path_buf());
                    }
                }
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }

        videos.sort();
        tracing::debug!(
            root = %root_path.display(),
            recursive = self.recursive,
            count = videos.len(),
            "Scan complete"
        );
        Ok(videos)
    }

    fn should_process_entry(
        &self,
        entry: &DirEntry,
        symlink_visited: &mut HashSet<PathBuf>,
    ) -> bool {
        // Never filter the root itself
        if entry.depth() == 0 {
            return true;
        }

        let file_name = entry.file_name().to_string_lossy();
        for pattern in &self.ignore_patterns {
            if file_name.contains(pattern.as_str()) {
                return false;
            }
        }

        if entry.file_type().is_symlink() {
            if let Ok(canonical) = entry.path().canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!("Symlink loop detected: {}", entry.path().display());
                    return false;
                }
            }
        }

        true
    }

    fn is_video_file(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }
}

impl Default for VideoScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_scan_nonexistent_path() {
        let scanner = VideoScanner::new();
        match scanner.scan(Path::new("/nonexistent/path")) {
            Err(ScanError::PathNotFound(_)) => {}
            other => panic!("Expected PathNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_scan_file_not_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.mp4");
        touch(&file);
        assert!(matches!(
            VideoScanner::new().scan(&file),
            Err(ScanError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("c.mkv"));
        touch(&dir.path().join("A.MP4"));
        touch(&dir.path().join("b.mp4"));
        touch(&dir.path().join("b.funscript"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join(".DS_Store"));

        let files = VideoScanner::new().scan(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["A.MP4", "b.mp4", "c.mkv"]);
    }

    #[test]
    fn test_recursion_is_opt_in() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("top.mp4"));
        touch(&dir.path().join("season1").join("ep1.mp4"));
        touch(&dir.path().join(".git").join("hidden.mp4"));

        let flat = VideoScanner::new().scan(dir.path()).unwrap();
        assert_eq!(flat.len(), 1);

        let deep = VideoScanner::new().recursive(true).scan(dir.path()).unwrap();
        assert_eq!(deep.len(), 2);
        assert!(deep.iter().any(|p| p.ends_with("season1/ep1.mp4")));
    }

    #[test]
    fn test_custom_extensions() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.mp4"));
        touch(&dir.path().join("b.mkv"));

        let files = VideoScanner::new()
            .with_extensions([".MKV"])
            .scan(dir.path())
            .unwrap();
        assert_eq!(files, vec![dir.path().join("b.mkv")]);
    }
}
