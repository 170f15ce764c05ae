//! Content tree enumeration.
//!
//! A walker turns a configured root into a flat `uri -> FileDescriptor` map and can fetch the
//! bytes of a listed file later on. The filesystem implementation treats a mounted directory
//! as the remote tree.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::OffsetDateTime;
use walkdir::WalkDir;

use super::types::{FileDescriptor, RootSpec};

/// File extensions accepted for extraction.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["docx", "pptx", "xlsx", "pdf"];

/// Errors raised while walking a tree or downloading a file.
#[derive(Debug, Error)]
pub enum TreeError {
    /// The configured root does not exist.
    #[error("content root does not exist: {0}")]
    RootMissing(String),
    /// Directory traversal failed.
    #[error("failed to walk content tree: {0}")]
    Walk(#[from] walkdir::Error),
    /// A file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The URI does not belong to this walker.
    #[error("unsupported file uri: {0}")]
    UnsupportedUri(String),
    /// The blocking traversal task panicked or was cancelled.
    #[error("tree walk task failed: {0}")]
    Task(String),
}

/// Enumerates a content tree and downloads its files.
#[async_trait]
pub trait ContentTreeWalker: Send + Sync {
    /// Recursively list supported files below the root.
    async fn walk(&self, root: &RootSpec) -> Result<BTreeMap<String, FileDescriptor>, TreeError>;

    /// Fetch the bytes of a previously listed file.
    async fn download(&self, document: &FileDescriptor) -> Result<Vec<u8>, TreeError>;
}

/// Whether a file name carries one of the [`SUPPORTED_EXTENSIONS`].
pub fn is_supported(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SUPPORTED_EXTENSIONS
        .iter()
        .any(|extension| lower.ends_with(&format!(".{extension}")))
}

/// Walks a local (or mounted) directory tree.
///
/// Local trees carry no version history, so the version label is the file length and access
/// groups are empty.
#[derive(Debug, Default, Clone)]
pub struct FilesystemTreeWalker {
    follow_links: bool,
}

impl FilesystemTreeWalker {
    /// Create a walker that does not follow symlinks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle symlink following.
    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    fn walk_blocking(
        root: &Path,
        follow_links: bool,
    ) -> Result<BTreeMap<String, FileDescriptor>, TreeError> {
        if !root.exists() {
            return Err(TreeError::RootMissing(root.display().to_string()));
        }

        let mut files = BTreeMap::new();
        for entry in WalkDir::new(root).follow_links(follow_links) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_supported(&name) {
                tracing::debug!(file = %name, "Ignoring unsupported file type");
                continue;
            }

            let path = entry.path();
            let metadata = entry.metadata()?;
            let modified = metadata
                .modified()
                .map(OffsetDateTime::from)
                .unwrap_or(OffsetDateTime::UNIX_EPOCH);
            let folder = path
                .parent()
                .and_then(|parent| parent.file_name())
                .map(|folder| folder.to_string_lossy().to_string())
                .unwrap_or_default();

            let descriptor = FileDescriptor::new(
                file_uri(path),
                name,
                folder,
                truncate_to_seconds(modified),
                metadata.len().to_string(),
                BTreeSet::new(),
            );
            tracing::trace!(uri = %descriptor.uri, "Discovered file");
            files.insert(descriptor.uri.clone(), descriptor);
        }
        Ok(files)
    }
}

#[async_trait]
impl ContentTreeWalker for FilesystemTreeWalker {
    async fn walk(&self, root: &RootSpec) -> Result<BTreeMap<String, FileDescriptor>, TreeError> {
        let path = PathBuf::from(&root.root_folder);
        let follow_links = self.follow_links;
        let files = tokio::task::spawn_blocking(move || Self::walk_blocking(&path, follow_links))
            .await
            .map_err(|error| TreeError::Task(error.to_string()))??;
        tracing::info!(root = %root.root_uri, files = files.len(), "Walked content tree");
        Ok(files)
    }

    async fn download(&self, document: &FileDescriptor) -> Result<Vec<u8>, TreeError> {
        let path = document
            .uri
            .strip_prefix("file://")
            .map(PathBuf::from)
            .ok_or_else(|| TreeError::UnsupportedUri(document.uri.clone()))?;
        tokio::fs::read(&path)
            .await
            .map_err(|source| TreeError::Io { path, source })
    }
}

fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn truncate_to_seconds(timestamp: OffsetDateTime) -> OffsetDateTime {
    timestamp.replace_nanosecond(0).unwrap_or(timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_extensions_are_case_insensitive() {
        assert!(is_supported("Report.PDF"));
        assert!(is_supported("deck.pptx"));
        assert!(!is_supported("home.aspx"));
        assert!(!is_supported("notes.txt"));
    }

    #[tokio::test]
    async fn walk_lists_supported_files_with_parent_folder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("policies");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(nested.join("travel.pdf"), b"%PDF-1.7").expect("write");
        std::fs::write(nested.join("index.aspx"), b"<html>").expect("write");
        std::fs::write(dir.path().join("budget.xlsx"), b"xlsx").expect("write");

        let root = RootSpec::local(dir.path().display().to_string());
        let files = FilesystemTreeWalker::new().walk(&root).await.expect("walk");

        assert_eq!(files.len(), 2);
        let travel = files
            .values()
            .find(|file| file.name == "travel.pdf")
            .expect("travel listed");
        assert_eq!(travel.folder, "policies");
        assert_eq!(travel.version, "8");
        assert_eq!(travel.fingerprint.len(), 64);

        let bytes = FilesystemTreeWalker::new()
            .download(travel)
            .await
            .expect("download");
        assert_eq!(bytes, b"%PDF-1.7");
    }

    #[tokio::test]
    async fn walk_reports_missing_root() {
        let root = RootSpec::local("/definitely/not/here");
        let error = FilesystemTreeWalker::new()
            .walk(&root)
            .await
            .expect_err("missing root");
        assert!(matches!(error, TreeError::RootMissing(_)));
    }
}
