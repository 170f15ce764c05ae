//! Data model shared by the walker, change detector, state store, and work queue.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;
use uuid::Uuid;

/// Identity and sync status of one file in a content tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    /// Unique URI of the file; the key used across passes.
    pub uri: String,
    /// Display name including the extension.
    pub name: String,
    /// Name of the owning folder.
    pub folder: String,
    /// Last modification timestamp reported by the tree.
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
    /// Version label reported by the tree.
    pub version: String,
    /// Optional year metadata carried into the index.
    #[serde(default)]
    pub year: String,
    /// Metadata fingerprint, see [`super::fingerprint`].
    #[serde(default)]
    pub fingerprint: String,
    /// Access groups allowed to read the file.
    #[serde(default)]
    pub group_ids: BTreeSet<String>,
    /// The index does not reflect the current metadata yet.
    #[serde(default)]
    pub needs_update: bool,
    /// The file vanished from the tree; its sections must be removed.
    #[serde(default)]
    pub needs_delete: bool,
}

impl FileDescriptor {
    /// Build a descriptor from walked metadata, computing its fingerprint.
    pub fn new(
        uri: impl Into<String>,
        name: impl Into<String>,
        folder: impl Into<String>,
        last_modified: OffsetDateTime,
        version: impl Into<String>,
        group_ids: BTreeSet<String>,
    ) -> Self {
        let mut descriptor = Self {
            uri: uri.into(),
            name: name.into(),
            folder: folder.into(),
            last_modified,
            version: version.into(),
            year: String::new(),
            fingerprint: String::new(),
            group_ids,
            needs_update: false,
            needs_delete: false,
        };
        descriptor.refresh_fingerprint();
        descriptor
    }

    /// Recompute the fingerprint from the current identity fields.
    pub fn refresh_fingerprint(&mut self) {
        self.fingerprint = super::fingerprint::fingerprint(self);
    }

    /// Whether the descriptor still has work pending.
    pub fn is_pending(&self) -> bool {
        self.needs_update || self.needs_delete
    }

    /// File name without its extension, used to key cached extraction results.
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(index) if index > 0 => &self.name[..index],
            _ => &self.name,
        }
    }

    /// Lowercased extension without the leading dot.
    pub fn extension(&self) -> Option<String> {
        self.name
            .rfind('.')
            .filter(|index| *index > 0)
            .map(|index| self.name[index + 1..].to_ascii_lowercase())
    }
}

/// One synchronized content tree and the last-known state of its files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRoot {
    /// Record identifier, regenerated on every replace.
    pub id: Uuid,
    /// URI of the root; at most one record exists per value.
    pub root_uri: String,
    /// Folder path of the root within the tree.
    pub root_folder: String,
    /// Completion time of the pass that produced this record.
    #[serde(with = "time::serde::rfc3339")]
    pub last_sync: OffsetDateTime,
    /// Files known under this root, ordered by URI.
    pub documents: Vec<FileDescriptor>,
}

impl ContentRoot {
    /// Create a fresh record for the given root.
    pub fn new(
        root_uri: impl Into<String>,
        root_folder: impl Into<String>,
        documents: Vec<FileDescriptor>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            root_uri: root_uri.into(),
            root_folder: root_folder.into(),
            last_sync: OffsetDateTime::now_utc(),
            documents,
        }
    }

    /// Look up a descriptor by URI.
    pub fn document(&self, uri: &str) -> Option<&FileDescriptor> {
        self.documents.iter().find(|document| document.uri == uri)
    }

    /// Look up a descriptor by URI for mutation.
    pub fn document_mut(&mut self, uri: &str) -> Option<&mut FileDescriptor> {
        self.documents.iter_mut().find(|document| document.uri == uri)
    }

    /// Descriptors that still need processing.
    pub fn pending(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.documents.iter().filter(|document| document.is_pending())
    }
}

/// Classification of a newly observed tree against the persisted one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// URIs whose metadata did not change.
    pub unchanged: Vec<String>,
    /// URIs that are new or whose fingerprint changed.
    pub to_update: Vec<String>,
    /// URIs that disappeared from the tree.
    pub to_delete: Vec<String>,
}

impl ChangeSet {
    /// Whether the pass detected any change worth persisting.
    pub fn has_changes(&self) -> bool {
        !self.to_update.is_empty() || !self.to_delete.is_empty()
    }
}

/// Queue message asking a worker to reconcile one file with the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    /// Root the file belongs to.
    pub root_uri: String,
    /// Snapshot of the descriptor at admission time.
    pub document: FileDescriptor,
}

/// Dead-letter record for a work item that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    /// Original queue item.
    pub item: WorkItem,
    /// Rendered error chain.
    pub error: String,
}

/// Root configured for synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootSpec {
    /// URI identifying the root record.
    pub root_uri: String,
    /// Folder path walked below the root.
    pub root_folder: String,
}

impl RootSpec {
    /// Build a spec for a local directory root.
    pub fn local(path: impl Into<String>) -> Self {
        let folder = path.into();
        Self {
            root_uri: format!("file://{folder}"),
            root_folder: folder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn descriptor(name: &str) -> FileDescriptor {
        FileDescriptor::new(
            format!("file:///docs/{name}"),
            name,
            "docs",
            datetime!(2024-03-01 10:00 UTC),
            "1",
            BTreeSet::new(),
        )
    }

    #[test]
    fn stem_and_extension_split_on_last_dot() {
        let file = descriptor("annual.report.PDF");
        assert_eq!(file.stem(), "annual.report");
        assert_eq!(file.extension().as_deref(), Some("pdf"));

        let hidden = descriptor(".profile");
        assert_eq!(hidden.stem(), ".profile");
        assert!(hidden.extension().is_none());
    }

    #[test]
    fn descriptor_round_trips_through_json_with_camel_case() {
        let mut file = descriptor("a.docx");
        file.needs_update = true;
        let json = serde_json::to_value(&file).expect("serialize");
        assert_eq!(json["needsUpdate"], true);
        assert_eq!(json["lastModified"], "2024-03-01T10:00:00Z");
        let back: FileDescriptor = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, file);
    }

    #[test]
    fn local_root_spec_builds_file_uri() {
        let spec = RootSpec::local("/srv/library");
        assert_eq!(spec.root_uri, "file:///srv/library");
        assert_eq!(spec.root_folder, "/srv/library");
    }
}
