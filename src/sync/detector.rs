//! Pure diff between a freshly walked tree and the persisted [`ContentRoot`].

use std::collections::{BTreeMap, BTreeSet};

use super::types::{ChangeSet, ContentRoot, FileDescriptor};

/// Classifies walked files as unchanged, to-update, or to-delete.
///
/// Neither method performs I/O; the caller decides whether and when to persist the merged
/// document list.
pub struct ChangeDetector;

impl ChangeDetector {
    /// Diff the observed `uri -> descriptor` map against the previous snapshot.
    ///
    /// A missing snapshot (first run) classifies every observed file as to-update.
    pub fn diff(
        observed: &BTreeMap<String, FileDescriptor>,
        previous: Option<&ContentRoot>,
    ) -> ChangeSet {
        let Some(previous) = previous else {
            return ChangeSet {
                to_update: observed.keys().cloned().collect(),
                ..ChangeSet::default()
            };
        };

        let known: BTreeMap<&str, &FileDescriptor> = previous
            .documents
            .iter()
            .map(|document| (document.uri.as_str(), document))
            .collect();

        let mut changes = ChangeSet::default();
        for (uri, current) in observed {
            match known.get(uri.as_str()) {
                None => changes.to_update.push(uri.clone()),
                Some(prior) if prior.needs_delete || prior.fingerprint != current.fingerprint => {
                    changes.to_update.push(uri.clone())
                }
                Some(_) => changes.unchanged.push(uri.clone()),
            }
        }

        let observed_keys: BTreeSet<&str> = observed.keys().map(String::as_str).collect();
        changes.to_delete = known
            .keys()
            .filter(|uri| !observed_keys.contains(*uri))
            .map(|uri| uri.to_string())
            .collect();

        changes
    }

    /// Build the next document list from a change set.
    ///
    /// Updated entries take the observed metadata with `needs_update` set, deleted entries keep
    /// their previous metadata with `needs_delete` set, and unchanged entries keep the previous
    /// record verbatim so a still-pending update survives the pass.
    pub fn merge(
        changes: &ChangeSet,
        observed: &BTreeMap<String, FileDescriptor>,
        previous: Option<&ContentRoot>,
    ) -> Vec<FileDescriptor> {
        let known: BTreeMap<&str, &FileDescriptor> = previous
            .map(|root| {
                root.documents
                    .iter()
                    .map(|document| (document.uri.as_str(), document))
                    .collect()
            })
            .unwrap_or_default();

        let mut merged: BTreeMap<String, FileDescriptor> = BTreeMap::new();

        for uri in &changes.unchanged {
            if let Some(prior) = known.get(uri.as_str()) {
                merged.insert(uri.clone(), (*prior).clone());
            }
        }

        for uri in &changes.to_update {
            if let Some(current) = observed.get(uri) {
                let mut next = current.clone();
                next.needs_update = true;
                next.needs_delete = false;
                merged.insert(uri.clone(), next);
            }
        }

        for uri in &changes.to_delete {
            if let Some(prior) = known.get(uri.as_str()) {
                let mut next = (*prior).clone();
                next.needs_update = false;
                next.needs_delete = true;
                merged.insert(uri.clone(), next);
            }
        }

        merged.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn file(name: &str, version: &str) -> FileDescriptor {
        FileDescriptor::new(
            format!("file:///lib/{name}"),
            name,
            "lib",
            datetime!(2024-01-01 00:00 UTC),
            version,
            BTreeSet::new(),
        )
    }

    fn observed(files: &[FileDescriptor]) -> BTreeMap<String, FileDescriptor> {
        files
            .iter()
            .map(|file| (file.uri.clone(), file.clone()))
            .collect()
    }

    fn root(files: Vec<FileDescriptor>) -> ContentRoot {
        ContentRoot::new("file:///lib", "/lib", files)
    }

    #[test]
    fn first_run_marks_everything_for_update() {
        let tree = observed(&[file("a.pdf", "1"), file("b.pdf", "1")]);
        let changes = ChangeDetector::diff(&tree, None);
        assert_eq!(changes.to_update.len(), 2);
        assert!(changes.unchanged.is_empty());
        assert!(changes.to_delete.is_empty());
    }

    #[test]
    fn diff_classifies_new_changed_removed_and_unchanged() {
        let previous = root(vec![
            file("keep.pdf", "1"),
            file("edit.pdf", "1"),
            file("gone.pdf", "1"),
        ]);
        let tree = observed(&[file("keep.pdf", "1"), file("edit.pdf", "2"), file("new.pdf", "1")]);

        let changes = ChangeDetector::diff(&tree, Some(&previous));

        assert_eq!(changes.unchanged, vec!["file:///lib/keep.pdf".to_string()]);
        assert_eq!(
            changes.to_update,
            vec![
                "file:///lib/edit.pdf".to_string(),
                "file:///lib/new.pdf".to_string()
            ]
        );
        assert_eq!(changes.to_delete, vec!["file:///lib/gone.pdf".to_string()]);
    }

    #[test]
    fn identical_tree_produces_no_changes() {
        let files = vec![file("a.pdf", "1"), file("b.docx", "4")];
        let previous = root(files.clone());
        let changes = ChangeDetector::diff(&observed(&files), Some(&previous));
        assert!(!changes.has_changes());
        assert_eq!(changes.unchanged.len(), 2);
    }

    #[test]
    fn reappearing_file_flagged_for_delete_is_updated_again() {
        let mut gone = file("a.pdf", "1");
        gone.needs_delete = true;
        let previous = root(vec![gone]);
        let changes = ChangeDetector::diff(&observed(&[file("a.pdf", "1")]), Some(&previous));
        assert_eq!(changes.to_update, vec!["file:///lib/a.pdf".to_string()]);
    }

    #[test]
    fn merge_sets_flags_and_preserves_pending_updates() {
        let mut pending = file("pending.pdf", "1");
        pending.needs_update = true;
        let previous = root(vec![pending, file("gone.pdf", "1"), file("edit.pdf", "1")]);
        let tree = observed(&[file("pending.pdf", "1"), file("edit.pdf", "2")]);

        let changes = ChangeDetector::diff(&tree, Some(&previous));
        let merged = ChangeDetector::merge(&changes, &tree, Some(&previous));

        let by_name: BTreeMap<&str, &FileDescriptor> =
            merged.iter().map(|d| (d.name.as_str(), d)).collect();
        assert!(by_name["pending.pdf"].needs_update);
        assert!(by_name["edit.pdf"].needs_update);
        assert_eq!(by_name["edit.pdf"].version, "2");
        assert!(by_name["gone.pdf"].needs_delete);
        assert!(!by_name["gone.pdf"].needs_update);
    }
}
