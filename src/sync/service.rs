//! Sync pass orchestration: walk, diff, persist, and queue admission.

use std::sync::Arc;

use serde::Serialize;

use crate::storage::WorkQueue;

use super::SyncError;
use super::detector::ChangeDetector;
use super::gate::WorkQueueGate;
use super::state::{SyncStateStore, replace_root};
use super::types::{ContentRoot, RootSpec, WorkItem};
use super::walker::ContentTreeWalker;

/// Outcome of syncing a single root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootReport {
    /// Root that was synced.
    pub root_uri: String,
    /// Files whose metadata did not change.
    pub unchanged: usize,
    /// Files flagged for (re)indexing.
    pub to_update: usize,
    /// Files flagged for removal.
    pub to_delete: usize,
    /// Whether a new record was written.
    pub persisted: bool,
}

/// Outcome of a full sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Per-root results for roots that synced.
    pub roots: Vec<RootReport>,
    /// Roots skipped because walking or persisting failed.
    pub failed_roots: Vec<String>,
}

impl SyncReport {
    /// Human-readable summary used by the triggers.
    pub fn summary(&self) -> String {
        let updated: usize = self.roots.iter().map(|root| root.to_update).sum();
        let deleted: usize = self.roots.iter().map(|root| root.to_delete).sum();
        format!(
            "synced {} root(s), {} to update, {} to delete, {} failed",
            self.roots.len(),
            updated,
            deleted,
            self.failed_roots.len()
        )
    }
}

/// Drives change detection for the configured roots and feeds the work queue.
pub struct SyncService {
    walker: Arc<dyn ContentTreeWalker>,
    store: Arc<dyn SyncStateStore>,
    queue: Arc<dyn WorkQueue>,
    gate: WorkQueueGate,
    roots: Vec<RootSpec>,
}

impl SyncService {
    /// Wire a service from its collaborators.
    pub fn new(
        walker: Arc<dyn ContentTreeWalker>,
        store: Arc<dyn SyncStateStore>,
        queue: Arc<dyn WorkQueue>,
        gate: WorkQueueGate,
        roots: Vec<RootSpec>,
    ) -> Self {
        Self {
            walker,
            store,
            queue,
            gate,
            roots,
        }
    }

    /// Configured roots.
    pub fn roots(&self) -> &[RootSpec] {
        &self.roots
    }

    /// Walk one root, diff it against the stored record, and persist the merged tree.
    ///
    /// The record is only written when something changed or when no record existed yet.
    pub async fn sync_root(&self, root: &RootSpec) -> Result<RootReport, SyncError> {
        let observed = self.walker.walk(root).await?;
        let previous = self.store.load(&root.root_uri).await?;
        let changes = ChangeDetector::diff(&observed, previous.as_ref());

        let mut report = RootReport {
            root_uri: root.root_uri.clone(),
            unchanged: changes.unchanged.len(),
            to_update: changes.to_update.len(),
            to_delete: changes.to_delete.len(),
            persisted: false,
        };

        if changes.has_changes() || previous.is_none() {
            let documents = ChangeDetector::merge(&changes, &observed, previous.as_ref());
            let record = ContentRoot::new(&root.root_uri, &root.root_folder, documents);
            replace_root(self.store.as_ref(), record).await?;
            report.persisted = true;
        }

        tracing::info!(
            root = %root.root_uri,
            unchanged = report.unchanged,
            to_update = report.to_update,
            to_delete = report.to_delete,
            persisted = report.persisted,
            "Synced content root"
        );
        Ok(report)
    }

    /// Sync every configured root. A failing root is logged and skipped.
    pub async fn sync_all(&self) -> SyncReport {
        let mut report = SyncReport::default();
        for root in &self.roots {
            match self.sync_root(root).await {
                Ok(root_report) => report.roots.push(root_report),
                Err(error) => {
                    tracing::error!(root = %root.root_uri, error = %error, "Failed to sync content root");
                    report.failed_roots.push(root.root_uri.clone());
                }
            }
        }
        report
    }

    /// Drop every persisted record, then run a full sync so every file is re-indexed.
    pub async fn clean_sync(&self) -> Result<SyncReport, SyncError> {
        for root in self.store.list().await? {
            self.store.remove(&root.root_uri).await?;
            tracing::info!(root = %root.root_uri, "Removed content root record");
        }
        Ok(self.sync_all().await)
    }

    /// Admit pending documents from every stored root into the work queue.
    ///
    /// Returns the number of items enqueued.
    pub async fn check_queue(&self) -> Result<usize, SyncError> {
        let candidates: Vec<WorkItem> = self
            .store
            .list()
            .await?
            .into_iter()
            .flat_map(|root| {
                let root_uri = root.root_uri.clone();
                root.documents
                    .into_iter()
                    .filter(|document| document.is_pending())
                    .map(move |document| WorkItem {
                        root_uri: root_uri.clone(),
                        document,
                    })
            })
            .collect();

        tracing::debug!(pending = candidates.len(), "Collected pending documents");
        self.gate.admit(self.queue.as_ref(), candidates).await
    }
}
